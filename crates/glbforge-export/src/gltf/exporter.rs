//! glTF exporter implementation

use super::animation::pack_animation;
use super::buffer::{AccessorSet, BufferAllocator};
use super::material::MaterialCache;
use super::skin::{add_skin, emit_joint_nodes, joint_attributes, JointNodes};
use super::*;
use glbforge_scene::{MeshData, MeshId, Model3D, ModelId, SceneGraph, Skeleton, SkeletonId, Topology};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// glTF export options
#[derive(Debug, Clone)]
pub struct GltfExportOptions {
    /// Written to `asset.generator`
    pub generator: String,
    /// Embed selected textures; when off every mesh gets its placeholder material
    pub embed_textures: bool,
    /// Include model animations
    pub export_animations: bool,
    /// Name of the single scene
    pub scene_name: String,
}

impl Default for GltfExportOptions {
    fn default() -> Self {
        Self {
            generator: format!("glbforge {}", env!("CARGO_PKG_VERSION")),
            embed_textures: true,
            export_animations: true,
            scene_name: "Scene".to_string(),
        }
    }
}

/// glTF export errors
#[derive(Debug, thiserror::Error)]
pub enum GltfExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Scene(#[from] glbforge_core::Error),

    #[error("Model {model} references {mesh}, which has no exported geometry")]
    MeshNotExported { model: String, mesh: MeshId },

    #[error("Model {model} references {mesh}, which is not in the mesh registry")]
    UnknownMesh { model: String, mesh: MeshId },

    #[error("Model {model} references skeleton #{skeleton}, which does not exist")]
    UnknownSkeleton { model: String, skeleton: usize },

    #[error("Model {model} has no mesh and is not an empty object")]
    InvalidModel { model: String },

    #[error("{what}: index {index} does not fit in 16 bits")]
    IndexOverflow { what: String, index: usize },
}

pub type GltfResult<T> = Result<T, GltfExportError>;

/// glTF exporter
///
/// Stateless between calls: every export builds its document from scratch.
pub struct GltfExporter {
    options: GltfExportOptions,
}

impl Default for GltfExporter {
    fn default() -> Self {
        Self::new(GltfExportOptions::default())
    }
}

impl GltfExporter {
    /// Create a new glTF exporter
    pub fn new(options: GltfExportOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GltfExportOptions {
        &self.options
    }

    /// Export a scene graph to a GLB file
    ///
    /// The file is written in one go after the whole document is built, so a
    /// failed export leaves no output behind.
    pub fn export(&self, scene: &SceneGraph, output_path: impl AsRef<Path>) -> GltfResult<()> {
        let output_path = output_path.as_ref();
        let bytes = self.export_to_bytes(scene)?;
        std::fs::write(output_path, &bytes)?;
        info!(path = %output_path.display(), bytes = bytes.len(), "Wrote GLB");
        Ok(())
    }

    /// Export a scene graph to GLB bytes
    pub fn export_to_bytes(&self, scene: &SceneGraph) -> GltfResult<Vec<u8>> {
        let (gltf, binary) = self.build_document(scene)?;
        glb::assemble(&gltf, &binary)
    }

    /// Build the glTF document and its binary buffer
    pub fn build_document(&self, scene: &SceneGraph) -> GltfResult<(Gltf, Vec<u8>)> {
        crate::logging::instrument_export(scene.model_count(), scene.meshes().len(), || -> GltfResult<_> {
            let mut state = ExportState::new(scene, &self.options);
            let exported = state.select()?;
            state.write_geometry(&exported)?;
            state.emit(&exported)?;
            state.attach();
            Ok(state.finish())
        })
    }
}

/// Working state of one export
struct ExportState<'a> {
    scene: &'a SceneGraph,
    options: &'a GltfExportOptions,
    doc: Gltf,
    buffer: BufferAllocator,
    materials: MaterialCache,
    geometry: HashMap<MeshId, AccessorSet>,
    gltf_meshes: HashMap<(MeshId, usize), usize>,
    joints: HashMap<SkeletonId, JointNodes>,
    /// Model nodes in emission order
    model_nodes: Vec<(ModelId, usize)>,
    node_of_model: HashMap<ModelId, usize>,
    parents: HashMap<usize, usize>,
}

impl<'a> ExportState<'a> {
    fn new(scene: &'a SceneGraph, options: &'a GltfExportOptions) -> Self {
        Self {
            scene,
            options,
            doc: Gltf::default(),
            buffer: BufferAllocator::new(),
            materials: MaterialCache::default(),
            geometry: HashMap::new(),
            gltf_meshes: HashMap::new(),
            joints: HashMap::new(),
            model_nodes: Vec::new(),
            node_of_model: HashMap::new(),
            parents: HashMap::new(),
        }
    }

    /// Models that produce a node, in input order
    ///
    /// Skipped models are dropped, as are empty objects that no exported
    /// model attaches to.
    fn select(&self) -> GltfResult<Vec<ModelId>> {
        let targets: HashSet<ModelId> = self
            .scene
            .models()
            .filter(|(_, m)| !m.is_skipped())
            .filter_map(|(_, m)| m.attachment_model)
            .collect();

        let mut exported = Vec::new();
        for (id, model) in self.scene.models() {
            if model.is_skipped() {
                debug!(model = %model.name, "Skipped by export flags");
                continue;
            }
            if model.is_empty_object {
                if targets.contains(&id) {
                    exported.push(id);
                } else {
                    debug!(model = %model.name, "Pruned unused empty object");
                }
                continue;
            }
            if model.mesh().is_none() {
                return Err(GltfExportError::InvalidModel {
                    model: model.name.clone(),
                });
            }
            exported.push(id);
        }
        Ok(exported)
    }

    /// Write one accessor set per mesh used by an exported model
    ///
    /// Joint attributes are bound to the skeleton of the first exported user
    /// that has one, wherever that user sits in the model list.
    fn write_geometry(&mut self, exported: &[ModelId]) -> GltfResult<()> {
        let scene = self.scene;
        let mut bindings: HashMap<MeshId, &'a Skeleton> = HashMap::new();
        for &id in exported {
            let model = self.model(id)?;
            let Some(mesh_id) = model.mesh() else {
                continue;
            };
            if model.is_empty_object || bindings.contains_key(&mesh_id) {
                continue;
            }
            if let Some(skeleton) = self.skeleton_of(model)? {
                bindings.insert(mesh_id, skeleton);
            }
        }

        for &id in exported {
            let model = self.model(id)?;
            let Some(mesh_id) = model.mesh() else {
                continue;
            };
            if model.is_empty_object || self.geometry.contains_key(&mesh_id) {
                continue;
            }

            let mesh = scene.mesh(mesh_id).ok_or_else(|| GltfExportError::UnknownMesh {
                model: model.name.clone(),
                mesh: mesh_id,
            })?;
            let set = self.write_mesh(mesh, bindings.get(&mesh_id).copied())?;
            self.geometry.insert(mesh_id, set);
        }
        debug!(meshes = self.geometry.len(), "Wrote mesh geometry");
        Ok(())
    }

    fn write_mesh(&mut self, mesh: &MeshData, skeleton: Option<&Skeleton>) -> GltfResult<AccessorSet> {
        if mesh.topology != Topology::TriangleList {
            warn!(mesh = %mesh.name, topology = ?mesh.topology, "Unsupported topology, exporting as triangle list");
        }

        let position = self.buffer.add_positions(&mesh.positions);
        let normal = (!mesh.normals.is_empty()).then(|| self.buffer.add_normals(&mesh.normals));
        let uv = (!mesh.uvs.is_empty()).then(|| self.buffer.add_uvs(&mesh.uvs));

        let (joints, weights) = match skeleton {
            Some(skeleton) if mesh.has_bone_data() => {
                let (joints, weights) = joint_attributes(mesh, skeleton)?;
                (
                    Some(self.buffer.add_joints(&joints)),
                    Some(self.buffer.add_weights(&weights)),
                )
            }
            _ => {
                if mesh.is_skinned() {
                    debug!(mesh = %mesh.name, "Skinning data not bound to a skeleton, exporting as static");
                }
                (None, None)
            }
        };

        let indices = self.buffer.add_indices(&mesh.indices);
        Ok(AccessorSet {
            position,
            normal,
            uv,
            indices,
            joints,
            weights,
        })
    }

    /// Create model nodes, their meshes, skins and animations
    fn emit(&mut self, exported: &[ModelId]) -> GltfResult<()> {
        for &id in exported {
            let model = self.model(id)?;
            let mut node = Node::from_transform(&model.name, &model.scaled_transform());
            node.extras = node_extras(model);

            let mut skinned = false;
            if !model.is_empty_object {
                if let Some(mesh_id) = model.mesh() {
                    let set = *self.geometry.get(&mesh_id).ok_or_else(|| {
                        GltfExportError::MeshNotExported {
                            model: model.name.clone(),
                            mesh: mesh_id,
                        }
                    })?;
                    node.mesh = Some(self.gltf_mesh(model, mesh_id, &set)?);
                    skinned = set.joints.is_some();
                }
            }

            let node_index = self.doc.nodes.len();
            self.doc.nodes.push(node);
            self.model_nodes.push((id, node_index));
            self.node_of_model.insert(id, node_index);

            if let Some(skeleton_id) = model.skeleton {
                self.emit_skeleton(model, skeleton_id, node_index, skinned)?;
            }
        }
        Ok(())
    }

    fn gltf_mesh(&mut self, model: &Model3D, mesh_id: MeshId, set: &AccessorSet) -> GltfResult<usize> {
        let mesh_name = self
            .scene
            .mesh(mesh_id)
            .map(|m| m.name.clone())
            .ok_or_else(|| GltfExportError::UnknownMesh {
                model: model.name.clone(),
                mesh: mesh_id,
            })?;
        let material = self.materials.resolve(
            &mut self.doc,
            &mut self.buffer,
            model,
            mesh_id,
            &mesh_name,
            self.options.embed_textures,
        );

        if let Some(&index) = self.gltf_meshes.get(&(mesh_id, material)) {
            return Ok(index);
        }
        let index = self.doc.meshes.len();
        self.doc.meshes.push(Mesh {
            name: Some(mesh_name),
            primitives: vec![Primitive {
                attributes: set.attributes(),
                indices: Some(set.indices),
                material: Some(material),
                mode: Some(MODE_TRIANGLES),
            }],
        });
        self.gltf_meshes.insert((mesh_id, material), index);
        Ok(index)
    }

    /// Joint nodes (once per skeleton), skin and animations for one model
    fn emit_skeleton(
        &mut self,
        model: &Model3D,
        skeleton_id: SkeletonId,
        node_index: usize,
        skinned: bool,
    ) -> GltfResult<()> {
        let skeleton = self.skeleton_of(model)?.ok_or_else(|| GltfExportError::UnknownSkeleton {
            model: model.name.clone(),
            skeleton: skeleton_id.0,
        })?;

        let mut joints = match self.joints.get(&skeleton_id) {
            Some(joints) => *joints,
            None => {
                let joints = emit_joint_nodes(&mut self.doc.nodes, skeleton)?;
                for parent in joints.base..joints.base + joints.count {
                    for &child in &self.doc.nodes[parent].children {
                        self.parents.insert(child, parent);
                    }
                }
                self.doc.nodes[node_index].children.push(joints.root);
                self.parents.insert(joints.root, node_index);
                joints
            }
        };

        if skinned {
            let skin = match joints.skin {
                Some(skin) => skin,
                None => add_skin(&mut self.doc.skins, &mut self.buffer, skeleton, &joints)?,
            };
            joints.skin = Some(skin);
            self.doc.nodes[node_index].skin = Some(skin);
        }
        self.joints.insert(skeleton_id, joints);

        if self.options.export_animations {
            for animation in &model.animations {
                if let Some(packed) = pack_animation(&mut self.buffer, animation, skeleton, &joints) {
                    self.doc.animations.push(packed);
                }
            }
        }
        Ok(())
    }

    /// Parent model nodes under bones or other models
    fn attach(&mut self) {
        let scene = self.scene;
        for &(id, node) in &self.model_nodes {
            let Some(model) = scene.model(id) else {
                continue;
            };
            let parent = match (&model.attachment_node, model.attachment_model) {
                (Some(bone_ref), _) => self.bone_node(bone_ref),
                (None, Some(target)) => self.node_of_model.get(&target).copied(),
                (None, None) => continue,
            };
            let Some(parent) = parent else {
                warn!(model = %model.name, "Attachment target not exported, leaving model at scene root");
                continue;
            };
            if self.is_ancestor(node, parent) {
                warn!(model = %model.name, "Attachment would create a cycle, leaving model at scene root");
                continue;
            }
            self.doc.nodes[parent].children.push(node);
            self.parents.insert(node, parent);
        }
    }

    fn bone_node(&self, bone_ref: &glbforge_scene::BoneRef) -> Option<usize> {
        let joints = self.joints.get(&bone_ref.skeleton)?;
        let skeleton = self.scene.skeleton(bone_ref.skeleton)?;
        let index = skeleton.bone(skeleton.find(&bone_ref.bone)?)?.index()?;
        joints.node_of(index)
    }

    /// `node` is `candidate` or one of its ancestors
    fn is_ancestor(&self, node: usize, candidate: usize) -> bool {
        let mut cursor = Some(candidate);
        while let Some(current) = cursor {
            if current == node {
                return true;
            }
            cursor = self.parents.get(&current).copied();
        }
        false
    }

    fn finish(self) -> (Gltf, Vec<u8>) {
        let mut doc = self.doc;
        let roots: Vec<usize> = self
            .model_nodes
            .iter()
            .map(|&(_, node)| node)
            .filter(|node| !self.parents.contains_key(node))
            .collect();

        doc.asset.generator = Some(self.options.generator.clone());
        doc.scene = Some(0);
        doc.scenes = vec![Scene {
            name: Some(self.options.scene_name.clone()),
            nodes: roots,
        }];

        let (binary, accessors, buffer_views) = self.buffer.into_parts();
        doc.accessors = accessors;
        doc.buffer_views = buffer_views;
        if !binary.is_empty() {
            doc.buffers = vec![Buffer {
                uri: None,
                byte_length: binary.len(),
            }];
        }

        info!(
            nodes = doc.nodes.len(),
            meshes = doc.meshes.len(),
            materials = doc.materials.len(),
            skins = doc.skins.len(),
            animations = doc.animations.len(),
            "Built glTF document"
        );
        (doc, binary)
    }

    fn model(&self, id: ModelId) -> GltfResult<&'a Model3D> {
        self.scene
            .model(id)
            .ok_or_else(|| glbforge_core::Error::unknown("model", format!("#{}", id.0)).into())
    }

    fn skeleton_of(&self, model: &Model3D) -> GltfResult<Option<&'a Skeleton>> {
        match model.skeleton {
            None => Ok(None),
            Some(id) => self
                .scene
                .skeleton(id)
                .map(Some)
                .ok_or_else(|| GltfExportError::UnknownSkeleton {
                    model: model.name.clone(),
                    skeleton: id.0,
                }),
        }
    }
}

/// Export flags worth keeping on the node
fn node_extras(model: &Model3D) -> Option<serde_json::Value> {
    if !model.flags.has_extras() {
        return None;
    }
    let mut extras = serde_json::Map::new();
    if let Some(default) = model.flags.conditional_default {
        extras.insert("conditionalDefault".to_string(), default.into());
    }
    if let Some(set) = &model.flags.static_set {
        extras.insert("staticSet".to_string(), set.clone().into());
    }
    Some(serde_json::Value::Object(extras))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glbforge_core::{Quat, Transform, Vec2, Vec3};
    use glbforge_scene::ExportFlags;

    fn triangle(name: &str) -> MeshData {
        MeshData::new(
            name,
            vec![Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
            vec![Vec3::new(0.0, 0.0, 1.0); 3],
            vec![Vec2::ZERO; 3],
            vec![0, 1, 2],
        )
    }

    fn build(scene: &SceneGraph) -> Gltf {
        GltfExporter::default().build_document(scene).unwrap().0
    }

    #[test]
    fn test_model_without_mesh_is_invalid() {
        let mut scene = SceneGraph::new();
        scene.add_model(Model3D::new("ghost"));
        let err = GltfExporter::default().build_document(&scene).unwrap_err();
        assert!(matches!(err, GltfExportError::InvalidModel { .. }));
    }

    #[test]
    fn test_empty_object_pruned_unless_attached_to() {
        let mut scene = SceneGraph::new();
        let mesh = scene.add_mesh(triangle("hat")).unwrap();
        scene.add_model(Model3D::empty("lonely"));
        let socket = scene.add_model(Model3D::empty("socket"));
        let mut hat = Model3D::new("hat");
        hat.attachment_model = Some(socket);
        let hat = scene.add_model(hat);
        scene.set_mesh(hat, Some(mesh)).unwrap();

        let doc = build(&scene);
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.nodes[0].name.as_deref(), Some("socket"));
        assert_eq!(doc.nodes[0].children, vec![1]);
        assert_eq!(doc.scenes[0].nodes, vec![0]);
    }

    #[test]
    fn test_skipped_attacher_does_not_keep_empty_object() {
        let mut scene = SceneGraph::new();
        let mesh = scene.add_mesh(triangle("hat")).unwrap();
        let socket = scene.add_model(Model3D::empty("socket"));
        let mut hat = Model3D::new("hat");
        hat.attachment_model = Some(socket);
        hat.flags.skip_export = true;
        let hat = scene.add_model(hat);
        scene.set_mesh(hat, Some(mesh)).unwrap();

        let doc = build(&scene);
        assert!(doc.nodes.is_empty());
        assert!(doc.accessors.is_empty());
        assert!(doc.buffers.is_empty());
    }

    #[test]
    fn test_attachment_cycle_is_skipped() {
        let mut scene = SceneGraph::new();
        let mesh = scene.add_mesh(triangle("link")).unwrap();
        let a = scene.add_model(Model3D::new("a"));
        let b = scene.add_model(Model3D::new("b"));
        scene.set_mesh(a, Some(mesh)).unwrap();
        scene.set_mesh(b, Some(mesh)).unwrap();
        scene.model_mut(a).unwrap().attachment_model = Some(b);
        scene.model_mut(b).unwrap().attachment_model = Some(a);

        let doc = build(&scene);
        assert_eq!(doc.nodes[1].children, vec![0]);
        assert!(doc.nodes[0].children.is_empty());
        assert_eq!(doc.scenes[0].nodes, vec![1]);
    }

    #[test]
    fn test_unresolved_attachment_stays_at_root() {
        let mut scene = SceneGraph::new();
        let mesh = scene.add_mesh(triangle("orphan")).unwrap();
        let mut orphan = Model3D::new("orphan");
        orphan.attachment_model = Some(ModelId(42));
        let orphan = scene.add_model(orphan);
        scene.set_mesh(orphan, Some(mesh)).unwrap();

        let doc = build(&scene);
        assert_eq!(doc.scenes[0].nodes, vec![0]);
    }

    #[test]
    fn test_node_transform_and_extras() {
        let mut scene = SceneGraph::new();
        let mesh = scene.add_mesh(triangle("lamp")).unwrap();
        let mut lamp = Model3D::new("lamp").with_transform(Transform::from_trs(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::IDENTITY,
            Vec3::ONE,
        ));
        lamp.scale_correction = Some(Vec3::splat(2.0));
        lamp.flags = ExportFlags {
            skip_export: false,
            conditional_default: Some(true),
            static_set: Some("night".into()),
        };
        let lamp = scene.add_model(lamp);
        scene.set_mesh(lamp, Some(mesh)).unwrap();

        let doc = build(&scene);
        let node = &doc.nodes[0];
        assert_eq!(node.translation, Some([1.0, 2.0, 3.0]));
        assert_eq!(node.scale, Some([2.0, 2.0, 2.0]));
        assert!(node.rotation.is_none());
        let extras = node.extras.as_ref().unwrap();
        assert_eq!(extras["conditionalDefault"], true);
        assert_eq!(extras["staticSet"], "night");
    }

    #[test]
    fn test_matrix_transform_written_as_matrix() {
        let mut scene = SceneGraph::new();
        let mesh = scene.add_mesh(triangle("pole")).unwrap();
        let matrix = glbforge_core::Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0));
        let pole = scene.add_model(Model3D::new("pole").with_transform(Transform::from_matrix(matrix)));
        scene.set_mesh(pole, Some(mesh)).unwrap();

        let doc = build(&scene);
        assert_eq!(doc.nodes[0].matrix, Some(matrix.to_cols_array()));
        assert!(doc.nodes[0].translation.is_none());
    }

    #[test]
    fn test_unsupported_topology_still_exports() {
        let mut scene = SceneGraph::new();
        let mesh = scene
            .add_mesh(triangle("fan").with_topology(Topology::TriangleFan))
            .unwrap();
        let fan = scene.add_model(Model3D::new("fan"));
        scene.set_mesh(fan, Some(mesh)).unwrap();

        let doc = build(&scene);
        assert_eq!(doc.meshes[0].primitives[0].mode, Some(MODE_TRIANGLES));
    }
}
