//! JSON scene manifests
//!
//! A manifest describes meshes, skeletons and model instances in plain JSON
//! and is turned into a ready-to-export [`SceneGraph`]: groups constructed,
//! bones indexed, meshes bound to their skeletons and texture paths
//! resolved.

use glbforge_core::{Error, Mat4, Quat, Result, ResultExt, Transform, Vec2, Vec3};
use glbforge_scene::{
    Animation, BoneRef, ExportFlags, Keyframe, MeshData, Model3D, ModelId, SceneGraph, Skeleton,
    TextureRef, Topology,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Root of a scene manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneManifest {
    #[serde(default)]
    pub meshes: Vec<MeshEntry>,
    #[serde(default)]
    pub skeletons: Vec<SkeletonEntry>,
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeshEntry {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    #[serde(default)]
    pub normals: Vec<[f32; 3]>,
    #[serde(default)]
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u16>,
    #[serde(default)]
    pub topology: Topology,
    #[serde(default)]
    pub skin: Option<SkinEntry>,
}

/// Skinning attributes; `indices` are 1-based into `bones`, 0 means no bone
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkinEntry {
    pub bones: Vec<String>,
    pub indices: Vec<[u16; 4]>,
    pub weights: Vec<[f32; 4]>,
    #[serde(default)]
    pub extra_bones: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkeletonEntry {
    pub name: String,
    pub bones: Vec<BoneEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoneEntry {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub transform: TransformEntry,
    /// Column-major; computed from the bind pose when no bone gives one
    #[serde(default)]
    pub inverse_reference: Option<[f32; 16]>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformEntry {
    #[serde(default)]
    pub translation: Option<[f32; 3]>,
    /// Quaternion as x, y, z, w
    #[serde(default)]
    pub rotation: Option<[f32; 4]>,
    #[serde(default)]
    pub scale: Option<[f32; 3]>,
    /// Column-major; wins over the TRS fields
    #[serde(default)]
    pub matrix: Option<[f32; 16]>,
}

impl From<&TransformEntry> for Transform {
    fn from(entry: &TransformEntry) -> Self {
        if let Some(matrix) = &entry.matrix {
            return Transform::from_matrix(Mat4::from_cols_array(matrix));
        }
        Transform::from_trs(
            entry.translation.map_or(Vec3::ZERO, Vec3::from),
            entry.rotation.map_or(Quat::IDENTITY, Quat::from),
            entry.scale.map_or(Vec3::ONE, Vec3::from),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextureEntry {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachBoneEntry {
    pub skeleton: String,
    pub bone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyEntry {
    pub bone: String,
    #[serde(default)]
    pub transform: TransformEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyframeEntry {
    pub time: f32,
    #[serde(default)]
    pub keys: Vec<KeyEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnimationEntry {
    pub name: String,
    #[serde(default)]
    pub keyframes: Vec<KeyframeEntry>,
}

impl From<&AnimationEntry> for Animation {
    fn from(entry: &AnimationEntry) -> Self {
        entry.keyframes.iter().fold(Animation::new(&entry.name), |anim, kf| {
            let keyframe = kf
                .keys
                .iter()
                .fold(Keyframe::new(kf.time), |k, key| k.with_key(&key.bone, (&key.transform).into()));
            anim.with_keyframe(keyframe)
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelEntry {
    pub name: String,
    #[serde(default)]
    pub mesh: Option<String>,
    /// Transform-only placeholder
    #[serde(default)]
    pub empty: bool,
    #[serde(default)]
    pub transform: TransformEntry,
    #[serde(default)]
    pub skeleton: Option<String>,
    #[serde(default)]
    pub textures: Vec<TextureEntry>,
    #[serde(default)]
    pub active_texture: Option<String>,
    /// Name of the model to attach under
    #[serde(default)]
    pub attach_to: Option<String>,
    #[serde(default)]
    pub attach_to_bone: Option<AttachBoneEntry>,
    #[serde(default)]
    pub animations: Vec<AnimationEntry>,
    #[serde(default)]
    pub scale_correction: Option<[f32; 3]>,
    #[serde(default)]
    pub skip_export: bool,
    #[serde(default)]
    pub conditional_default: Option<bool>,
    #[serde(default)]
    pub static_set: Option<String>,
}

impl FromStr for SceneManifest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::invalid_data(format!("scene manifest: {e}")))
    }
}

impl SceneManifest {
    /// Read a manifest from disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        text.parse::<Self>()
            .with_context(|| format!("reading {}", path.display()))
    }

    /// Read a manifest and build its scene, resolving textures next to it
    pub fn load_scene(path: impl AsRef<Path>) -> Result<SceneGraph> {
        let path = path.as_ref();
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_path(path)?.into_scene(base_dir)
    }

    /// Build a scene graph; relative texture paths resolve against `base_dir`
    pub fn into_scene(self, base_dir: &Path) -> Result<SceneGraph> {
        let mut skeletons = self
            .skeletons
            .iter()
            .map(build_skeleton)
            .collect::<Result<Vec<_>>>()?;
        let skeleton_ids: HashMap<&str, usize> = unique_names("skeleton", self.skeletons.iter().map(|s| s.name.as_str()))?;

        let mut meshes = self.meshes.iter().map(build_mesh).collect::<Vec<_>>();
        let mesh_ids: HashMap<&str, usize> = unique_names("mesh", self.meshes.iter().map(|m| m.name.as_str()))?;
        unique_names("model", self.models.iter().map(|m| m.name.as_str()))?;

        // Bind each mesh to the skeleton of its first user, and index each
        // skeleton by the bone table of the first mesh bound to it
        let mut bound = vec![false; meshes.len()];
        let mut indexed = vec![false; skeletons.len()];
        for entry in &self.models {
            let (Some(mesh), Some(skeleton)) = (&entry.mesh, &entry.skeleton) else {
                continue;
            };
            let mi = lookup(&mesh_ids, "mesh", mesh)?;
            let si = lookup(&skeleton_ids, "skeleton", skeleton)?;
            if bound[mi] {
                continue;
            }
            bound[mi] = true;

            if meshes[mi].bind_skeleton(&skeletons[si]) && !indexed[si] {
                let mesh = &meshes[mi];
                skeletons[si].assign_indices(
                    mesh.deforming_bones(),
                    mesh.extra_bone_names.iter().map(String::as_str),
                )?;
                indexed[si] = true;
            }
        }
        for (skeleton, done) in skeletons.iter_mut().zip(&indexed) {
            if !done {
                skeleton.assign_indices(std::iter::empty(), std::iter::empty())?;
            }
        }

        let mut scene = SceneGraph::new();
        let mut scene_meshes = Vec::with_capacity(meshes.len());
        for mut mesh in meshes.drain(..) {
            mesh.construct_groups();
            let name = mesh.name.clone();
            scene_meshes.push(scene.add_mesh(mesh).with_context(|| format!("mesh {name}"))?);
        }
        let scene_skeletons: Vec<_> = skeletons.into_iter().map(|s| scene.add_skeleton(s)).collect();

        let mut model_ids: HashMap<&str, ModelId> = HashMap::new();
        for entry in &self.models {
            let mut model = if entry.empty {
                Model3D::empty(&entry.name)
            } else {
                Model3D::new(&entry.name)
            };
            model.transform = (&entry.transform).into();
            model.scale_correction = entry.scale_correction.map(Vec3::from);
            model.active_texture = entry.active_texture.clone();
            model.animations = entry.animations.iter().map(Animation::from).collect();
            model.flags = ExportFlags {
                skip_export: entry.skip_export,
                conditional_default: entry.conditional_default,
                static_set: entry.static_set.clone(),
            };
            for texture in &entry.textures {
                let path = if texture.path.is_relative() {
                    base_dir.join(&texture.path)
                } else {
                    texture.path.clone()
                };
                model.textures.push(TextureRef::new(&texture.name, path));
            }
            if let Some(skeleton) = &entry.skeleton {
                model.skeleton = Some(scene_skeletons[lookup(&skeleton_ids, "skeleton", skeleton)?]);
            }
            if let Some(bone) = &entry.attach_to_bone {
                let skeleton = scene_skeletons[lookup(&skeleton_ids, "skeleton", &bone.skeleton)?];
                let has_bone = scene
                    .skeleton(skeleton)
                    .is_some_and(|s| s.find(&bone.bone).is_some());
                if !has_bone {
                    return Err(Error::unknown("bone", format!("{} in {}", bone.bone, bone.skeleton)));
                }
                model.attachment_node = Some(BoneRef {
                    skeleton,
                    bone: bone.bone.clone(),
                });
            }

            let id = scene.add_model(model);
            if let Some(mesh) = &entry.mesh {
                scene.set_mesh(id, Some(scene_meshes[lookup(&mesh_ids, "mesh", mesh)?]))?;
            }
            model_ids.insert(entry.name.as_str(), id);
        }

        for entry in &self.models {
            if let Some(target) = &entry.attach_to {
                let target = *model_ids
                    .get(target.as_str())
                    .ok_or_else(|| Error::unknown("model", target.as_str()))?;
                if let Some(model) = model_ids.get(entry.name.as_str()).and_then(|&id| scene.model_mut(id)) {
                    model.attachment_model = Some(target);
                }
            }
        }

        debug!(
            models = scene.model_count(),
            meshes = scene.meshes().len(),
            skeletons = scene_skeletons.len(),
            "Built scene from manifest"
        );
        Ok(scene)
    }
}

fn unique_names<'a>(kind: &'static str, names: impl Iterator<Item = &'a str>) -> Result<HashMap<&'a str, usize>> {
    let mut map = HashMap::new();
    for (i, name) in names.enumerate() {
        if map.insert(name, i).is_some() {
            return Err(Error::duplicate(kind, name));
        }
    }
    Ok(map)
}

fn lookup(map: &HashMap<&str, usize>, kind: &'static str, name: &str) -> Result<usize> {
    map.get(name).copied().ok_or_else(|| Error::unknown(kind, name))
}

fn build_skeleton(entry: &SkeletonEntry) -> Result<Skeleton> {
    let mut skeleton = Skeleton::new(&entry.name);
    for bone in &entry.bones {
        let inverse = bone
            .inverse_reference
            .as_ref()
            .map_or(Mat4::IDENTITY, Mat4::from_cols_array);
        skeleton.add_bone(&bone.name, (&bone.transform).into(), inverse)?;
    }

    for bone in &entry.bones {
        let Some(parent) = &bone.parent else {
            continue;
        };
        let child = skeleton
            .find(&bone.name)
            .ok_or_else(|| Error::internal(format!("bone {} vanished", bone.name)))?;
        let parent = skeleton
            .find(parent)
            .ok_or_else(|| Error::unknown("bone", format!("{} in {}", parent, entry.name)))?;
        skeleton.reparent(child, Some(parent))?;
    }

    if entry.bones.iter().all(|b| b.inverse_reference.is_none()) {
        skeleton.compute_inverse_references()?;
    }
    Ok(skeleton)
}

fn build_mesh(entry: &MeshEntry) -> MeshData {
    let mut mesh = MeshData::new(
        &entry.name,
        entry.positions.iter().copied().map(Vec3::from).collect(),
        entry.normals.iter().copied().map(Vec3::from).collect(),
        entry.uvs.iter().copied().map(Vec2::from).collect(),
        entry.indices.clone(),
    )
    .with_topology(entry.topology);

    if let Some(skin) = &entry.skin {
        mesh = mesh
            .with_skin(skin.indices.clone(), skin.weights.clone(), skin.bones.clone())
            .with_extra_bones(skin.extra_bones.clone());
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    const RIGGED: &str = r#"{
        "meshes": [{
            "name": "arm",
            "positions": [[0,0,0],[1,0,0],[0,1,0]],
            "normals": [[0,0,1],[0,0,1],[0,0,1]],
            "uvs": [[0,0],[1,0],[0,1]],
            "indices": [0,1,2],
            "skin": {
                "bones": ["hand", "shoulder"],
                "indices": [[2,0,0,0],[1,2,0,0],[1,0,0,0]],
                "weights": [[1,0,0,0],[0.5,0.5,0,0],[1,0,0,0]]
            }
        }],
        "skeletons": [{
            "name": "rig",
            "bones": [
                {"name": "shoulder"},
                {"name": "elbow", "parent": "shoulder", "transform": {"translation": [0,1,0]}},
                {"name": "hand", "parent": "elbow", "transform": {"translation": [0,1,0]}}
            ]
        }],
        "models": [
            {"name": "body", "mesh": "arm", "skeleton": "rig",
             "textures": [{"name": "skin", "path": "tex/arm.png"}]},
            {"name": "ring", "empty": true, "attach_to_bone": {"skeleton": "rig", "bone": "hand"}},
            {"name": "gem", "empty": true, "attach_to": "ring"}
        ]
    }"#;

    #[test]
    fn test_into_scene_indexes_and_binds() {
        let manifest: SceneManifest = RIGGED.parse().unwrap();
        let scene = manifest.into_scene(Path::new("/assets")).unwrap();

        let (skeleton_id, skeleton) = scene.skeletons().next().unwrap();
        let index_of = |name: &str| skeleton.bone(skeleton.find(name).unwrap()).unwrap().index();
        assert_eq!(index_of("hand"), Some(0));
        assert_eq!(index_of("shoulder"), Some(1));
        assert_eq!(index_of("elbow"), Some(2));

        let body = scene.model(scene.find_model("body").unwrap()).unwrap();
        assert_eq!(body.skeleton, Some(skeleton_id));
        assert_eq!(body.textures[0].path, PathBuf::from("/assets/tex/arm.png"));

        let mesh = scene.mesh(body.mesh().unwrap()).unwrap();
        assert!(mesh.has_bone_data());
        assert_eq!(mesh.vertex_group("hand").unwrap().vertices, vec![1, 2]);

        let ring = scene.model(scene.find_model("ring").unwrap()).unwrap();
        assert_eq!(ring.attachment_node.as_ref().map(|b| b.bone.as_str()), Some("hand"));
        let gem = scene.model(scene.find_model("gem").unwrap()).unwrap();
        assert_eq!(gem.attachment_model, scene.find_model("ring"));
    }

    #[test]
    fn test_inverse_references_computed_from_bind_pose() {
        let scene = RIGGED.parse::<SceneManifest>().unwrap().into_scene(Path::new(".")).unwrap();
        let (_, skeleton) = scene.skeletons().next().unwrap();
        let hand = skeleton.bone(skeleton.find("hand").unwrap()).unwrap();
        assert!((hand.inverse_reference.translation().y + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_references_are_errors() {
        let missing_mesh = r#"{"models": [{"name": "a", "mesh": "nope"}]}"#;
        let err = missing_mesh.parse::<SceneManifest>().unwrap().into_scene(Path::new(".")).unwrap_err();
        assert!(err.is_not_found());

        let missing_target = r#"{"models": [{"name": "a", "empty": true, "attach_to": "b"}]}"#;
        let err = missing_target.parse::<SceneManifest>().unwrap().into_scene(Path::new(".")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let dup = r#"{"models": [{"name": "a", "empty": true}, {"name": "a", "empty": true}]}"#;
        let err = dup.parse::<SceneManifest>().unwrap().into_scene(Path::new(".")).unwrap_err();
        assert!(matches!(err, Error::Duplicate { kind: "model", .. }));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!("{\"modles\": []}".parse::<SceneManifest>().unwrap_err().is_parse_error());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.json");
        std::fs::write(&path, RIGGED).unwrap();

        let scene = SceneManifest::load_scene(&path).unwrap();
        let body = scene.model(scene.find_model("body").unwrap()).unwrap();
        assert_eq!(body.textures[0].path, dir.path().join("tex/arm.png"));

        let err = SceneManifest::from_path(dir.path().join("missing.json")).unwrap_err();
        assert!(err.is_not_found());
    }
}
