//! Scene graph container
//!
//! Owns models, the shared mesh registry and skeletons. Model-to-mesh edges
//! go through [`SceneGraph::set_mesh`] so the registry's usage counts always
//! match the number of models pointing at each mesh.

use glbforge_core::{Error, Result};
use std::collections::HashSet;

use crate::armature::{Skeleton, SkeletonId};
use crate::mesh::{MeshData, MeshId, MeshRegistry};
use crate::model::{Model3D, ModelId};

#[derive(Debug, Default)]
pub struct SceneGraph {
    models: Vec<Model3D>,
    meshes: MeshRegistry,
    skeletons: Vec<Skeleton>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Meshes ====================

    pub fn add_mesh(&mut self, mesh: MeshData) -> Result<MeshId> {
        mesh.validate()?;
        self.meshes.insert(mesh)
    }

    pub fn meshes(&self) -> &MeshRegistry {
        &self.meshes
    }

    pub fn mesh(&self, id: MeshId) -> Option<&MeshData> {
        self.meshes.get(id)
    }

    pub fn mesh_mut(&mut self, id: MeshId) -> Option<&mut MeshData> {
        self.meshes.get_mut(id)
    }

    // ==================== Skeletons ====================

    pub fn add_skeleton(&mut self, skeleton: Skeleton) -> SkeletonId {
        let id = SkeletonId(self.skeletons.len());
        self.skeletons.push(skeleton);
        id
    }

    pub fn skeleton(&self, id: SkeletonId) -> Option<&Skeleton> {
        self.skeletons.get(id.0)
    }

    pub fn skeleton_mut(&mut self, id: SkeletonId) -> Option<&mut Skeleton> {
        self.skeletons.get_mut(id.0)
    }

    pub fn skeletons(&self) -> impl Iterator<Item = (SkeletonId, &Skeleton)> {
        self.skeletons.iter().enumerate().map(|(i, s)| (SkeletonId(i), s))
    }

    pub fn find_skeleton(&self, name: &str) -> Option<SkeletonId> {
        self.skeletons().find(|(_, s)| s.name == name).map(|(id, _)| id)
    }

    // ==================== Models ====================

    /// Add a model; any mesh must be set afterwards with [`set_mesh`](Self::set_mesh)
    pub fn add_model(&mut self, mut model: Model3D) -> ModelId {
        model.mesh = None;
        let id = ModelId(self.models.len());
        self.models.push(model);
        id
    }

    pub fn model(&self, id: ModelId) -> Option<&Model3D> {
        self.models.get(id.0)
    }

    pub fn model_mut(&mut self, id: ModelId) -> Option<&mut Model3D> {
        self.models.get_mut(id.0)
    }

    /// Models in insertion order
    pub fn models(&self) -> impl Iterator<Item = (ModelId, &Model3D)> {
        self.models.iter().enumerate().map(|(i, m)| (ModelId(i), m))
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn find_model(&self, name: &str) -> Option<ModelId> {
        self.models().find(|(_, m)| m.name == name).map(|(id, _)| id)
    }

    /// Point a model at a shared mesh (or at none), keeping usage counts in step
    pub fn set_mesh(&mut self, model: ModelId, mesh: Option<MeshId>) -> Result<()> {
        let current = self
            .models
            .get(model.0)
            .ok_or_else(|| Error::unknown("model", format!("#{}", model.0)))?
            .mesh;
        if current == mesh {
            return Ok(());
        }

        if let Some(new) = mesh {
            self.meshes.acquire(new)?;
        }
        if let Some(old) = current {
            self.meshes.release(old)?;
        }
        self.models[model.0].mesh = mesh;
        Ok(())
    }

    /// Drop a model's mesh reference, evicting the mesh if it was the last user
    pub fn dispose_model(&mut self, model: ModelId) -> Result<()> {
        self.set_mesh(model, None)
    }

    /// Models that some other model attaches to
    pub fn attachment_targets(&self) -> HashSet<ModelId> {
        self.models
            .iter()
            .filter_map(|m| m.attachment_model)
            .collect()
    }

    /// Fold every pending scale correction into its model
    pub fn apply_scaling(&mut self) -> usize {
        self.models
            .iter_mut()
            .map(Model3D::apply_scaling)
            .filter(|&changed| changed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glbforge_core::{Vec2, Vec3};

    fn triangle(name: &str) -> MeshData {
        MeshData::new(
            name,
            vec![Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
            vec![Vec3::new(0.0, 0.0, 1.0); 3],
            vec![Vec2::ZERO; 3],
            vec![0, 1, 2],
        )
    }

    #[test]
    fn test_shared_mesh_evicted_after_last_dispose() {
        let mut scene = SceneGraph::new();
        let mesh = scene.add_mesh(triangle("rock")).unwrap();

        let users: Vec<ModelId> = (0..3)
            .map(|i| scene.add_model(Model3D::new(format!("rock_{i}"))))
            .collect();
        for &user in &users {
            scene.set_mesh(user, Some(mesh)).unwrap();
        }
        assert_eq!(scene.meshes().users(mesh), 3);

        for &user in &users[..2] {
            scene.dispose_model(user).unwrap();
        }
        assert!(scene.mesh(mesh).is_some());

        scene.dispose_model(users[2]).unwrap();
        assert!(scene.mesh(mesh).is_none());
        assert!(scene.meshes().find("rock").is_none());
        assert!(scene.model(users[0]).unwrap().mesh().is_none());
    }

    #[test]
    fn test_set_mesh_swaps_counts() {
        let mut scene = SceneGraph::new();
        let a = scene.add_mesh(triangle("a")).unwrap();
        let b = scene.add_mesh(triangle("b")).unwrap();
        let model = scene.add_model(Model3D::new("m"));

        scene.set_mesh(model, Some(a)).unwrap();
        scene.set_mesh(model, Some(a)).unwrap();
        assert_eq!(scene.meshes().users(a), 1);

        scene.set_mesh(model, Some(b)).unwrap();
        assert!(scene.mesh(a).is_none());
        assert_eq!(scene.meshes().users(b), 1);
    }

    #[test]
    fn test_set_mesh_unknown_ids() {
        let mut scene = SceneGraph::new();
        let model = scene.add_model(Model3D::new("m"));
        assert!(scene.set_mesh(model, Some(MeshId(7))).is_err());
        assert!(scene.set_mesh(ModelId(9), None).is_err());
    }

    #[test]
    fn test_add_mesh_validates() {
        let mut scene = SceneGraph::new();
        let mut bad = triangle("bad");
        bad.normals.pop();
        assert!(scene.add_mesh(bad).is_err());
    }

    #[test]
    fn test_attachment_targets_and_scaling() {
        let mut scene = SceneGraph::new();
        let socket = scene.add_model(Model3D::empty("socket"));
        let mut hat = Model3D::new("hat");
        hat.attachment_model = Some(socket);
        hat.scale_correction = Some(Vec3::splat(2.0));
        scene.add_model(hat);

        assert!(scene.attachment_targets().contains(&socket));
        assert_eq!(scene.apply_scaling(), 1);
        assert_eq!(scene.apply_scaling(), 0);
        assert_eq!(scene.find_model("hat").map(|id| id.0), Some(1));
    }
}
