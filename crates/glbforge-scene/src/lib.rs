//! glbforge-scene
//!
//! The in-memory scene graph handed to the exporter. It is independent of
//! any source asset format: a reader populates it, the exporter consumes it.
//!
//! | Type | Role |
//! |------|------|
//! | [`Model3D`] | One renderable or empty instance in the scene |
//! | [`MeshData`] | Deduplicated geometry shared by many models |
//! | [`Skeleton`] | Bone tree (the armature) with export indices |
//! | [`Animation`] | Named set of keyframes of per-bone poses |
//! | [`SceneGraph`] | Arena owning all of the above |
//!
//! # Example
//!
//! ```rust,ignore
//! use glbforge_scene::{MeshData, Model3D, SceneGraph};
//!
//! let mut scene = SceneGraph::new();
//! let mesh = scene.add_mesh(MeshData::new("cube", positions, normals, uvs, indices))?;
//! let model = scene.add_model(Model3D::new("Cube"));
//! scene.set_mesh(model, Some(mesh))?;
//! ```

pub mod animation;
pub mod armature;
pub mod mesh;
pub mod model;
pub mod scene;

pub use animation::{Animation, Key, Keyframe};
pub use armature::{Bone, BoneId, Skeleton, SkeletonId};
pub use mesh::{MeshData, MeshId, MeshRegistry, Topology, VertexGroup};
pub use model::{BoneRef, ExportFlags, Model3D, ModelId, TextureRef};
pub use scene::SceneGraph;
