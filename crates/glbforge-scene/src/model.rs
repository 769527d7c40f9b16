//! Model instances
//!
//! A [`Model3D`] is one node in the exported scene: a mesh instance, a skinned
//! character, or an empty placeholder used as an attachment point.

use glbforge_core::{Transform, Vec3};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::animation::Animation;
use crate::armature::SkeletonId;
use crate::mesh::MeshId;

/// Handle of a model inside a [`SceneGraph`](crate::SceneGraph)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelId(pub usize);

/// A texture candidate, selected by name against [`Model3D::active_texture`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureRef {
    pub name: String,
    pub path: PathBuf,
}

impl TextureRef {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), path: path.into() }
    }
}

/// A specific bone of a specific skeleton
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoneRef {
    pub skeleton: SkeletonId,
    pub bone: String,
}

/// Export-time decisions made by the reader's variant policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFlags {
    /// Leave this model out of the export entirely
    pub skip_export: bool,
    /// Whether this model is the default of a conditional variant group
    pub conditional_default: Option<bool>,
    /// Name of the static set this model belongs to
    pub static_set: Option<String>,
}

impl ExportFlags {
    /// Any metadata worth carrying into node extras
    pub fn has_extras(&self) -> bool {
        self.conditional_default.is_some() || self.static_set.is_some()
    }
}

/// One renderable (or empty) instance in the scene
#[derive(Debug, Clone)]
pub struct Model3D {
    pub name: String,
    pub transform: Transform,
    pub(crate) mesh: Option<MeshId>,
    /// Skeleton driving this model's skin and animations
    pub skeleton: Option<SkeletonId>,
    pub textures: Vec<TextureRef>,
    pub active_texture: Option<String>,
    /// Attach under another model's node
    pub attachment_model: Option<ModelId>,
    /// Attach under a bone node; wins over `attachment_model`
    pub attachment_node: Option<BoneRef>,
    pub animations: Vec<Animation>,
    pub flags: ExportFlags,
    pub is_empty_object: bool,
    /// Scale factor still to be folded into `transform`
    pub scale_correction: Option<Vec3>,
    scaling_applied: bool,
}

impl Model3D {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::IDENTITY,
            mesh: None,
            skeleton: None,
            textures: Vec::new(),
            active_texture: None,
            attachment_model: None,
            attachment_node: None,
            animations: Vec::new(),
            flags: ExportFlags::default(),
            is_empty_object: false,
            scale_correction: None,
            scaling_applied: false,
        }
    }

    /// A transform-only placeholder
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            is_empty_object: true,
            ..Self::new(name)
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_texture(mut self, texture: TextureRef) -> Self {
        self.textures.push(texture);
        self
    }

    pub fn with_skeleton(mut self, skeleton: SkeletonId) -> Self {
        self.skeleton = Some(skeleton);
        self
    }

    pub fn with_animation(mut self, animation: Animation) -> Self {
        self.animations.push(animation);
        self
    }

    /// Shared mesh, set through [`SceneGraph::set_mesh`](crate::SceneGraph::set_mesh)
    pub fn mesh(&self) -> Option<MeshId> {
        self.mesh
    }

    pub fn is_skipped(&self) -> bool {
        self.flags.skip_export
    }

    pub fn scaling_applied(&self) -> bool {
        self.scaling_applied
    }

    /// Fold the pending scale correction into `transform`, at most once
    ///
    /// Returns true if this call changed the transform.
    pub fn apply_scaling(&mut self) -> bool {
        if self.scaling_applied {
            return false;
        }
        self.scaling_applied = true;
        match self.scale_correction {
            Some(factor) => {
                self.transform = self.transform.scaled(factor);
                true
            }
            None => false,
        }
    }

    /// The transform as it will be after [`apply_scaling`](Self::apply_scaling)
    pub fn scaled_transform(&self) -> Transform {
        match self.scale_correction {
            Some(factor) if !self.scaling_applied => self.transform.scaled(factor),
            _ => self.transform,
        }
    }

    /// The texture matching `active_texture`, or the first one when unset
    pub fn selected_texture(&self) -> Option<&TextureRef> {
        match &self.active_texture {
            Some(active) => self.textures.iter().find(|t| &t.name == active),
            None => self.textures.first(),
        }
    }
}
