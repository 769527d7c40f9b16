//! Skeleton and bone structures
//!
//! Bones live in an arena owned by their [`Skeleton`]; parent and child links
//! are [`BoneId`]s and only [`Skeleton::reparent`] writes them, so both sides
//! of every link always agree.

use glbforge_core::{Error, Mat4, Result, Transform};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Handle of a skeleton inside a [`SceneGraph`](crate::SceneGraph)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SkeletonId(pub usize);

/// Handle of a bone inside its [`Skeleton`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoneId(pub usize);

/// A single bone
#[derive(Debug, Clone)]
pub struct Bone {
    /// Bone name, unique within the skeleton
    pub name: String,
    /// Local transform (relative to parent)
    pub transform: Transform,
    /// Inverse of the bind-pose world matrix
    pub inverse_reference: Mat4,
    index: Option<usize>,
    parent: Option<BoneId>,
    children: Vec<BoneId>,
}

impl Bone {
    /// Export index, assigned by [`Skeleton::assign_indices`]
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn parent(&self) -> Option<BoneId> {
        self.parent
    }

    pub fn children(&self) -> &[BoneId] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Bone tree for one skinned character or prop
#[derive(Debug, Clone)]
pub struct Skeleton {
    pub name: String,
    bones: Vec<Bone>,
    by_name: HashMap<String, BoneId>,
}

impl Skeleton {
    /// Create a new empty skeleton
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bones: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Add a parentless bone
    pub fn add_bone(
        &mut self,
        name: impl Into<String>,
        transform: Transform,
        inverse_reference: Mat4,
    ) -> Result<BoneId> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(Error::duplicate("bone", name));
        }

        let id = BoneId(self.bones.len());
        self.by_name.insert(name.clone(), id);
        self.bones.push(Bone {
            name,
            transform,
            inverse_reference,
            index: None,
            parent: None,
            children: Vec::new(),
        });
        Ok(id)
    }

    /// Get bone count
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bone(&self, id: BoneId) -> Option<&Bone> {
        self.bones.get(id.0)
    }

    pub fn bone_mut(&mut self, id: BoneId) -> Option<&mut Bone> {
        self.bones.get_mut(id.0)
    }

    /// Find bone by name
    pub fn find(&self, name: &str) -> Option<BoneId> {
        self.by_name.get(name).copied()
    }

    pub fn bones(&self) -> impl Iterator<Item = (BoneId, &Bone)> {
        self.bones.iter().enumerate().map(|(i, b)| (BoneId(i), b))
    }

    /// Move `child` under `parent` (or make it a root), updating both sides
    pub fn reparent(&mut self, child: BoneId, parent: Option<BoneId>) -> Result<()> {
        let child_name = self.name_of(child)?.to_owned();

        if let Some(parent) = parent {
            let parent_name = self.name_of(parent)?.to_owned();
            let mut cursor = Some(parent);
            while let Some(current) = cursor {
                if current == child {
                    return Err(Error::HierarchyCycle {
                        child: child_name,
                        parent: parent_name,
                    });
                }
                cursor = self.bones[current.0].parent;
            }
        }

        if let Some(old) = self.bones[child.0].parent.take() {
            self.bones[old.0].children.retain(|&c| c != child);
        }
        if let Some(parent) = parent {
            self.bones[parent.0].children.push(child);
        }
        self.bones[child.0].parent = parent;
        Ok(())
    }

    /// Parentless bones in insertion order
    pub fn roots(&self) -> Vec<BoneId> {
        self.bones()
            .filter(|(_, b)| b.is_root())
            .map(|(id, _)| id)
            .collect()
    }

    /// The single root bone
    pub fn root(&self) -> Result<BoneId> {
        match self.roots().as_slice() {
            [root] => Ok(*root),
            [] => Err(Error::invalid_data(format!("skeleton {} has no root bone", self.name))),
            many => Err(Error::invalid_data(format!(
                "skeleton {} has {} root bones",
                self.name,
                many.len()
            ))),
        }
    }

    /// Bones in depth-first order from the roots, children in link order
    pub fn depth_first(&self) -> Vec<BoneId> {
        let mut order = Vec::with_capacity(self.bones.len());
        let mut stack: Vec<BoneId> = self.roots().into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.bones[id.0].children.iter().rev());
        }
        order
    }

    /// Assign contiguous export indices once the tree is complete
    ///
    /// Deforming bones come first in table order, then the extra bones, then
    /// any remaining bones in depth-first order. Repeated names keep their
    /// first index. Unknown names are an error.
    pub fn assign_indices<'a, D, E>(&mut self, deforming: D, extras: E) -> Result<()>
    where
        D: IntoIterator<Item = &'a str>,
        E: IntoIterator<Item = &'a str>,
    {
        for bone in &mut self.bones {
            bone.index = None;
        }

        let mut next = 0;
        for name in deforming.into_iter().chain(extras) {
            let id = self.find(name).ok_or_else(|| Error::unknown("bone", name))?;
            let bone = &mut self.bones[id.0];
            if bone.index.is_none() {
                bone.index = Some(next);
                next += 1;
            }
        }

        for id in self.depth_first() {
            let bone = &mut self.bones[id.0];
            if bone.index.is_none() {
                bone.index = Some(next);
                next += 1;
            }
        }
        Ok(())
    }

    /// Every bone has an export index
    pub fn is_indexed(&self) -> bool {
        self.bones.iter().all(|b| b.index.is_some())
    }

    /// Bones sorted by export index
    pub fn bones_by_index(&self) -> Result<Vec<BoneId>> {
        let mut ordered = vec![None; self.bones.len()];
        for (id, bone) in self.bones() {
            let index = bone.index.ok_or_else(|| {
                Error::internal(format!("bone {} of {} has no index", bone.name, self.name))
            })?;
            match ordered.get_mut(index) {
                Some(slot @ None) => *slot = Some(id),
                _ => {
                    return Err(Error::internal(format!(
                        "skeleton {} has a duplicate or out-of-range index {}",
                        self.name, index
                    )))
                }
            }
        }
        Ok(ordered.into_iter().flatten().collect())
    }

    /// Export indices of a bone's children, in link order
    pub fn child_indices(&self, id: BoneId) -> Vec<usize> {
        self.bone(id)
            .map(|b| {
                b.children
                    .iter()
                    .filter_map(|c| self.bones[c.0].index)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// World (model-space) matrix of a bone in its local pose
    pub fn world_matrix(&self, id: BoneId) -> Mat4 {
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            chain.push(current);
            cursor = self.bones[current.0].parent;
        }
        chain
            .iter()
            .rev()
            .fold(Mat4::IDENTITY, |acc, b| acc * self.bones[b.0].transform.to_matrix())
    }

    /// Recompute every bone's inverse reference from its local pose
    pub fn compute_inverse_references(&mut self) -> Result<()> {
        for i in 0..self.bones.len() {
            let world = self.world_matrix(BoneId(i));
            let inverse = world.inverse().ok_or_else(|| {
                Error::invalid_data(format!("bone {} has a singular bind pose", self.bones[i].name))
            })?;
            self.bones[i].inverse_reference = inverse;
        }
        Ok(())
    }

    fn name_of(&self, id: BoneId) -> Result<&str> {
        self.bone(id)
            .map(|b| b.name.as_str())
            .ok_or_else(|| Error::unknown("bone", format!("#{} in {}", id.0, self.name)))
    }
}
