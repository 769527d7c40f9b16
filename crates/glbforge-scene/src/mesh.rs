//! Shared mesh geometry and the reference-counted mesh registry

use glbforge_core::{BoundingBox, Error, Result, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

use crate::armature::Skeleton;

/// Stable handle into a [`MeshRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MeshId(pub usize);

impl std::fmt::Display for MeshId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mesh#{}", self.0)
    }
}

/// Primitive layout of the source index list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
    Lines,
    Points,
}

/// Vertex indices influenced by one bone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexGroup {
    pub bone: String,
    pub vertices: Vec<u16>,
}

/// Deduplicated geometry, identified by its unique name
///
/// Positions, normals and UVs are parallel arrays. Skinned meshes also carry
/// one bone-index quadruplet and one weight quadruplet per vertex. Bone
/// indices are 1-based into `bone_names`; slot 0 is the "no bone" sentinel and
/// always holds `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshData {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u16>,
    #[serde(default)]
    pub topology: Topology,
    #[serde(default)]
    pub bone_indices: Vec<[u16; 4]>,
    #[serde(default)]
    pub bone_weights: Vec<[f32; 4]>,
    bone_names: Vec<Option<String>>,
    #[serde(default)]
    pub extra_bone_names: Vec<String>,
    #[serde(default)]
    groups: Vec<VertexGroup>,
    #[serde(default)]
    has_bone_data: bool,
}

impl MeshData {
    /// Create a static (unskinned) mesh
    pub fn new(
        name: impl Into<String>,
        positions: Vec<Vec3>,
        normals: Vec<Vec3>,
        uvs: Vec<Vec2>,
        indices: Vec<u16>,
    ) -> Self {
        Self {
            name: name.into(),
            positions,
            normals,
            uvs,
            indices,
            topology: Topology::TriangleList,
            bone_indices: Vec::new(),
            bone_weights: Vec::new(),
            bone_names: vec![None],
            extra_bone_names: Vec::new(),
            groups: Vec::new(),
            has_bone_data: false,
        }
    }

    /// Attach skinning attributes. `bone_names` is the deforming bone table
    /// without the sentinel; quadruplet value `n` refers to `bone_names[n - 1]`.
    pub fn with_skin(
        mut self,
        bone_indices: Vec<[u16; 4]>,
        bone_weights: Vec<[f32; 4]>,
        bone_names: Vec<String>,
    ) -> Self {
        self.bone_indices = bone_indices;
        self.bone_weights = bone_weights;
        self.bone_names = std::iter::once(None)
            .chain(bone_names.into_iter().map(Some))
            .collect();
        self.groups.clear();
        self.has_bone_data = false;
        self
    }

    /// Non-deforming bones that must still be exported as joints
    pub fn with_extra_bones(mut self, extra: Vec<String>) -> Self {
        self.extra_bone_names = extra;
        self
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Raw skinning attributes are present
    pub fn is_skinned(&self) -> bool {
        !self.bone_indices.is_empty()
    }

    /// Skinning attributes are present and every bone resolved in the bound skeleton
    pub fn has_bone_data(&self) -> bool {
        self.has_bone_data
    }

    /// Bone table including the sentinel at index 0
    pub fn bone_table(&self) -> &[Option<String>] {
        &self.bone_names
    }

    /// Deforming bone names in table order, sentinel excluded
    pub fn deforming_bones(&self) -> impl Iterator<Item = &str> {
        self.bone_names.iter().skip(1).flatten().map(String::as_str)
    }

    pub fn vertex_groups(&self) -> &[VertexGroup] {
        &self.groups
    }

    pub fn vertex_group(&self, bone: &str) -> Option<&VertexGroup> {
        self.groups.iter().find(|g| g.bone == bone)
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_points(&self.positions)
    }

    /// Check array lengths and index ranges
    pub fn validate(&self) -> Result<()> {
        let count = self.positions.len();
        if count == 0 || self.indices.is_empty() {
            return Err(Error::invalid_data(format!(
                "mesh {} has no {}",
                self.name,
                if count == 0 { "vertices" } else { "indices" }
            )));
        }
        if count > u16::MAX as usize + 1 {
            return Err(Error::invalid_data(format!(
                "mesh {} has {} vertices, more than a 16-bit index can address",
                self.name, count
            )));
        }
        let parallel = [
            ("normals", self.normals.len()),
            ("uvs", self.uvs.len()),
            ("bone indices", self.bone_indices.len()),
            ("bone weights", self.bone_weights.len()),
        ];
        for (what, len) in parallel {
            if len != 0 && len != count {
                return Err(Error::invalid_data(format!(
                    "mesh {}: {} {} for {} positions",
                    self.name, len, what, count
                )));
            }
        }
        if self.bone_indices.len() != self.bone_weights.len() {
            return Err(Error::invalid_data(format!(
                "mesh {}: bone indices and weights differ in length",
                self.name
            )));
        }
        if let Some(&bad) = self.indices.iter().find(|&&i| i as usize >= count) {
            return Err(Error::invalid_data(format!(
                "mesh {}: index {} out of range for {} vertices",
                self.name, bad, count
            )));
        }
        if self.bone_names.first().is_some_and(Option::is_some) {
            return Err(Error::invalid_data(format!(
                "mesh {}: bone table slot 0 must be the empty sentinel",
                self.name
            )));
        }
        Ok(())
    }

    /// Build one vertex group per deforming bone from the skinning attributes
    ///
    /// No-op when the mesh carries no skinning attributes. A pair with bone
    /// index 0 and weight 0 is an unused slot and is skipped. A pair that
    /// points at the sentinel (or past the table) with a nonzero weight marks
    /// an unweighted vertex: construction stops there without error and the
    /// groups built so far are kept.
    pub fn construct_groups(&mut self) {
        self.groups.clear();
        if !self.is_skinned() {
            return;
        }

        let mut lookup: HashMap<&str, usize> = HashMap::new();
        for name in self.bone_names.iter().skip(1).flatten() {
            if !lookup.contains_key(name.as_str()) {
                lookup.insert(name.as_str(), self.groups.len());
                self.groups.push(VertexGroup {
                    bone: name.clone(),
                    vertices: Vec::new(),
                });
            }
        }

        let mut seen: HashSet<(usize, u16)> = HashSet::new();
        for &vertex in &self.indices {
            let (Some(ids), Some(weights)) = (
                self.bone_indices.get(vertex as usize),
                self.bone_weights.get(vertex as usize),
            ) else {
                debug!(mesh = %self.name, vertex, "vertex has no skinning attributes");
                return;
            };

            for (&id, &weight) in ids.iter().zip(weights.iter()) {
                if id == 0 && weight == 0.0 {
                    continue;
                }
                let Some(Some(name)) = self.bone_names.get(id as usize) else {
                    trace!(mesh = %self.name, vertex, bone = id, "unweighted vertex, stopping group construction");
                    return;
                };
                let group = lookup[name.as_str()];
                if seen.insert((group, vertex)) {
                    self.groups[group].vertices.push(vertex);
                }
            }
        }
    }

    /// Resolve the bone table against a skeleton, updating `has_bone_data`
    pub fn bind_skeleton(&mut self, skeleton: &Skeleton) -> bool {
        let missing = self
            .deforming_bones()
            .chain(self.extra_bone_names.iter().map(String::as_str))
            .find(|name| skeleton.find(name).is_none())
            .map(str::to_owned);

        self.has_bone_data = match missing {
            Some(bone) => {
                debug!(mesh = %self.name, skeleton = %skeleton.name, %bone, "bone not in skeleton");
                false
            }
            None => self.is_skinned(),
        };
        self.has_bone_data
    }
}

#[derive(Debug)]
struct MeshSlot {
    data: MeshData,
    users: usize,
}

/// Arena of shared meshes keyed by name, with an explicit usage count
///
/// A mesh is evicted when its last user releases it.
#[derive(Debug, Default)]
pub struct MeshRegistry {
    slots: Vec<Option<MeshSlot>>,
    by_name: HashMap<String, MeshId>,
}

impl MeshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mesh under its unique name
    pub fn insert(&mut self, data: MeshData) -> Result<MeshId> {
        if self.by_name.contains_key(&data.name) {
            return Err(Error::duplicate("mesh", data.name));
        }
        let id = MeshId(self.slots.len());
        self.by_name.insert(data.name.clone(), id);
        self.slots.push(Some(MeshSlot { data, users: 0 }));
        Ok(id)
    }

    pub fn find(&self, name: &str) -> Option<MeshId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: MeshId) -> Option<&MeshData> {
        self.slot(id).map(|s| &s.data)
    }

    pub fn get_mut(&mut self, id: MeshId) -> Option<&mut MeshData> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .map(|s| &mut s.data)
    }

    pub fn contains(&self, id: MeshId) -> bool {
        self.slot(id).is_some()
    }

    pub fn users(&self, id: MeshId) -> usize {
        self.slot(id).map_or(0, |s| s.users)
    }

    /// Record one more user of `id`
    pub fn acquire(&mut self, id: MeshId) -> Result<()> {
        let slot = self
            .slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::unknown("mesh", id.to_string()))?;
        slot.users += 1;
        Ok(())
    }

    /// Drop one user of `id`; returns true when that evicted the mesh
    pub fn release(&mut self, id: MeshId) -> Result<bool> {
        let entry = self
            .slots
            .get_mut(id.0)
            .ok_or_else(|| Error::unknown("mesh", id.to_string()))?;
        let slot = entry
            .as_mut()
            .ok_or_else(|| Error::unknown("mesh", id.to_string()))?;

        slot.users = slot.users.saturating_sub(1);
        if slot.users > 0 {
            return Ok(false);
        }

        if let Some(evicted) = entry.take() {
            debug!(mesh = %evicted.data.name, "last user released, evicting mesh");
            self.by_name.remove(&evicted.data.name);
        }
        Ok(true)
    }

    /// Number of live meshes
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Live meshes in id order
    pub fn iter(&self) -> impl Iterator<Item = (MeshId, &MeshData)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (MeshId(i), &s.data)))
    }

    fn slot(&self, id: MeshId) -> Option<&MeshSlot> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glbforge_core::{Mat4, Transform};

    fn quad(name: &str) -> MeshData {
        MeshData::new(
            name,
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![Vec3::new(0.0, 0.0, 1.0); 4],
            vec![Vec2::ZERO; 4],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    fn skinned_quad() -> MeshData {
        quad("skinned").with_skin(
            vec![[1, 0, 0, 0], [1, 2, 0, 0], [2, 0, 0, 0], [2, 0, 0, 0]],
            vec![
                [1.0, 0.0, 0.0, 0.0],
                [0.5, 0.5, 0.0, 0.0],
                [1.0, 0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0, 0.0],
            ],
            vec!["hip".into(), "knee".into()],
        )
    }

    #[test]
    fn test_sentinel_is_slot_zero() {
        let mesh = skinned_quad();
        assert_eq!(mesh.bone_table()[0], None);
        assert_eq!(mesh.deforming_bones().collect::<Vec<_>>(), vec!["hip", "knee"]);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_construct_groups() {
        let mut mesh = skinned_quad();
        mesh.construct_groups();

        let groups = mesh.vertex_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(mesh.vertex_group("hip").unwrap().vertices, vec![0, 1]);
        assert_eq!(mesh.vertex_group("knee").unwrap().vertices, vec![1, 2, 3]);
        assert!(groups.iter().all(|g| !g.bone.is_empty()));
    }

    #[test]
    fn test_construct_groups_static_mesh_is_noop() {
        let mut mesh = quad("static");
        mesh.construct_groups();
        assert!(mesh.vertex_groups().is_empty());
    }

    #[test]
    fn test_construct_groups_stops_on_sentinel_reference() {
        let mut mesh = quad("partial").with_skin(
            vec![[1, 0, 0, 0], [0, 0, 0, 0], [1, 0, 0, 0], [1, 0, 0, 0]],
            vec![
                [1.0, 0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0, 0.0],
            ],
            vec!["root".into()],
        );
        mesh.construct_groups();

        // Vertex 1 references the sentinel with full weight: stop after vertex 0
        assert_eq!(mesh.vertex_group("root").unwrap().vertices, vec![0]);
    }

    #[test]
    fn test_validate_rejects_bad_index() {
        let mut mesh = quad("bad");
        mesh.indices.push(9);
        assert!(mesh.validate().unwrap_err().is_parse_error());
    }

    #[test]
    fn test_validate_rejects_empty_geometry() {
        let empty = MeshData::new("empty", Vec::new(), Vec::new(), Vec::new(), Vec::new());
        assert!(empty.validate().is_err());

        let mut unindexed = quad("unindexed");
        unindexed.indices.clear();
        assert!(unindexed.validate().is_err());
    }

    #[test]
    fn test_bind_skeleton() {
        let mut skeleton = Skeleton::new("rig");
        skeleton.add_bone("hip", Transform::IDENTITY, Mat4::IDENTITY).unwrap();

        let mut mesh = skinned_quad();
        assert!(!mesh.bind_skeleton(&skeleton));

        skeleton.add_bone("knee", Transform::IDENTITY, Mat4::IDENTITY).unwrap();
        assert!(mesh.bind_skeleton(&skeleton));

        let mut extra = skinned_quad().with_extra_bones(vec!["weapon".into()]);
        assert!(!extra.bind_skeleton(&skeleton));
    }

    #[test]
    fn test_registry_refcount_eviction() {
        let mut registry = MeshRegistry::new();
        let id = registry.insert(quad("cube")).unwrap();
        registry.acquire(id).unwrap();
        registry.acquire(id).unwrap();
        assert_eq!(registry.users(id), 2);

        assert!(!registry.release(id).unwrap());
        assert!(registry.contains(id));
        assert!(registry.release(id).unwrap());
        assert!(!registry.contains(id));
        assert!(registry.find("cube").is_none());
        assert!(registry.is_empty());

        assert!(registry.acquire(id).is_err());
    }

    #[test]
    fn test_registry_rejects_duplicate_names() {
        let mut registry = MeshRegistry::new();
        registry.insert(quad("cube")).unwrap();
        let err = registry.insert(quad("cube")).unwrap_err();
        assert!(matches!(err, Error::Duplicate { .. }));
    }
}
