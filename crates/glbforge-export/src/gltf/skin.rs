//! Skins and joint node trees

use glbforge_core::Error;
use glbforge_scene::{MeshData, Skeleton};
use tracing::debug;

use super::buffer::BufferAllocator;
use super::exporter::{GltfExportError, GltfResult};
use super::{Node, Skin};

/// Joint nodes emitted for one skeleton
///
/// The bone with export index `i` lives at node `base + i`.
#[derive(Debug, Clone, Copy)]
pub(super) struct JointNodes {
    pub base: usize,
    pub count: usize,
    pub root: usize,
    pub skin: Option<usize>,
}

impl JointNodes {
    pub fn node_of(&self, bone_index: usize) -> Option<usize> {
        (bone_index < self.count).then_some(self.base + bone_index)
    }
}

/// Append one node per bone, in export-index order
pub(super) fn emit_joint_nodes(nodes: &mut Vec<Node>, skeleton: &Skeleton) -> GltfResult<JointNodes> {
    let order = skeleton.bones_by_index()?;
    let root = skeleton.root()?;
    let root_index = skeleton
        .bone(root)
        .and_then(|b| b.index())
        .ok_or_else(|| Error::internal(format!("root of {} has no index", skeleton.name)))?;

    let base = nodes.len();
    for &id in &order {
        let Some(bone) = skeleton.bone(id) else {
            continue;
        };
        let mut node = Node::from_transform(&bone.name, &bone.transform);
        node.children = skeleton
            .child_indices(id)
            .into_iter()
            .map(|i| base + i)
            .collect();
        nodes.push(node);
    }

    debug!(skeleton = %skeleton.name, joints = order.len(), "Emitted joint nodes");
    Ok(JointNodes {
        base,
        count: order.len(),
        root: base + root_index,
        skin: None,
    })
}

/// Write the inverse bind matrices and the skin record for emitted joints
pub(super) fn add_skin(
    skins: &mut Vec<Skin>,
    buffer: &mut BufferAllocator,
    skeleton: &Skeleton,
    joints: &JointNodes,
) -> GltfResult<usize> {
    let matrices: Vec<_> = skeleton
        .bones_by_index()?
        .into_iter()
        .filter_map(|id| skeleton.bone(id).map(|b| b.inverse_reference))
        .collect();
    let inverse_bind_matrices = buffer.add_matrices(&matrices);

    let index = skins.len();
    skins.push(Skin {
        name: Some(skeleton.name.clone()),
        inverse_bind_matrices,
        joints: (joints.base..joints.base + joints.count).collect(),
        skeleton: Some(joints.root),
    });
    Ok(index)
}

/// JOINTS_0 / WEIGHTS_0 values for a bound mesh
///
/// Quadruplet entries are translated from bone-table slots to the skeleton's
/// export indices. Slots naming no bone are written as joint 0 with weight 0.
pub(super) fn joint_attributes(
    mesh: &MeshData,
    skeleton: &Skeleton,
) -> GltfResult<(Vec<[u16; 4]>, Vec<[f32; 4]>)> {
    let mut table = Vec::with_capacity(mesh.bone_table().len());
    for slot in mesh.bone_table() {
        let joint = match slot {
            None => None,
            Some(name) => {
                let index = skeleton
                    .find(name)
                    .and_then(|id| skeleton.bone(id))
                    .and_then(|b| b.index())
                    .ok_or_else(|| Error::unknown("bone", format!("{} in {}", name, skeleton.name)))?;
                let joint = u16::try_from(index).map_err(|_| GltfExportError::IndexOverflow {
                    what: format!("joint {} of {}", name, skeleton.name),
                    index,
                })?;
                Some(joint)
            }
        };
        table.push(joint);
    }

    let mut joints = Vec::with_capacity(mesh.bone_indices.len());
    let mut weights = Vec::with_capacity(mesh.bone_weights.len());
    for (ids, ws) in mesh.bone_indices.iter().zip(&mesh.bone_weights) {
        let mut joint = [0u16; 4];
        let mut weight = [0f32; 4];
        for k in 0..4 {
            if let Some(Some(j)) = table.get(ids[k] as usize) {
                joint[k] = *j;
                weight[k] = ws[k];
            }
        }
        joints.push(joint);
        weights.push(weight);
    }
    Ok((joints, weights))
}
