//! Keyframe animation packing

use glbforge_core::{Quat, Vec3};
use glbforge_scene::Skeleton;
use tracing::{debug, warn};

use super::buffer::BufferAllocator;
use super::skin::JointNodes;
use super::{
    Animation, AnimationSampler, Channel, ChannelTarget, INTERPOLATION_LINEAR, PATH_ROTATION,
    PATH_SCALE, PATH_TRANSLATION,
};

/// Pack one animation against a skeleton's joint nodes
///
/// Returns `None` (after logging) when nothing can be exported: no keyframes,
/// or no bone keyed in every keyframe that also exists in the skeleton.
/// Bones missing from some keyframes are left out of the animation.
pub(super) fn pack_animation(
    buffer: &mut BufferAllocator,
    animation: &glbforge_scene::Animation,
    skeleton: &Skeleton,
    joints: &JointNodes,
) -> Option<Animation> {
    let dropped = animation.non_finite_keyframes();
    if dropped > 0 {
        warn!(animation = %animation.name, dropped, "Dropping keyframes with non-finite times");
    }

    let ordered = animation.ordered_keyframes();
    if ordered.is_empty() {
        warn!(animation = %animation.name, "Animation has no keyframes, skipping");
        return None;
    }

    for bone in animation.partial_bones() {
        debug!(animation = %animation.name, %bone, "Bone not keyed in every keyframe, dropping its channels");
    }

    let targets: Vec<(&str, usize)> = animation
        .complete_bones()
        .into_iter()
        .filter_map(|bone| {
            let node = skeleton
                .find(bone)
                .and_then(|id| skeleton.bone(id))
                .and_then(|b| b.index())
                .and_then(|index| joints.node_of(index));
            if node.is_none() {
                debug!(animation = %animation.name, %bone, skeleton = %skeleton.name, "Animated bone not in skeleton");
            }
            node.map(|n| (bone, n))
        })
        .collect();

    if targets.is_empty() {
        warn!(animation = %animation.name, "Animation has no bone keyed in every keyframe, skipping");
        return None;
    }

    let times: Vec<f32> = ordered.iter().map(|kf| kf.time).collect();
    let input = buffer.add_times(&times);

    let mut samplers = Vec::with_capacity(targets.len() * 3);
    let mut channels = Vec::with_capacity(targets.len() * 3);
    for (bone, node) in targets {
        let keys: Vec<_> = ordered
            .iter()
            .filter_map(|kf| kf.key(bone))
            .map(|k| k.transform)
            .collect();

        let translations: Vec<Vec3> = keys.iter().map(|t| t.translation).collect();
        let rotations: Vec<Quat> = keys.iter().map(|t| t.rotation).collect();
        let scales: Vec<Vec3> = keys.iter().map(|t| t.scale).collect();

        let outputs = [
            (PATH_TRANSLATION, buffer.add_vec3_track(&translations)),
            (PATH_ROTATION, buffer.add_quat_track(&rotations)),
            (PATH_SCALE, buffer.add_vec3_track(&scales)),
        ];
        for (path, output) in outputs {
            channels.push(Channel {
                sampler: samplers.len(),
                target: ChannelTarget {
                    node,
                    path: path.to_string(),
                },
            });
            samplers.push(AnimationSampler {
                input,
                output,
                interpolation: INTERPOLATION_LINEAR.to_string(),
            });
        }
    }

    debug!(animation = %animation.name, channels = channels.len(), "Packed animation");
    Some(Animation {
        name: Some(animation.name.clone()),
        channels,
        samplers,
    })
}
