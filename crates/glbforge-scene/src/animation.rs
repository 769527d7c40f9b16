//! Keyframe animations
//!
//! Keyframes are stored in whatever order the reader produced them;
//! [`Animation::ordered_keyframes`] is the sorted view the exporter walks.

use glbforge_core::Transform;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Pose of one bone at one keyframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    pub bone: String,
    pub transform: Transform,
}

/// All bone poses at one point in time (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f32,
    pub keys: Vec<Key>,
}

impl Keyframe {
    pub fn new(time: f32) -> Self {
        Self { time, keys: Vec::new() }
    }

    pub fn with_key(mut self, bone: impl Into<String>, transform: Transform) -> Self {
        self.keys.push(Key { bone: bone.into(), transform });
        self
    }

    /// First key for `bone`
    pub fn key(&self, bone: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.bone == bone)
    }
}

/// Named set of keyframes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animation {
    pub name: String,
    pub keyframes: Vec<Keyframe>,
}

impl Animation {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), keyframes: Vec::new() }
    }

    pub fn with_keyframe(mut self, keyframe: Keyframe) -> Self {
        self.keyframes.push(keyframe);
        self
    }

    /// Keyframes sorted by time; equal times keep storage order
    ///
    /// Keyframes with a non-finite time are left out.
    pub fn ordered_keyframes(&self) -> Vec<&Keyframe> {
        let mut ordered: Vec<&Keyframe> = self.keyframes.iter().filter(|k| k.time.is_finite()).collect();
        ordered.sort_by(|a, b| a.time.total_cmp(&b.time));
        ordered
    }

    /// Number of keyframes whose time is NaN or infinite
    pub fn non_finite_keyframes(&self) -> usize {
        self.keyframes.iter().filter(|k| !k.time.is_finite()).count()
    }

    /// Time span covered by the keyframes
    pub fn duration(&self) -> f32 {
        let times = self.keyframes.iter().map(|k| k.time).filter(|t| t.is_finite());
        let (min, max) = times.fold((f32::MAX, f32::MIN), |(lo, hi), t| (lo.min(t), hi.max(t)));
        if max >= min { max - min } else { 0.0 }
    }

    /// Bones keyed in every keyframe, in first-seen order of the earliest keyframe
    pub fn complete_bones(&self) -> Vec<&str> {
        let ordered = self.ordered_keyframes();
        let Some((&first, rest)) = ordered.split_first() else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        first
            .keys
            .iter()
            .map(|k| k.bone.as_str())
            .filter(|bone| seen.insert(*bone))
            .filter(|bone| rest.iter().all(|kf| kf.key(bone).is_some()))
            .collect()
    }

    /// Bones keyed in some keyframes but not all of them
    pub fn partial_bones(&self) -> Vec<&str> {
        let complete: HashSet<&str> = self.complete_bones().into_iter().collect();
        let mut seen = HashSet::new();
        self.ordered_keyframes()
            .into_iter()
            .flat_map(|kf| kf.keys.iter().map(|k| k.bone.as_str()))
            .filter(|bone| !complete.contains(bone) && seen.insert(*bone))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glbforge_core::{Quat, Vec3};

    fn at(x: f32) -> Transform {
        Transform::from_trs(Vec3::new(x, 0.0, 0.0), Quat::IDENTITY, Vec3::ONE)
    }

    #[test]
    fn test_ordered_keyframes_sorts_by_time_stably() {
        let anim = Animation::new("walk")
            .with_keyframe(Keyframe::new(1.0).with_key("a", at(1.0)))
            .with_keyframe(Keyframe::new(0.0).with_key("a", at(0.0)))
            .with_keyframe(Keyframe::new(1.0).with_key("a", at(2.0)));

        let ordered = anim.ordered_keyframes();
        let xs: Vec<f32> = ordered.iter().map(|k| k.keys[0].transform.translation.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);
        // Storage order is untouched
        assert_eq!(anim.keyframes[0].time, 1.0);
        assert_eq!(anim.duration(), 1.0);
    }

    #[test]
    fn test_complete_and_partial_bones() {
        let anim = Animation::new("idle")
            .with_keyframe(
                Keyframe::new(0.0)
                    .with_key("hip", at(0.0))
                    .with_key("tail", at(0.0))
                    .with_key("head", at(0.0)),
            )
            .with_keyframe(Keyframe::new(0.5).with_key("head", at(1.0)).with_key("hip", at(1.0)));

        assert_eq!(anim.complete_bones(), vec!["hip", "head"]);
        assert_eq!(anim.partial_bones(), vec!["tail"]);
    }

    #[test]
    fn test_non_finite_times_are_dropped() {
        let mut anim = Animation::new("glitch");
        for i in 0..23 {
            let time = if i % 3 == 0 { f32::NAN } else { (23 - i) as f32 * 0.1 };
            anim = anim.with_keyframe(Keyframe::new(time).with_key("a", at(i as f32)));
        }
        anim = anim.with_keyframe(Keyframe::new(f32::INFINITY).with_key("a", at(0.0)));

        let ordered = anim.ordered_keyframes();
        assert_eq!(ordered.len(), 15);
        assert_eq!(anim.non_finite_keyframes(), 9);
        assert!(ordered.windows(2).all(|w| w[0].time <= w[1].time));
        assert!((anim.duration() - 2.1).abs() < 1e-5);
    }

    #[test]
    fn test_empty_animation() {
        let anim = Animation::new("nothing");
        assert!(anim.ordered_keyframes().is_empty());
        assert!(anim.complete_bones().is_empty());
        assert_eq!(anim.duration(), 0.0);
    }
}
