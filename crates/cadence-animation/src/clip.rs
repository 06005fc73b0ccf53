//! Animation clip data and TOML loading

use cadence_core::{CadenceError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A named set of keyframe tracks
///
/// ```toml
/// name = "bob"
/// duration = 2.0
///
/// [[tracks]]
/// property = "Translation"
///
/// [[tracks.keyframes]]
/// time = 0.0
/// value = [0.0, 0.0, 0.0]
///
/// [[tracks.keyframes]]
/// time = 2.0
/// value = [0.0, 1.0, 0.0]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationClip {
    pub name: String,
    /// Total duration in seconds
    pub duration: f64,
    pub tracks: Vec<AnimationTrack>,
}

/// One property of the node itself, or of one joint of its skeleton
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationTrack {
    #[serde(default)]
    pub target: TrackTarget,
    pub property: TrackProperty,
    #[serde(default)]
    pub interpolation: Interpolation,
    /// Sorted by time
    pub keyframes: Vec<Keyframe>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TrackTarget {
    /// The animated node's local transform
    #[default]
    Node,
    /// A joint of the node's skeleton, by joint name
    Joint { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackProperty {
    Translation,
    /// Quaternion, xyzw
    Rotation,
    Scale,
}

impl TrackProperty {
    /// Floats per keyframe value
    pub fn width(self) -> usize {
        match self {
            TrackProperty::Rotation => 4,
            TrackProperty::Translation | TrackProperty::Scale => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    /// Hold the previous keyframe
    Step,
    /// Lerp for vectors, slerp for rotations
    #[default]
    Linear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Seconds from clip start
    pub time: f64,
    /// 3 floats for translation/scale, 4 for rotation
    pub value: Vec<f32>,
}

impl AnimationClip {
    /// Parse and validate a clip from TOML
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let clip: Self = toml::from_str(source)
            .map_err(|e| CadenceError::AnimationError(format!("failed to parse clip: {e}")))?;
        clip.validate()?;
        Ok(clip)
    }

    /// Load and validate a clip from a `.anim.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            CadenceError::AnimationError(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(CadenceError::AnimationError(format!(
                "clip '{}' has non-positive duration: {}",
                self.name, self.duration
            )));
        }

        for (i, track) in self.tracks.iter().enumerate() {
            if track.keyframes.is_empty() {
                return Err(CadenceError::AnimationError(format!(
                    "clip '{}' track {} has no keyframes",
                    self.name, i
                )));
            }
            if track.keyframes.windows(2).any(|w| w[0].time > w[1].time) {
                return Err(CadenceError::AnimationError(format!(
                    "clip '{}' track {} keyframes are not sorted by time",
                    self.name, i
                )));
            }
            let width = track.property.width();
            if let Some(bad) = track.keyframes.iter().find(|k| k.value.len() != width) {
                return Err(CadenceError::AnimationError(format!(
                    "clip '{}' track {} expects {} values per keyframe, got {} at t={}",
                    self.name,
                    i,
                    width,
                    bad.value.len(),
                    bad.time
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOB: &str = r#"
name = "bob"
duration = 2.0

[[tracks]]
property = "Translation"

[[tracks.keyframes]]
time = 0.0
value = [0.0, 0.0, 0.0]

[[tracks.keyframes]]
time = 2.0
value = [0.0, 1.0, 0.0]

[[tracks]]
property = "Rotation"
interpolation = "Step"

[tracks.target]
type = "Joint"
name = "hand"

[[tracks.keyframes]]
time = 0.0
value = [0.0, 0.0, 0.0, 1.0]
"#;

    #[test]
    fn test_parses_node_and_joint_tracks() {
        let clip = AnimationClip::from_toml_str(BOB).unwrap();
        assert_eq!(clip.name, "bob");
        assert_eq!(clip.tracks.len(), 2);
        assert_eq!(clip.tracks[0].target, TrackTarget::Node);
        assert_eq!(clip.tracks[0].interpolation, Interpolation::Linear);
        assert_eq!(
            clip.tracks[1].target,
            TrackTarget::Joint {
                name: "hand".into()
            }
        );
        assert_eq!(clip.tracks[1].interpolation, Interpolation::Step);
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        let source = BOB.replace("duration = 2.0", "duration = 0.0");
        assert!(AnimationClip::from_toml_str(&source).is_err());
    }

    #[test]
    fn test_rejects_wrong_value_width() {
        let source = BOB.replace("value = [0.0, 0.0, 0.0, 1.0]", "value = [0.0, 0.0, 1.0]");
        let err = AnimationClip::from_toml_str(&source).unwrap_err();
        assert!(err.to_string().contains("expects 4 values"));
    }

    #[test]
    fn test_rejects_unsorted_keyframes() {
        let source = BOB.replace("time = 2.0", "time = -1.0");
        assert!(AnimationClip::from_toml_str(&source).is_err());
    }
}
