//! Cadence Animation - per-frame node and skeletal animation
//!
//! Clips are keyframe tracks (step or linear, slerp for rotations) that drive
//! a node's local transform and the joint poses of its skeleton. The
//! [`AnimationSystem`] runs in `UpdateBones`: independent subtrees are posed
//! in parallel on the scheduler's worker pool, bone-merge followers copy
//! their target's joints in a second pass, and pose changes are applied to
//! the scene on the main thread.

pub mod animator;
pub mod clip;
pub mod sampler;
pub mod skeleton;
mod system;

pub use animator::NodeAnimator;
pub use clip::{AnimationClip, AnimationTrack, Interpolation, Keyframe, TrackProperty, TrackTarget};
pub use skeleton::{Joint, Skeleton};
pub use system::{AnimationFinished, AnimationReport, AnimationSystem};
