//! Cadence Core - Foundational types for the Cadence scheduler
//!
//! This crate provides the types that all other Cadence crates depend on:
//! - `Transform`, `Vec3`, `Mat4` - Spatial types and matrix helpers
//! - `SchedulerConfig` - Fixed-tick, catch-up and worker pool settings
//! - `Liveness` - Ok/Stale result for generation-checked handles
//! - Error types and Result alias

mod config;
mod error;
mod liveness;
mod types;

pub use config::SchedulerConfig;
pub use error::{CadenceError, Result};
pub use liveness::Liveness;
pub use types::{mat4_approx_eq, mat4_mul, mat4_translation, Mat4, Transform, Vec3, IDENTITY_MAT4};
