//! Cadence Physics - fixed-tick physics for the Cadence scheduler
//!
//! - `PhysicsBackend` - what the scheduler needs from a physics engine
//! - `RapierBackend` - Rapier 3D implementation with intersection tracking
//! - `PhysicsSystem` - steps the backend in `PhysicsStep` and hands events
//!   to per-kind listeners

mod backend;
mod rapier;
mod system;

pub use backend::{BodyPose, PhysicsBackend, PhysicsEvent, PhysicsEventKind};
pub use rapier::{RapierBackend, WorldBounds};
pub use system::{PhysicsReport, PhysicsSystem};

/// Rapier types needed to describe bodies and colliders
pub use rapier3d::prelude::{Collider, ColliderBuilder, RigidBodyBuilder};
