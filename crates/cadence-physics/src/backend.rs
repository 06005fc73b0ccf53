//! The contract between the scheduler and a physics engine

use cadence_core::Vec3;
use cadence_scene::Entity;
use std::fmt;

/// Listener categories, one list per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PhysicsEventKind {
    IntersectionStart,
    IntersectionUpdate,
    IntersectionEnd,
    BodyOutOfBounds,
}

impl PhysicsEventKind {
    pub const ALL: [PhysicsEventKind; 4] = [
        PhysicsEventKind::IntersectionStart,
        PhysicsEventKind::IntersectionUpdate,
        PhysicsEventKind::IntersectionEnd,
        PhysicsEventKind::BodyOutOfBounds,
    ];
}

impl fmt::Display for PhysicsEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Something the backend observed during one fixed tick.
///
/// Intersection pairs are ordered so that `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicsEvent {
    IntersectionStart { a: Entity, b: Entity },
    /// The pair was already overlapping before this tick and still is
    IntersectionUpdate { a: Entity, b: Entity },
    IntersectionEnd { a: Entity, b: Entity },
    BodyOutOfBounds { entity: Entity },
}

impl PhysicsEvent {
    pub fn kind(&self) -> PhysicsEventKind {
        match self {
            PhysicsEvent::IntersectionStart { .. } => PhysicsEventKind::IntersectionStart,
            PhysicsEvent::IntersectionUpdate { .. } => PhysicsEventKind::IntersectionUpdate,
            PhysicsEvent::IntersectionEnd { .. } => PhysicsEventKind::IntersectionEnd,
            PhysicsEvent::BodyOutOfBounds { .. } => PhysicsEventKind::BodyOutOfBounds,
        }
    }

    /// Entities the event refers to
    pub fn entities(&self) -> Vec<Entity> {
        match *self {
            PhysicsEvent::IntersectionStart { a, b }
            | PhysicsEvent::IntersectionUpdate { a, b }
            | PhysicsEvent::IntersectionEnd { a, b } => vec![a, b],
            PhysicsEvent::BodyOutOfBounds { entity } => vec![entity],
        }
    }
}

/// World-space pose of a simulated body after a step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyPose {
    pub entity: Entity,
    pub position: Vec3,
    /// Quaternion, xyzw
    pub rotation: [f32; 4],
}

/// A physics engine stepped once per fixed tick from `PhysicsStep`
pub trait PhysicsBackend {
    /// Advance the simulation by `delta` seconds of simulated time, split
    /// into `sub_steps` equal steps. `sim_time` is the tick's time.
    fn step(&mut self, sim_time: f64, delta: f64, sub_steps: u32) -> anyhow::Result<Vec<PhysicsEvent>>;

    /// Poses of the bodies the simulation moves
    fn body_poses(&self) -> Vec<BodyPose>;

    /// Entities that currently own a body
    fn bodies(&self) -> Vec<Entity>;

    /// Remove the body owned by `entity`. Returns false if it had none.
    fn remove_body(&mut self, entity: Entity) -> bool;
}
