//! Named synchronization points within one frame

use std::fmt;

/// A stage of the frame. Declaration order is the execution order.
///
/// Variable-rate stages run once per frame, the fixed stages run once per
/// fixed tick (zero or more times per frame) after `FinishUpdate`, and
/// `PreRender` closes the frame once every pose is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    StartUpdate,
    Update,
    UpdateBones,
    FinishUpdate,
    StartFixedUpdate,
    FixedUpdate,
    PhysicsStep,
    FinishFixedUpdate,
    PreRender,
}

impl Stage {
    /// Every stage in total order
    pub const ALL: [Stage; 9] = [
        Stage::StartUpdate,
        Stage::Update,
        Stage::UpdateBones,
        Stage::FinishUpdate,
        Stage::StartFixedUpdate,
        Stage::FixedUpdate,
        Stage::PhysicsStep,
        Stage::FinishFixedUpdate,
        Stage::PreRender,
    ];

    /// Stages run once per frame before the fixed ticks
    pub const VARIABLE: [Stage; 4] = [
        Stage::StartUpdate,
        Stage::Update,
        Stage::UpdateBones,
        Stage::FinishUpdate,
    ];

    /// Stages run once per fixed tick
    pub const FIXED: [Stage; 4] = [
        Stage::StartFixedUpdate,
        Stage::FixedUpdate,
        Stage::PhysicsStep,
        Stage::FinishFixedUpdate,
    ];

    pub fn is_fixed(self) -> bool {
        Self::FIXED.contains(&self)
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::StartUpdate => "StartUpdate",
            Stage::Update => "Update",
            Stage::UpdateBones => "UpdateBones",
            Stage::FinishUpdate => "FinishUpdate",
            Stage::StartFixedUpdate => "StartFixedUpdate",
            Stage::FixedUpdate => "FixedUpdate",
            Stage::PhysicsStep => "PhysicsStep",
            Stage::FinishFixedUpdate => "FinishFixedUpdate",
            Stage::PreRender => "PreRender",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
