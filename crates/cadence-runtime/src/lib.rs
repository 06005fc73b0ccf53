//! Cadence Runtime - per-frame update scheduling
//!
//! Provides the frame scheduling building blocks:
//! - `Stage` / `StageRegistry` / `CallbackList` - ordered, prioritized, fault-isolated stage callbacks
//! - `FixedStepAccumulator` / `GameClock` - fixed-timestep ticks from a variable frame clock
//! - `UpdateLoop` - runs the variable stages once and the fixed stages once per tick
//! - `ComponentSet` / `Behaviour` - component lifecycle with deferred hook batches
//! - `ParallelDispatcher` / `PendingQueue` - fan-out over subtrees, fan-in to a single drain
//! - `RuntimeSystem` / `Scheduler` - explicit system list wired into the registry

mod callback;
mod clock;
mod dispatch;
mod fault;
mod lifecycle;
mod registry;
mod scheduler;
mod stage;
mod system;
mod timer;
mod update_loop;
mod world;

pub use callback::{CallbackHandle, CallbackList, CallbackMetrics, StageAction, StageContext, TickTime};
pub use clock::{FixedStepAccumulator, FixedSteps, FixedTick, GameClock};
pub use dispatch::{DispatchReport, ParallelDispatcher, PendingQueue, SubtreeRoot};
pub use fault::{guard, Fault};
pub use lifecycle::{
    Behaviour, BehaviourContext, ComponentId, ComponentSet, LifecycleRequests, LifecycleState,
};
pub use registry::StageRegistry;
pub use scheduler::{
    Scheduler, SchedulerBuilder, COMPONENT_FIXED_UPDATE_LABEL, COMPONENT_UPDATE_LABEL,
};
pub use stage::Stage;
pub use system::RuntimeSystem;
pub use timer::{TimerAction, TimerContext, TimerQueue};
pub use update_loop::{FrameContext, FrameReport, UpdateLoop};
pub use world::World;
