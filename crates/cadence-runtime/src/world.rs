//! The per-scheduler world: scene, components, timers and the worker pool

use crate::callback::TickTime;
use crate::dispatch::ParallelDispatcher;
use crate::lifecycle::ComponentSet;
use crate::stage::Stage;
use crate::timer::TimerQueue;
use crate::update_loop::FrameContext;
use cadence_core::{Result, SchedulerConfig};
use cadence_scene::SceneGraph;

/// Everything stage callbacks operate on. Owned by one [`Scheduler`] and
/// passed to callbacks by reference.
///
/// [`Scheduler`]: crate::Scheduler
pub struct World {
    pub scene: SceneGraph,
    pub components: ComponentSet,
    pub timers: TimerQueue,
    dispatcher: ParallelDispatcher,
    config: SchedulerConfig,
}

impl World {
    pub fn new(config: &SchedulerConfig) -> Result<Self> {
        Ok(Self {
            scene: SceneGraph::new(),
            components: ComponentSet::new(),
            timers: TimerQueue::new(),
            dispatcher: ParallelDispatcher::new(config.resolved_worker_threads())?,
            config: config.clone(),
        })
    }

    pub fn dispatcher(&self) -> &ParallelDispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Apply pending lifecycle requests and run the resulting hooks
    pub fn flush_lifecycle(&mut self, time: TickTime) {
        self.components
            .flush(&mut self.scene, &mut self.timers, time);
    }

    /// Run component updates for one variable frame or one fixed tick
    pub fn run_component_updates(&mut self, time: TickTime, fixed: bool) {
        self.components
            .run_updates(&mut self.scene, &mut self.timers, time, fixed);
    }

    pub fn run_due_timers(&mut self, now: f64) {
        self.components
            .run_timers(&mut self.scene, &mut self.timers, now);
    }

    /// Drop the whole scene without running any hook
    pub fn clear(&mut self) {
        self.components.clear();
        self.timers.clear();
        self.scene.clear();
    }
}

impl FrameContext for World {
    fn begin_frame(&mut self, time: &TickTime) {
        self.flush_lifecycle(*time);
        self.run_due_timers(time.now);
        self.flush_lifecycle(*time);
    }

    fn before_stage(&mut self, stage: Stage, time: &TickTime) {
        if matches!(stage, Stage::Update | Stage::FixedUpdate) {
            self.flush_lifecycle(*time);
        }
    }

    fn end_frame(&mut self, time: &TickTime) {
        self.flush_lifecycle(*time);
    }
}
