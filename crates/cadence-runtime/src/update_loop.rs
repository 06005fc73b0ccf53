//! Per-frame orchestration of variable and fixed stages

use crate::callback::TickTime;
use crate::clock::{FixedStepAccumulator, GameClock};
use crate::registry::StageRegistry;
use crate::stage::Stage;

/// Hooks the loop calls around stages. Every method defaults to a no-op.
pub trait FrameContext {
    fn begin_frame(&mut self, _time: &TickTime) {}

    /// Called before each stage invocation, fixed stages included
    fn before_stage(&mut self, _stage: Stage, _time: &TickTime) {}

    fn end_frame(&mut self, _time: &TickTime) {}
}

impl FrameContext for () {}

/// What one frame did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub now: f64,
    pub delta: f64,
    pub fixed_ticks: usize,
}

/// Drives one registry through whole frames.
///
/// Each frame runs the variable stages once, then the fixed stages once per
/// tick the accumulator grants, then `PreRender`.
pub struct UpdateLoop<C> {
    registry: StageRegistry<C>,
    accumulator: FixedStepAccumulator,
    max_fixed_steps: u32,
    clock: GameClock,
    frame: u64,
    last_now: f64,
}

impl<C: FrameContext> UpdateLoop<C> {
    pub fn new(fixed_frequency: f64, max_fixed_steps: u32) -> Self {
        Self {
            registry: StageRegistry::new(),
            accumulator: FixedStepAccumulator::new(fixed_frequency),
            max_fixed_steps,
            clock: GameClock::new(),
            frame: 0,
            last_now: 0.0,
        }
    }

    pub fn registry(&self) -> &StageRegistry<C> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut StageRegistry<C> {
        &mut self.registry
    }

    pub fn accumulator(&self) -> &FixedStepAccumulator {
        &self.accumulator
    }

    pub fn clock(&self) -> &GameClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut GameClock {
        &mut self.clock
    }

    /// Game time of the latest frame
    pub fn now(&self) -> f64 {
        self.last_now
    }

    /// Frames run so far
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Takes effect on the next frame
    pub fn set_fixed_frequency(&mut self, frequency: f64) {
        self.accumulator.set_frequency(frequency);
    }

    pub fn set_max_fixed_steps(&mut self, max_fixed_steps: u32) {
        self.max_fixed_steps = max_fixed_steps;
    }

    /// Render interpolation factor for the last frame
    pub fn interpolation_alpha(&self) -> f64 {
        self.accumulator.interpolation_alpha(self.last_now)
    }

    /// Run one frame at game time `now` (seconds since start)
    pub fn run_frame(&mut self, ctx: &mut C, now: f64) -> FrameReport {
        self.frame += 1;
        let delta = if now.is_finite() && now > self.last_now {
            now - self.last_now
        } else {
            0.0
        };
        if now.is_finite() && now > self.last_now {
            self.last_now = now;
        }
        let frame_time = TickTime::frame(self.last_now, delta, self.frame);

        ctx.begin_frame(&frame_time);

        for stage in Stage::VARIABLE {
            self.run_stage(ctx, stage, frame_time);
        }

        let mut fixed_ticks = 0;
        for tick in self.accumulator.advance(now, self.max_fixed_steps) {
            let tick_time = TickTime::fixed(tick.time, tick.delta, self.frame, tick.index);
            for stage in Stage::FIXED {
                self.run_stage(ctx, stage, tick_time);
            }
            fixed_ticks += 1;
        }

        self.run_stage(ctx, Stage::PreRender, frame_time);
        ctx.end_frame(&frame_time);

        log::trace!(
            "frame {} at {:.4}s: {} fixed tick(s)",
            self.frame,
            self.last_now,
            fixed_ticks
        );

        FrameReport {
            frame: self.frame,
            now: self.last_now,
            delta,
            fixed_ticks,
        }
    }

    /// Run one frame from the wall clock
    pub fn tick(&mut self, ctx: &mut C) -> FrameReport {
        let now = self.clock.tick();
        self.run_frame(ctx, now)
    }

    /// Run one frame after advancing game time by `dt` wall-clock seconds
    pub fn advance(&mut self, ctx: &mut C, dt: f64) -> FrameReport {
        let now = self.clock.advance_by(dt);
        self.run_frame(ctx, now)
    }

    fn run_stage(&mut self, ctx: &mut C, stage: Stage, time: TickTime) {
        ctx.before_stage(stage, &time);
        self.registry.invoke(stage, ctx, time);
    }
}
