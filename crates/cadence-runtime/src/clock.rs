//! Game clock and fixed-timestep accumulator

use std::time::Instant;

/// One fixed simulation tick. `time` is simulated time (`index * delta`),
/// never wall time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedTick {
    pub index: i64,
    pub time: f64,
    pub delta: f64,
}

/// Ticks produced by one [`FixedStepAccumulator::advance`] call
#[derive(Debug, Clone)]
pub struct FixedSteps {
    next: i64,
    last: i64,
    step: f64,
}

impl FixedSteps {
    fn empty(step: f64) -> Self {
        Self {
            next: 1,
            last: 0,
            step,
        }
    }
}

impl Iterator for FixedSteps {
    type Item = FixedTick;

    fn next(&mut self) -> Option<FixedTick> {
        if self.next > self.last {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(FixedTick {
            index,
            time: index as f64 * self.step,
            delta: self.step,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.last - self.next + 1).max(0) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for FixedSteps {}

/// Number of whole steps that fit in `time`, corrected so that
/// `result * step <= time < (result + 1) * step` holds in floating point.
fn whole_steps(time: f64, step: f64) -> i64 {
    let mut n = (time / step).floor() as i64;
    if n as f64 * step > time {
        n -= 1;
    }
    if (n + 1) as f64 * step <= time {
        n += 1;
    }
    n
}

/// Converts a monotonically increasing clock into whole fixed ticks.
///
/// The step counter only moves forward, never past `now`, and a single
/// `advance` emits at most `max_steps` ticks. Time beyond the clamp is
/// dropped, not owed.
#[derive(Debug, Clone)]
pub struct FixedStepAccumulator {
    frequency: f64,
    step_counter: i64,
}

impl FixedStepAccumulator {
    /// `frequency` must be positive and finite (see `SchedulerConfig::validate`)
    pub fn new(frequency: f64) -> Self {
        Self {
            frequency,
            step_counter: 0,
        }
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn step_duration(&self) -> f64 {
        1.0 / self.frequency
    }

    /// Committed fixed ticks so far
    pub fn step_counter(&self) -> i64 {
        self.step_counter
    }

    /// Simulated time of the last committed tick
    pub fn simulated_time(&self) -> f64 {
        self.step_counter as f64 * self.step_duration()
    }

    /// Change the tick rate. The counter is rebased onto the new step so the
    /// simulated time already committed is kept.
    pub fn set_frequency(&mut self, frequency: f64) {
        if !frequency.is_finite() || frequency <= 0.0 || frequency == self.frequency {
            return;
        }
        let committed = self.simulated_time();
        self.frequency = frequency;
        self.step_counter = whole_steps(committed, self.step_duration()).max(0);
        log::debug!(
            "fixed frequency set to {} Hz, counter rebased to {}",
            frequency,
            self.step_counter
        );
    }

    /// Advance to `now` seconds and return the ticks to run.
    ///
    /// Non-finite, non-positive or non-advancing `now` yields no ticks and
    /// leaves the counter untouched.
    pub fn advance(&mut self, now: f64, max_steps: u32) -> FixedSteps {
        let step = self.step_duration();
        if !now.is_finite() || now <= 0.0 {
            return FixedSteps::empty(step);
        }

        // Tick indices past i64 range are treated like any other clock fault
        if now / step >= i64::MAX as f64 {
            return FixedSteps::empty(step);
        }

        let target = whole_steps(now, step);
        if target <= self.step_counter {
            return FixedSteps::empty(step);
        }

        let start = self.step_counter.max(target - i64::from(max_steps));
        self.step_counter = target;
        FixedSteps {
            next: start + 1,
            last: target,
            step,
        }
    }

    /// Fraction of a step elapsed since the last committed tick, in `[0, 1]`
    pub fn interpolation_alpha(&self, now: f64) -> f64 {
        if !now.is_finite() {
            return 0.0;
        }
        ((now - self.simulated_time()) / self.step_duration()).clamp(0.0, 1.0)
    }
}

/// Tracks scaled game time from the wall clock, one `tick` per frame
pub struct GameClock {
    /// Total elapsed game time in seconds
    pub total_time: f64,
    /// Time since last frame in seconds, after scaling
    pub delta_time: f64,
    /// Multiplier applied to wall-clock deltas
    pub time_scale: f64,
    /// Longest wall-clock delta accepted per frame
    pub max_delta: f64,
    pub paused: bool,
    last_instant: Instant,
    first_tick: bool,
}

impl Default for GameClock {
    fn default() -> Self {
        Self {
            total_time: 0.0,
            delta_time: 0.0,
            time_scale: 1.0,
            max_delta: 0.25,
            paused: false,
            last_instant: Instant::now(),
            first_tick: true,
        }
    }
}

impl GameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_scale(time_scale: f64) -> Self {
        Self {
            time_scale,
            ..Self::default()
        }
    }

    /// Advance from the wall clock. Call once per frame.
    pub fn tick(&mut self) -> f64 {
        let now = Instant::now();

        if self.first_tick {
            self.first_tick = false;
            self.last_instant = now;
            self.delta_time = 0.0;
            return self.total_time;
        }

        let elapsed = now.duration_since(self.last_instant).as_secs_f64();
        self.last_instant = now;
        self.advance_by(elapsed)
    }

    /// Advance by an explicit wall-clock delta; returns the new total time
    pub fn advance_by(&mut self, elapsed: f64) -> f64 {
        if self.paused || !elapsed.is_finite() || elapsed <= 0.0 {
            self.delta_time = 0.0;
            return self.total_time;
        }
        // Clamp to avoid a spiral of death after a long stall
        self.delta_time = elapsed.min(self.max_delta) * self.time_scale;
        self.total_time += self.delta_time;
        self.total_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(acc: &mut FixedStepAccumulator, now: f64, max: u32) -> usize {
        acc.advance(now, max).count()
    }

    #[test]
    fn test_tick_count_matches_elapsed_steps() {
        let mut acc = FixedStepAccumulator::new(50.0);
        let mut total = 0;
        let mut now = 0.0;
        for _ in 0..1000 {
            now += 1.0 / 144.0;
            for tick in acc.advance(now, 5) {
                assert!(tick.time <= now);
                total += 1;
            }
        }
        assert_eq!(total as i64, whole_steps(now, 1.0 / 50.0));
        assert_eq!(acc.step_counter(), total as i64);
    }

    #[test]
    fn test_catch_up_is_clamped() {
        let mut acc = FixedStepAccumulator::new(100.0);
        let ticks: Vec<FixedTick> = acc.advance(1.0, 5).collect();
        assert_eq!(ticks.len(), 5);
        assert_eq!(ticks[0].index, 96);
        assert_eq!(ticks[4].index, 100);
        assert_eq!(acc.step_counter(), 100);
    }

    #[test]
    fn test_high_frame_rate_yields_empty_frames() {
        let mut acc = FixedStepAccumulator::new(60.0);
        let counts: Vec<usize> = (1..=8)
            .map(|frame| count(&mut acc, frame as f64 / 240.0, 5))
            .collect();
        assert_eq!(counts.iter().sum::<usize>(), 2);
        assert_eq!(counts.iter().filter(|c| **c == 0).count(), 6);
    }

    #[test]
    fn test_tick_times_are_simulated() {
        let mut acc = FixedStepAccumulator::new(50.0);
        let ticks: Vec<FixedTick> = acc.advance(0.065, 5).collect();
        assert_eq!(ticks.len(), 3);
        for (i, tick) in ticks.iter().enumerate() {
            assert_eq!(tick.index, i as i64 + 1);
            assert!((tick.time - (i + 1) as f64 * 0.02).abs() < 1e-12);
            assert!((tick.delta - 0.02).abs() < 1e-12);
        }
    }

    #[test]
    fn test_clock_faults_emit_nothing() {
        let mut acc = FixedStepAccumulator::new(50.0);
        assert_eq!(count(&mut acc, 1.0, 100), 50);
        assert_eq!(count(&mut acc, f64::NAN, 5), 0);
        assert_eq!(count(&mut acc, f64::INFINITY, 5), 0);
        assert_eq!(count(&mut acc, -3.0, 5), 0);
        assert_eq!(count(&mut acc, 0.5, 5), 0);
        assert_eq!(acc.step_counter(), 50);
        assert_eq!(count(&mut acc, 1.03, 5), 1);
    }

    #[test]
    fn test_out_of_range_time_is_a_clock_fault() {
        let mut acc = FixedStepAccumulator::new(50.0);
        assert_eq!(count(&mut acc, 1e300, 5), 0);
        assert_eq!(count(&mut acc, f64::MAX, 5), 0);
        assert_eq!(acc.step_counter(), 0);

        assert_eq!(count(&mut acc, 0.1, 5), 5);
        assert_eq!(acc.step_counter(), 5);
    }

    #[test]
    fn test_frequency_change_keeps_simulated_time() {
        let mut acc = FixedStepAccumulator::new(50.0);
        assert_eq!(count(&mut acc, 2.0, 1000), 100);

        acc.set_frequency(100.0);
        assert_eq!(acc.step_counter(), 200);
        assert_eq!(count(&mut acc, 2.0, 1000), 0);
        assert_eq!(count(&mut acc, 2.055, 1000), 5);

        acc.set_frequency(10.0);
        assert_eq!(acc.step_counter(), 20);
        assert_eq!(count(&mut acc, 2.15, 1000), 1);
    }

    #[test]
    fn test_interpolation_alpha_tracks_partial_step() {
        let mut acc = FixedStepAccumulator::new(10.0);
        acc.advance(0.25, 5).for_each(drop);
        assert!((acc.interpolation_alpha(0.25) - 0.5).abs() < 1e-9);
        assert_eq!(acc.interpolation_alpha(0.1), 0.0);
    }

    #[test]
    fn test_first_tick_zero_delta() {
        let mut clock = GameClock::new();
        clock.tick();
        assert_eq!(clock.delta_time, 0.0);
        assert_eq!(clock.total_time, 0.0);
    }

    #[test]
    fn test_advance_by_scales_and_clamps() {
        let mut clock = GameClock::with_time_scale(2.0);
        clock.advance_by(0.1);
        assert!((clock.total_time - 0.2).abs() < 1e-12);

        clock.advance_by(10.0);
        assert!((clock.delta_time - 0.5).abs() < 1e-12);

        clock.paused = true;
        clock.advance_by(0.1);
        assert_eq!(clock.delta_time, 0.0);
        assert!((clock.total_time - 0.7).abs() < 1e-12);
    }
}
