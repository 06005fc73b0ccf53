//! Per-stage callback lists with priority ordering, metrics and fault isolation

use crate::fault::guard;
use crate::stage::Stage;
use std::time::{Duration, Instant};

/// Time information handed to every callback.
///
/// In fixed stages `now` is the simulated tick time (`index * step`) and
/// `delta` the fixed step; in variable stages they are the frame's game time
/// and frame delta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickTime {
    pub now: f64,
    pub delta: f64,
    /// Frame counter, starting at 1 for the first frame
    pub frame: u64,
    /// Fixed tick index when running a fixed stage
    pub fixed_tick: Option<i64>,
}

impl TickTime {
    pub fn frame(now: f64, delta: f64, frame: u64) -> Self {
        Self {
            now,
            delta,
            frame,
            fixed_tick: None,
        }
    }

    pub fn fixed(now: f64, delta: f64, frame: u64, tick: i64) -> Self {
        Self {
            now,
            delta,
            frame,
            fixed_tick: Some(tick),
        }
    }
}

/// Handle returned by registration; the only way to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle {
    pub(crate) stage: Stage,
    pub(crate) id: u64,
}

impl CallbackHandle {
    pub fn stage(&self) -> Stage {
        self.stage
    }
}

/// Boxed stage callback over a context `C`
pub type StageAction<C> = Box<dyn FnMut(&mut C, &mut StageContext<'_, C>) -> anyhow::Result<()>>;

pub(crate) enum RegistryCommand<C> {
    Register {
        handle: CallbackHandle,
        priority: i32,
        label: String,
        action: StageAction<C>,
    },
    Unregister(CallbackHandle),
}

/// Passed to each callback during `invoke`.
///
/// Registration changes requested here are applied once the current pass
/// has finished, so the pass in progress never skips or repeats an entry.
pub struct StageContext<'a, C> {
    stage: Stage,
    time: TickTime,
    next_id: &'a mut u64,
    commands: Vec<RegistryCommand<C>>,
}

impl<'a, C> StageContext<'a, C> {
    pub(crate) fn new(stage: Stage, time: TickTime, next_id: &'a mut u64) -> Self {
        Self {
            stage,
            time,
            next_id,
            commands: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn time(&self) -> &TickTime {
        &self.time
    }

    /// Register a callback; it first runs on the next pass of `stage`
    pub fn register<F>(
        &mut self,
        stage: Stage,
        priority: i32,
        label: impl Into<String>,
        action: F,
    ) -> CallbackHandle
    where
        F: FnMut(&mut C, &mut StageContext<'_, C>) -> anyhow::Result<()> + 'static,
    {
        let handle = CallbackHandle {
            stage,
            id: *self.next_id,
        };
        *self.next_id += 1;
        self.commands.push(RegistryCommand::Register {
            handle,
            priority,
            label: label.into(),
            action: Box::new(action),
        });
        handle
    }

    /// Unregister a callback after the current pass
    pub fn unregister(&mut self, handle: CallbackHandle) {
        self.commands.push(RegistryCommand::Unregister(handle));
    }

    pub(crate) fn into_commands(self) -> Vec<RegistryCommand<C>> {
        self.commands
    }
}

/// Snapshot of one entry's instrumentation
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackMetrics {
    pub stage: Stage,
    pub label: String,
    pub priority: i32,
    pub call_count: u64,
    pub fault_count: u64,
    pub total_time: Duration,
}

impl CallbackMetrics {
    pub fn average_time(&self) -> Duration {
        if self.call_count == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(self.total_time.as_secs_f64() / self.call_count as f64)
        }
    }
}

struct CallbackEntry<C> {
    id: u64,
    /// Registration order, breaks priority ties
    seq: u64,
    priority: i32,
    label: String,
    action: StageAction<C>,
    call_count: u64,
    fault_count: u64,
    total_time: Duration,
}

/// One stage's callbacks, sorted by `(priority, registration order)` before use
pub struct CallbackList<C> {
    stage: Stage,
    entries: Vec<CallbackEntry<C>>,
    next_seq: u64,
    needs_sort: bool,
}

impl<C> CallbackList<C> {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            entries: Vec::new(),
            next_seq: 0,
            needs_sort: false,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn add(&mut self, id: u64, priority: i32, label: String, action: StageAction<C>) {
        self.entries.push(CallbackEntry {
            id,
            seq: self.next_seq,
            priority,
            label,
            action,
            call_count: 0,
            fault_count: 0,
            total_time: Duration::ZERO,
        });
        self.next_seq += 1;
        self.needs_sort = true;
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        let removed = self.entries.len() != before;
        if removed {
            self.needs_sort = true;
        }
        removed
    }

    fn sort_if_needed(&mut self) {
        if self.needs_sort {
            // Stable sort keeps registration order between equal priorities
            self.entries.sort_by_key(|e| (e.priority, e.seq));
            self.needs_sort = false;
        }
    }

    /// Run every entry once, in order, isolating faults per entry
    pub fn invoke(&mut self, ctx: &mut C, stage_ctx: &mut StageContext<'_, C>) {
        self.sort_if_needed();

        for entry in &mut self.entries {
            let start = Instant::now();
            let result = guard(|| (entry.action)(&mut *ctx, &mut *stage_ctx));
            entry.total_time += start.elapsed();
            entry.call_count += 1;

            if let Err(fault) = result {
                entry.fault_count += 1;
                log::error!(
                    "[{}] callback '{}' failed: {}",
                    self.stage,
                    entry.label,
                    fault
                );
            }
        }
    }

    /// Metrics per entry, in invocation order
    pub fn metrics(&mut self) -> Vec<CallbackMetrics> {
        self.sort_if_needed();
        self.entries
            .iter()
            .map(|e| CallbackMetrics {
                stage: self.stage,
                label: e.label.clone(),
                priority: e.priority,
                call_count: e.call_count,
                fault_count: e.fault_count,
                total_time: e.total_time,
            })
            .collect()
    }

    /// Zero all counters without touching order or membership
    pub fn reset_metrics(&mut self) {
        for entry in &mut self.entries {
            entry.call_count = 0;
            entry.fault_count = 0;
            entry.total_time = Duration::ZERO;
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.needs_sort = false;
    }
}
