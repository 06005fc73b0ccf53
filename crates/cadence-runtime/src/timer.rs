//! Delayed work owned by components, cancelled when the owner goes away

use crate::lifecycle::{ComponentId, LifecycleRequests};
use cadence_scene::SceneGraph;

/// Boxed delayed action
pub type TimerAction = Box<dyn FnOnce(&mut TimerContext<'_>) -> anyhow::Result<()>>;

/// What a due timer can reach. Lifecycle changes go through the request
/// queue like any other hook.
pub struct TimerContext<'a> {
    pub(crate) owner: ComponentId,
    pub(crate) now: f64,
    pub scene: &'a mut SceneGraph,
    pub(crate) requests: &'a mut LifecycleRequests,
    pub(crate) timers: &'a mut TimerQueue,
}

impl TimerContext<'_> {
    pub fn owner(&self) -> ComponentId {
        self.owner
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn requests(&mut self) -> &mut LifecycleRequests {
        &mut *self.requests
    }

    /// Schedule a follow-up for the same owner
    pub fn invoke_after<F>(&mut self, delay: f64, action: F)
    where
        F: FnOnce(&mut TimerContext<'_>) -> anyhow::Result<()> + 'static,
    {
        let due_at = self.now + delay.max(0.0);
        self.timers.schedule_boxed(self.owner, due_at, Box::new(action));
    }
}

pub(crate) struct Timer {
    pub(crate) owner: ComponentId,
    due_at: f64,
    seq: u64,
    pub(crate) action: TimerAction,
}

/// Pending timers ordered by due time, then scheduling order
#[derive(Default)]
pub struct TimerQueue {
    timers: Vec<Timer>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&mut self, owner: ComponentId, due_at: f64, action: F)
    where
        F: FnOnce(&mut TimerContext<'_>) -> anyhow::Result<()> + 'static,
    {
        self.schedule_boxed(owner, due_at, Box::new(action));
    }

    pub fn schedule_boxed(&mut self, owner: ComponentId, due_at: f64, action: TimerAction) {
        self.timers.push(Timer {
            owner,
            due_at,
            seq: self.next_seq,
            action,
        });
        self.next_seq += 1;
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }

    /// Remove and return every timer due at `now`, earliest first
    pub(crate) fn take_due(&mut self, now: f64) -> Vec<Timer> {
        let (mut due, pending): (Vec<Timer>, Vec<Timer>) = std::mem::take(&mut self.timers)
            .into_iter()
            .partition(|t| t.due_at <= now);
        self.timers = pending;
        due.sort_by(|a, b| a.due_at.total_cmp(&b.due_at).then(a.seq.cmp(&b.seq)));
        due
    }
}
