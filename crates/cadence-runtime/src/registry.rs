//! StageRegistry - the single place where per-frame ordering is decided

use crate::callback::{
    CallbackHandle, CallbackList, CallbackMetrics, RegistryCommand, StageAction, StageContext,
    TickTime,
};
use crate::stage::Stage;
use std::collections::BTreeMap;

/// Stage → callback list map, owned by one scheduler instance.
///
/// Stage order is fixed by [`Stage`]; only priorities within a stage vary.
/// A list is created on the first registration for its stage.
pub struct StageRegistry<C> {
    lists: BTreeMap<Stage, CallbackList<C>>,
    next_id: u64,
}

impl<C> Default for StageRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> StageRegistry<C> {
    pub fn new() -> Self {
        Self {
            lists: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Attach `action` to `stage`. Lower priorities run first; equal
    /// priorities run in registration order.
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
            id: self.next_id,
        };
        self.next_id += 1;
        self.insert(handle, priority, label.into(), Box::new(action));
        handle
    }

    fn insert(&mut self, handle: CallbackHandle, priority: i32, label: String, action: StageAction<C>) {
        log::trace!("registered '{}' on {} (priority {})", label, handle.stage, priority);
        self.lists
            .entry(handle.stage)
            .or_insert_with(|| CallbackList::new(handle.stage))
            .add(handle.id, priority, label, action);
    }

    /// Remove a callback. Returns false when the handle is unknown or already removed.
    ///
    /// From inside a running callback use [`StageContext::unregister`] instead;
    /// the removal then applies once the current pass completes.
    pub fn unregister(&mut self, handle: CallbackHandle) -> bool {
        self.lists
            .get_mut(&handle.stage)
            .map(|list| list.remove(handle.id))
            .unwrap_or(false)
    }

    /// Run every callback of `stage` once, in order, on the calling thread
    pub fn invoke(&mut self, stage: Stage, ctx: &mut C, time: TickTime) {
        let Some(list) = self.lists.get_mut(&stage) else {
            return;
        };
        if list.is_empty() {
            return;
        }

        let mut stage_ctx = StageContext::new(stage, time, &mut self.next_id);
        list.invoke(ctx, &mut stage_ctx);
        let commands = stage_ctx.into_commands();
        self.apply(commands);
    }

    /// Run every stage once in total order
    pub fn invoke_all(&mut self, ctx: &mut C, time: TickTime) {
        for stage in Stage::ALL {
            self.invoke(stage, ctx, time);
        }
    }

    fn apply(&mut self, commands: Vec<RegistryCommand<C>>) {
        for command in commands {
            match command {
                RegistryCommand::Register {
                    handle,
                    priority,
                    label,
                    action,
                } => self.insert(handle, priority, label, action),
                RegistryCommand::Unregister(handle) => {
                    self.unregister(handle);
                }
            }
        }
    }

    pub fn callback_count(&self, stage: Stage) -> usize {
        self.lists.get(&stage).map(|l| l.len()).unwrap_or(0)
    }

    /// Metrics for one stage, in invocation order
    pub fn metrics(&mut self, stage: Stage) -> Vec<CallbackMetrics> {
        self.lists
            .get_mut(&stage)
            .map(|l| l.metrics())
            .unwrap_or_default()
    }

    /// Metrics for every stage, in stage order then invocation order
    pub fn all_metrics(&mut self) -> Vec<CallbackMetrics> {
        self.lists.values_mut().flat_map(|l| l.metrics()).collect()
    }

    pub fn reset_metrics(&mut self) {
        for list in self.lists.values_mut() {
            list.reset_metrics();
        }
    }

    /// Drop every callback (scene teardown)
    pub fn clear(&mut self) {
        for list in self.lists.values_mut() {
            list.clear();
        }
        self.lists.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Vec<String>;

    fn time() -> TickTime {
        TickTime::frame(0.0, 0.0, 1)
    }

    fn record(reg: &mut StageRegistry<Log>, stage: Stage, priority: i32, name: &'static str) -> CallbackHandle {
        reg.register(stage, priority, name, move |log: &mut Log, _: &mut StageContext<'_, Log>| {
            log.push(name.to_string());
            Ok(())
        })
    }

    #[test]
    fn test_invoke_all_respects_stage_order() {
        let mut reg = StageRegistry::new();
        record(&mut reg, Stage::PreRender, -100, "pre_render");
        record(&mut reg, Stage::PhysicsStep, 0, "physics");
        record(&mut reg, Stage::StartUpdate, 100, "start");
        record(&mut reg, Stage::UpdateBones, 0, "bones");

        let mut log = Vec::new();
        reg.invoke_all(&mut log, time());
        assert_eq!(log, vec!["start", "bones", "physics", "pre_render"]);
    }

    #[test]
    fn test_unregister_is_immediate_outside_invoke() {
        let mut reg = StageRegistry::new();
        let a = record(&mut reg, Stage::Update, 0, "a");
        record(&mut reg, Stage::Update, 0, "b");

        assert!(reg.unregister(a));
        assert!(!reg.unregister(a));

        let mut log = Vec::new();
        reg.invoke(Stage::Update, &mut log, time());
        assert_eq!(log, vec!["b"]);
    }

    #[test]
    fn test_unregister_during_invoke_applies_next_pass() {
        let mut reg: StageRegistry<Log> = StageRegistry::new();
        let victim: Rc<RefCell<Option<CallbackHandle>>> = Rc::new(RefCell::new(None));

        let v = Rc::clone(&victim);
        reg.register(Stage::Update, 0, "killer", move |log: &mut Log, cx: &mut StageContext<'_, Log>| {
            log.push("killer".into());
            if let Some(handle) = v.borrow_mut().take() {
                cx.unregister(handle);
            }
            Ok(())
        });
        let handle = record(&mut reg, Stage::Update, 1, "victim");
        *victim.borrow_mut() = Some(handle);

        let mut log = Vec::new();
        reg.invoke(Stage::Update, &mut log, time());
        assert_eq!(log, vec!["killer", "victim"]);

        log.clear();
        reg.invoke(Stage::Update, &mut log, time());
        assert_eq!(log, vec!["killer"]);
        assert_eq!(reg.callback_count(Stage::Update), 1);
    }

    #[test]
    fn test_self_unregister_and_register_during_invoke() {
        let mut reg: StageRegistry<Log> = StageRegistry::new();
        let me: Rc<RefCell<Option<CallbackHandle>>> = Rc::new(RefCell::new(None));

        let m = Rc::clone(&me);
        let handle = reg.register(Stage::Update, 0, "once", move |log: &mut Log, cx: &mut StageContext<'_, Log>| {
            log.push("once".into());
            if let Some(handle) = m.borrow_mut().take() {
                cx.unregister(handle);
                cx.register(Stage::Update, 0, "successor", |log: &mut Log, _: &mut StageContext<'_, Log>| {
                    log.push("successor".into());
                    Ok(())
                });
            }
            Ok(())
        });
        *me.borrow_mut() = Some(handle);

        let mut log = Vec::new();
        reg.invoke(Stage::Update, &mut log, time());
        reg.invoke(Stage::Update, &mut log, time());
        reg.invoke(Stage::Update, &mut log, time());
        assert_eq!(log, vec!["once", "successor", "successor"]);
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut reg = StageRegistry::new();
        record(&mut reg, Stage::Update, 0, "a");
        record(&mut reg, Stage::FixedUpdate, 0, "b");
        reg.clear();

        let mut log = Vec::new();
        reg.invoke_all(&mut log, time());
        assert!(log.is_empty());
        assert_eq!(reg.callback_count(Stage::Update), 0);
    }

    #[test]
    fn test_all_metrics_in_stage_order() {
        let mut reg = StageRegistry::new();
        record(&mut reg, Stage::PreRender, 0, "late");
        record(&mut reg, Stage::StartUpdate, 0, "early");

        let mut log = Vec::new();
        reg.invoke_all(&mut log, time());
        let labels: Vec<String> = reg.all_metrics().into_iter().map(|m| m.label).collect();
        assert_eq!(labels, vec!["early", "late"]);
    }
}
