//! Component lifecycle: deferred Awake/OnEnabled/OnDisabled/OnDestroy batches,
//! start-once gating and per-frame updates

use crate::callback::TickTime;
use crate::fault::guard;
use crate::timer::{TimerAction, TimerContext, TimerQueue};
use cadence_core::Liveness;
use cadence_scene::{Entity, SceneGraph};
use std::fmt;

/// Upper bound on flush passes; callbacks that keep requesting changes
/// finish on a later flush.
const MAX_FLUSH_PASSES: usize = 16;

/// A unit of simulation logic attached to a scene node.
///
/// Every hook is optional. Hooks never run concurrently and never for a
/// destroyed component.
pub trait Behaviour: 'static {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn on_awake(&mut self, _cx: &mut BehaviourContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_enabled(&mut self, _cx: &mut BehaviourContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs once, right before the first update while active
    fn on_start(&mut self, _cx: &mut BehaviourContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_update(&mut self, _cx: &mut BehaviourContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_fixed_update(&mut self, _cx: &mut BehaviourContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_disabled(&mut self, _cx: &mut BehaviourContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_destroy(&mut self, _cx: &mut BehaviourContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Generation-checked reference to a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId {
    index: u32,
    generation: u32,
}

impl ComponentId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Created, waiting for an active owner
    Uninitialized,
    /// Awake scheduled, not enabled
    Initialized,
    Active,
    Disabled,
    /// Terminal; released at the end of the flush
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleRequest {
    Enable(ComponentId),
    Disable(ComponentId),
    Destroy(ComponentId),
}

/// Lifecycle changes queued until the next flush
#[derive(Debug, Default)]
pub struct LifecycleRequests {
    queue: Vec<LifecycleRequest>,
}

impl LifecycleRequests {
    pub fn request_enable(&mut self, id: ComponentId) {
        self.queue.push(LifecycleRequest::Enable(id));
    }

    pub fn request_disable(&mut self, id: ComponentId) {
        self.queue.push(LifecycleRequest::Disable(id));
    }

    pub fn destroy(&mut self, id: ComponentId) {
        self.queue.push(LifecycleRequest::Destroy(id));
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// What a behaviour hook can reach
pub struct BehaviourContext<'a> {
    id: ComponentId,
    owner: Entity,
    time: TickTime,
    pub scene: &'a mut SceneGraph,
    requests: &'a mut LifecycleRequests,
    timers: &'a mut TimerQueue,
}

impl BehaviourContext<'_> {
    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn owner(&self) -> Entity {
        self.owner
    }

    pub fn time(&self) -> &TickTime {
        &self.time
    }

    pub fn request_enable(&mut self, id: ComponentId) {
        self.requests.request_enable(id);
    }

    pub fn request_disable(&mut self, id: ComponentId) {
        self.requests.request_disable(id);
    }

    pub fn destroy(&mut self, id: ComponentId) {
        self.requests.destroy(id);
    }

    pub fn destroy_self(&mut self) {
        self.requests.destroy(self.id);
    }

    /// Run `action` once `delay` seconds have passed, unless this component
    /// is destroyed first
    pub fn invoke_after<F>(&mut self, delay: f64, action: F)
    where
        F: FnOnce(&mut TimerContext<'_>) -> anyhow::Result<()> + 'static,
    {
        let action: TimerAction = Box::new(action);
        self.timers
            .schedule_boxed(self.id, self.time.now + delay.max(0.0), action);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hook {
    Awake,
    Enabled,
    Start,
    Update,
    FixedUpdate,
    Disabled,
    Destroy,
}

impl Hook {
    fn name(self) -> &'static str {
        match self {
            Hook::Awake => "Awake",
            Hook::Enabled => "OnEnabled",
            Hook::Start => "Start",
            Hook::Update => "OnUpdate",
            Hook::FixedUpdate => "OnFixedUpdate",
            Hook::Disabled => "OnDisabled",
            Hook::Destroy => "OnDestroy",
        }
    }

    fn call(self, behaviour: &mut dyn Behaviour, cx: &mut BehaviourContext<'_>) -> anyhow::Result<()> {
        match self {
            Hook::Awake => behaviour.on_awake(cx),
            Hook::Enabled => behaviour.on_enabled(cx),
            Hook::Start => behaviour.on_start(cx),
            Hook::Update => behaviour.on_update(cx),
            Hook::FixedUpdate => behaviour.on_fixed_update(cx),
            Hook::Disabled => behaviour.on_disabled(cx),
            Hook::Destroy => behaviour.on_destroy(cx),
        }
    }
}

struct ComponentEntry {
    behaviour: Box<dyn Behaviour>,
    owner: Entity,
    enabled: bool,
    state: LifecycleState,
    /// OnEnabled ran without a matching OnDisabled
    enabled_latch: bool,
    start_called: bool,
    destroy_requested: bool,
}

struct Slot {
    generation: u32,
    entry: Option<ComponentEntry>,
}

/// Hooks for one flush pass, run kind by kind
#[derive(Default)]
struct Batch {
    awake: Vec<ComponentId>,
    enabled: Vec<ComponentId>,
    disabled: Vec<ComponentId>,
    destroy: Vec<ComponentId>,
}

impl Batch {
    fn is_empty(&self) -> bool {
        self.awake.is_empty()
            && self.enabled.is_empty()
            && self.disabled.is_empty()
            && self.destroy.is_empty()
    }

    fn into_calls(self) -> impl Iterator<Item = (Hook, ComponentId)> {
        let awake = self.awake.into_iter().map(|id| (Hook::Awake, id));
        let enabled = self.enabled.into_iter().map(|id| (Hook::Enabled, id));
        let disabled = self.disabled.into_iter().map(|id| (Hook::Disabled, id));
        let destroy = self.destroy.into_iter().map(|id| (Hook::Destroy, id));
        awake.chain(enabled).chain(disabled).chain(destroy)
    }
}

/// Owns every component of a scene and drives their lifecycle
#[derive(Default)]
pub struct ComponentSet {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Live components in creation order
    order: Vec<ComponentId>,
    requests: LifecycleRequests,
}

impl ComponentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an enabled component to `owner`. Awake and OnEnabled run at the
    /// next flush once the owner is active.
    pub fn add(&mut self, owner: Entity, behaviour: impl Behaviour) -> ComponentId {
        self.insert(owner, Box::new(behaviour), true)
    }

    /// Attach a component that stays disabled until `request_enable`
    pub fn add_disabled(&mut self, owner: Entity, behaviour: impl Behaviour) -> ComponentId {
        self.insert(owner, Box::new(behaviour), false)
    }

    pub fn add_boxed(&mut self, owner: Entity, behaviour: Box<dyn Behaviour>, enabled: bool) -> ComponentId {
        self.insert(owner, behaviour, enabled)
    }

    fn insert(&mut self, owner: Entity, behaviour: Box<dyn Behaviour>, enabled: bool) -> ComponentId {
        let entry = ComponentEntry {
            behaviour,
            owner,
            enabled,
            state: LifecycleState::Uninitialized,
            enabled_latch: false,
            start_called: false,
            destroy_requested: false,
        };

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                ComponentId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                ComponentId {
                    index,
                    generation: 0,
                }
            }
        };
        self.order.push(id);
        log::trace!("component {} added to {:?}", id, owner);
        id
    }

    fn entry(&self, id: ComponentId) -> Option<&ComponentEntry> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(slots: &mut [Slot], id: ComponentId) -> Option<&mut ComponentEntry> {
        slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    /// Stale once the component is destroyed or scheduled for destruction
    pub fn liveness(&self, id: ComponentId) -> Liveness {
        Liveness::from_alive(self.entry(id).is_some_and(|e| {
            !e.destroy_requested && e.state != LifecycleState::Destroyed
        }))
    }

    pub fn request_enable(&mut self, id: ComponentId) -> Liveness {
        let liveness = self.liveness(id);
        if liveness.is_ok() {
            self.requests.request_enable(id);
        }
        liveness
    }

    pub fn request_disable(&mut self, id: ComponentId) -> Liveness {
        let liveness = self.liveness(id);
        if liveness.is_ok() {
            self.requests.request_disable(id);
        }
        liveness
    }

    /// Schedule destruction; OnDisabled/OnDestroy run at the next flush
    pub fn destroy(&mut self, id: ComponentId) -> Liveness {
        let liveness = self.liveness(id);
        if liveness.is_ok() {
            self.requests.destroy(id);
        }
        liveness
    }

    /// Request destruction of every live component
    pub fn destroy_all(&mut self) {
        for &id in &self.order {
            self.requests.destroy(id);
        }
    }

    pub fn requests_mut(&mut self) -> &mut LifecycleRequests {
        &mut self.requests
    }

    pub fn state(&self, id: ComponentId) -> Option<LifecycleState> {
        self.entry(id).map(|e| e.state)
    }

    pub fn owner(&self, id: ComponentId) -> Option<Entity> {
        self.entry(id).map(|e| e.owner)
    }

    pub fn is_enabled(&self, id: ComponentId) -> bool {
        self.entry(id).is_some_and(|e| e.enabled)
    }

    /// Enabled, not destroyed, and the owner is active in the hierarchy
    pub fn is_active(&self, id: ComponentId, scene: &SceneGraph) -> bool {
        self.liveness(id).is_ok()
            && self
                .entry(id)
                .is_some_and(|e| e.enabled && scene.is_active_in_hierarchy(e.owner))
    }

    pub fn start_called(&self, id: ComponentId) -> bool {
        self.entry(id).is_some_and(|e| e.start_called)
    }

    pub fn components_of(&self, owner: Entity) -> Vec<ComponentId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.entry(*id).is_some_and(|e| e.owner == owner))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drop every component without running any hook
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            if slot.entry.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.free = (0..self.slots.len() as u32).rev().collect();
        self.order.clear();
        self.requests.queue.clear();
    }

    /// Apply queued requests and run the resulting lifecycle hooks.
    ///
    /// Hooks run grouped by kind (Awake, OnEnabled, OnDisabled, OnDestroy),
    /// each group in creation order. Requests made by those hooks are applied
    /// in a following pass of the same flush.
    pub fn flush(&mut self, scene: &mut SceneGraph, timers: &mut TimerQueue, time: TickTime) {
        for _ in 0..MAX_FLUSH_PASSES {
            self.apply_requests();
            let batch = self.plan(scene);
            let empty = batch.is_empty();
            for (hook, id) in batch.into_calls() {
                self.invoke(id, hook, scene, timers, time);
            }
            self.release_destroyed();
            if empty {
                return;
            }
        }
        log::warn!(
            "lifecycle flush did not settle after {} passes; {} request(s) deferred",
            MAX_FLUSH_PASSES,
            self.requests.len()
        );
    }

    /// Run `OnUpdate` (or `OnFixedUpdate`) on every active component, calling
    /// `Start` first for components that have never started
    pub fn run_updates(&mut self, scene: &mut SceneGraph, timers: &mut TimerQueue, time: TickTime, fixed: bool) {
        let hook = if fixed { Hook::FixedUpdate } else { Hook::Update };

        for i in 0..self.order.len() {
            let id = self.order[i];
            let Some(entry) = Self::entry_mut(&mut self.slots, id) else {
                continue;
            };
            if entry.state != LifecycleState::Active
                || !entry.enabled_latch
                || entry.destroy_requested
                || !scene.is_active_in_hierarchy(entry.owner)
            {
                continue;
            }

            if !entry.start_called {
                entry.start_called = true;
                self.invoke(id, Hook::Start, scene, timers, time);
                let still_active = Self::entry_mut(&mut self.slots, id)
                    .is_some_and(|e| e.enabled_latch && scene.is_active_in_hierarchy(e.owner));
                if !still_active {
                    continue;
                }
            }
            self.invoke(id, hook, scene, timers, time);
        }
    }

    fn apply_requests(&mut self) {
        for request in std::mem::take(&mut self.requests.queue) {
            let id = match request {
                LifecycleRequest::Enable(id)
                | LifecycleRequest::Disable(id)
                | LifecycleRequest::Destroy(id) => id,
            };
            let Some(entry) = Self::entry_mut(&mut self.slots, id)
                .filter(|e| e.state != LifecycleState::Destroyed)
            else {
                log::trace!("dropping {:?}: component is stale", request);
                continue;
            };
            match request {
                LifecycleRequest::Enable(_) => entry.enabled = true,
                LifecycleRequest::Disable(_) => entry.enabled = false,
                LifecycleRequest::Destroy(_) => entry.destroy_requested = true,
            }
        }
    }

    fn plan(&mut self, scene: &SceneGraph) -> Batch {
        let mut batch = Batch::default();

        for i in 0..self.order.len() {
            let id = self.order[i];
            let Some(entry) = Self::entry_mut(&mut self.slots, id) else {
                continue;
            };
            if entry.state == LifecycleState::Destroyed {
                continue;
            }

            if entry.destroy_requested || !scene.contains(entry.owner) {
                if entry.enabled_latch {
                    entry.enabled_latch = false;
                    batch.disabled.push(id);
                }
                if entry.state != LifecycleState::Uninitialized {
                    batch.destroy.push(id);
                }
                entry.state = LifecycleState::Destroyed;
                continue;
            }

            let owner_active = scene.is_active_in_hierarchy(entry.owner);
            if entry.state == LifecycleState::Uninitialized {
                if !owner_active {
                    continue;
                }
                entry.state = LifecycleState::Initialized;
                batch.awake.push(id);
            }

            let should_be_active = entry.enabled && owner_active;
            if should_be_active && !entry.enabled_latch {
                entry.enabled_latch = true;
                entry.state = LifecycleState::Active;
                batch.enabled.push(id);
            } else if !should_be_active && entry.enabled_latch {
                entry.enabled_latch = false;
                entry.state = LifecycleState::Disabled;
                batch.disabled.push(id);
            }
        }

        batch
    }

    fn release_destroyed(&mut self) {
        let slots = &mut self.slots;
        let free = &mut self.free;
        self.order.retain(|id| {
            let slot = &mut slots[id.index as usize];
            let destroyed = slot
                .entry
                .as_ref()
                .is_some_and(|e| e.state == LifecycleState::Destroyed);
            if destroyed {
                slot.entry = None;
                slot.generation = slot.generation.wrapping_add(1);
                free.push(id.index);
                log::trace!("component {} released", id);
            }
            !destroyed
        });
    }

    fn invoke(&mut self, id: ComponentId, hook: Hook, scene: &mut SceneGraph, timers: &mut TimerQueue, time: TickTime) {
        let Some(entry) = Self::entry_mut(&mut self.slots, id) else {
            return;
        };
        let owner = entry.owner;
        // Only the teardown hooks may run once the owner is gone
        if !matches!(hook, Hook::Disabled | Hook::Destroy)
            && (entry.destroy_requested || !scene.contains(owner))
        {
            match hook {
                Hook::Awake => entry.state = LifecycleState::Uninitialized,
                Hook::Enabled => {
                    entry.enabled_latch = false;
                    if entry.state == LifecycleState::Active {
                        entry.state = LifecycleState::Disabled;
                    }
                }
                _ => {}
            }
            log::trace!("{} skipped for {}: owner destroyed", hook.name(), id);
            return;
        }
        let mut cx = BehaviourContext {
            id,
            owner,
            time,
            scene: &mut *scene,
            requests: &mut self.requests,
            timers: &mut *timers,
        };
        let result = guard(|| hook.call(entry.behaviour.as_mut(), &mut cx));

        if let Err(fault) = result {
            log::error!(
                "{}#{} on {}: {} failed: {}",
                entry.behaviour.name(),
                id,
                scene.name(owner).unwrap_or("<destroyed>"),
                hook.name(),
                fault
            );
        }
    }

    /// Run the timers due at `now` whose owners are still alive
    pub fn run_timers(&mut self, scene: &mut SceneGraph, timers: &mut TimerQueue, now: f64) {
        for timer in timers.take_due(now) {
            if self.liveness(timer.owner).is_stale() {
                log::trace!("timer for {} cancelled: owner destroyed", timer.owner);
                continue;
            }
            let mut cx = TimerContext {
                owner: timer.owner,
                now,
                scene: &mut *scene,
                requests: &mut self.requests,
                timers: &mut *timers,
            };
            let action = timer.action;
            if let Err(fault) = guard(|| action(&mut cx)) {
                log::error!("timer for component {} failed: {}", timer.owner, fault);
            }
        }
    }
}
