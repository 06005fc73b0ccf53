//! Scheduler - owns the update loop, the world and the system list

use crate::callback::{CallbackHandle, CallbackMetrics, StageContext, TickTime};
use crate::stage::Stage;
use crate::system::RuntimeSystem;
use crate::update_loop::{FrameReport, UpdateLoop};
use crate::world::World;
use cadence_core::{CadenceError, Result, SchedulerConfig};
use std::cell::RefCell;
use std::rc::Rc;

type SharedSystem = Rc<RefCell<dyn RuntimeSystem>>;

/// Label of the built-in callback that runs component updates
pub const COMPONENT_UPDATE_LABEL: &str = "components.update";
/// Label of the built-in callback that runs component fixed updates
pub const COMPONENT_FIXED_UPDATE_LABEL: &str = "components.fixed_update";

/// Collects systems in the order they will be registered
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    systems: Vec<SharedSystem>,
}

impl SchedulerBuilder {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            systems: Vec::new(),
        }
    }

    pub fn with_system<S: RuntimeSystem + 'static>(mut self, system: S) -> Self {
        self.systems.push(Rc::new(RefCell::new(system)));
        self
    }

    /// Add a system the caller keeps a handle to (to add listeners or read
    /// results between frames)
    pub fn with_shared_system<S: RuntimeSystem + 'static>(mut self, system: Rc<RefCell<S>>) -> Self {
        self.systems.push(system);
        self
    }

    /// Validate the config, initialize every system and register its stages
    pub fn build(self) -> Result<Scheduler> {
        self.build_with(|_| Ok(()))
    }

    /// Like [`build`](Self::build), but populates the world before systems
    /// are initialized
    pub fn build_with<F>(self, populate: F) -> Result<Scheduler>
    where
        F: FnOnce(&mut World) -> Result<()>,
    {
        self.config.validate()?;

        let mut world = World::new(&self.config)?;
        populate(&mut world)?;

        let mut update_loop = UpdateLoop::new(self.config.fixed_frequency, self.config.max_fixed_steps);
        update_loop.clock_mut().time_scale = self.config.time_scale;

        let registry = update_loop.registry_mut();
        registry.register(
            Stage::Update,
            0,
            COMPONENT_UPDATE_LABEL,
            |world: &mut World, cx: &mut StageContext<'_, World>| {
                world.run_component_updates(*cx.time(), false);
                Ok(())
            },
        );
        registry.register(
            Stage::FixedUpdate,
            0,
            COMPONENT_FIXED_UPDATE_LABEL,
            |world: &mut World, cx: &mut StageContext<'_, World>| {
                world.run_component_updates(*cx.time(), true);
                Ok(())
            },
        );

        for system in &self.systems {
            let (name, subscriptions) = {
                let mut sys = system.borrow_mut();
                let name = sys.name().to_string();
                sys.initialize(&mut world).map_err(|e| {
                    CadenceError::RuntimeError(format!("system '{name}' failed to initialize: {e:#}"))
                })?;
                (name, sys.subscriptions())
            };
            log::info!("initialized system '{}' ({} stage(s))", name, subscriptions.len());

            for (stage, priority) in subscriptions {
                let system = Rc::clone(system);
                registry.register(
                    stage,
                    priority,
                    name.clone(),
                    move |world: &mut World, cx: &mut StageContext<'_, World>| {
                        system.borrow_mut().run(cx.stage(), world, cx.time())
                    },
                );
            }
        }

        Ok(Scheduler {
            update_loop,
            world,
            systems: self.systems,
            config: self.config,
        })
    }
}

/// Owns the update loop (registry + fixed clock) and the world it drives
pub struct Scheduler {
    update_loop: UpdateLoop<World>,
    world: World,
    systems: Vec<SharedSystem>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn builder(config: SchedulerConfig) -> SchedulerBuilder {
        SchedulerBuilder::new(config)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn update_loop(&self) -> &UpdateLoop<World> {
        &self.update_loop
    }

    /// Run one frame at game time `now`
    pub fn frame(&mut self, now: f64) -> FrameReport {
        self.update_loop.run_frame(&mut self.world, now)
    }

    /// Run one frame from the wall clock
    pub fn tick(&mut self) -> FrameReport {
        self.update_loop.tick(&mut self.world)
    }

    /// Run one frame after `dt` wall-clock seconds
    pub fn advance(&mut self, dt: f64) -> FrameReport {
        self.update_loop.advance(&mut self.world, dt)
    }

    pub fn register<F>(&mut self, stage: Stage, priority: i32, label: impl Into<String>, action: F) -> CallbackHandle
    where
        F: FnMut(&mut World, &mut StageContext<'_, World>) -> anyhow::Result<()> + 'static,
    {
        self.update_loop
            .registry_mut()
            .register(stage, priority, label, action)
    }

    pub fn unregister(&mut self, handle: CallbackHandle) -> bool {
        self.update_loop.registry_mut().unregister(handle)
    }

    pub fn set_fixed_frequency(&mut self, frequency: f64) -> Result<()> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(CadenceError::ConfigError(format!(
                "fixed_frequency must be a positive number, got {frequency}"
            )));
        }
        self.config.fixed_frequency = frequency;
        self.update_loop.set_fixed_frequency(frequency);
        Ok(())
    }

    pub fn metrics(&mut self) -> Vec<CallbackMetrics> {
        self.update_loop.registry_mut().all_metrics()
    }

    pub fn reset_metrics(&mut self) {
        self.update_loop.registry_mut().reset_metrics();
    }

    /// Destroy every component (running their hooks), shut systems down in
    /// reverse order and drop all callbacks
    pub fn shutdown(&mut self) {
        let time = TickTime::frame(self.update_loop.now(), 0.0, self.update_loop.frame_count());
        self.world.components.destroy_all();
        self.world.flush_lifecycle(time);

        for system in self.systems.iter().rev() {
            let mut sys = system.borrow_mut();
            if let Err(e) = sys.shutdown(&mut self.world) {
                log::error!("system '{}' failed to shut down: {:#}", sys.name(), e);
            }
        }

        self.update_loop.registry_mut().clear();
        self.world.clear();
        log::info!("scheduler shut down after {} frame(s)", self.update_loop.frame_count());
    }
}
