//! Physics as a scheduler system: one backend step per fixed tick

use crate::backend::{PhysicsBackend, PhysicsEvent, PhysicsEventKind};
use cadence_runtime::{guard, RuntimeSystem, Stage, TickTime, World};
use std::collections::BTreeMap;

type Listener = Box<dyn FnMut(&mut World, &PhysicsEvent) -> anyhow::Result<()>>;

/// Counters for the last fixed tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhysicsReport {
    pub events: usize,
    pub poses_written: usize,
    pub listener_faults: usize,
}

/// Steps a [`PhysicsBackend`] in `PhysicsStep`, writes simulated poses back
/// to the scene and hands events to the listeners registered for their kind
pub struct PhysicsSystem<B> {
    backend: B,
    sub_steps: u32,
    listeners: BTreeMap<PhysicsEventKind, Vec<Listener>>,
    last_report: PhysicsReport,
}

impl<B: PhysicsBackend> PhysicsSystem<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            sub_steps: 1,
            listeners: BTreeMap::new(),
            last_report: PhysicsReport::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn sub_steps(&self) -> u32 {
        self.sub_steps
    }

    /// Listen to one kind of event. Listeners of a kind run in the order
    /// they were added.
    pub fn on<F>(&mut self, kind: PhysicsEventKind, listener: F)
    where
        F: FnMut(&mut World, &PhysicsEvent) -> anyhow::Result<()> + 'static,
    {
        self.listeners.entry(kind).or_default().push(Box::new(listener));
    }

    pub fn listener_count(&self, kind: PhysicsEventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    pub fn last_report(&self) -> PhysicsReport {
        self.last_report
    }

    /// Run one fixed tick against `world`
    pub fn step(&mut self, world: &mut World, time: &TickTime) -> anyhow::Result<PhysicsReport> {
        for entity in self.backend.bodies() {
            if world.scene.liveness(entity).is_stale() {
                self.backend.remove_body(entity);
                log::debug!("removed body of destroyed node {:?}", entity);
            }
        }

        let events = self.backend.step(time.now, time.delta, self.sub_steps)?;

        let mut report = PhysicsReport {
            events: events.len(),
            ..PhysicsReport::default()
        };

        for pose in self.backend.body_poses() {
            if world.scene.parent(pose.entity).is_some() {
                log::trace!("skipping pose of parented body {:?}", pose.entity);
                continue;
            }
            let Some(mut local) = world.scene.local_transform(pose.entity) else {
                continue;
            };
            if local.position == pose.position && local.rotation == pose.rotation {
                continue;
            }
            local.position = pose.position;
            local.rotation = pose.rotation;
            world.scene.set_local_transform(pose.entity, local)?;
            report.poses_written += 1;
        }

        for event in &events {
            // Listeners of earlier events may have destroyed these nodes
            if event
                .entities()
                .iter()
                .any(|e| world.scene.liveness(*e).is_stale())
            {
                continue;
            }
            let Some(listeners) = self.listeners.get_mut(&event.kind()) else {
                continue;
            };
            for listener in listeners.iter_mut() {
                if let Err(fault) = guard(|| listener(&mut *world, event)) {
                    report.listener_faults += 1;
                    log::error!("[PhysicsStep] {} listener failed: {}", event.kind(), fault);
                }
            }
        }

        self.last_report = report;
        Ok(report)
    }
}

impl<B: PhysicsBackend> RuntimeSystem for PhysicsSystem<B> {
    fn name(&self) -> &str {
        "physics"
    }

    fn subscriptions(&self) -> Vec<(Stage, i32)> {
        vec![(Stage::PhysicsStep, 0)]
    }

    fn initialize(&mut self, world: &mut World) -> anyhow::Result<()> {
        self.sub_steps = world.config().physics_sub_steps.max(1);
        log::debug!(
            "physics: {} sub-step(s) per tick, {} body(ies)",
            self.sub_steps,
            self.backend.bodies().len()
        );
        Ok(())
    }

    fn run(&mut self, _stage: Stage, world: &mut World, time: &TickTime) -> anyhow::Result<()> {
        self.step(world, time).map(|_| ())
    }

    fn shutdown(&mut self, _world: &mut World) -> anyhow::Result<()> {
        self.listeners.clear();
        for entity in self.backend.bodies() {
            self.backend.remove_body(entity);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BodyPose;
    use cadence_core::{SchedulerConfig, Transform, Vec3};
    use cadence_runtime::Scheduler;
    use cadence_scene::Entity;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Replays scripted events, one batch per step
    #[derive(Default)]
    struct Scripted {
        bodies: Vec<Entity>,
        script: Vec<Vec<PhysicsEvent>>,
        steps: Vec<(f64, f64, u32)>,
    }

    impl PhysicsBackend for Scripted {
        fn step(&mut self, sim_time: f64, delta: f64, sub_steps: u32) -> anyhow::Result<Vec<PhysicsEvent>> {
            self.steps.push((sim_time, delta, sub_steps));
            let index = self.steps.len() - 1;
            Ok(self.script.get(index).cloned().unwrap_or_default())
        }

        fn body_poses(&self) -> Vec<BodyPose> {
            self.bodies
                .iter()
                .map(|&entity| BodyPose {
                    entity,
                    position: Vec3::new(0.0, -(self.steps.len() as f32), 0.0),
                    rotation: [0.0, 0.0, 0.0, 1.0],
                })
                .collect()
        }

        fn bodies(&self) -> Vec<Entity> {
            self.bodies.clone()
        }

        fn remove_body(&mut self, entity: Entity) -> bool {
            let before = self.bodies.len();
            self.bodies.retain(|e| *e != entity);
            self.bodies.len() != before
        }
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            fixed_frequency: 10.0,
            physics_sub_steps: 3,
            worker_threads: Some(1),
            ..SchedulerConfig::default()
        }
    }

    #[test]
    fn test_steps_once_per_tick_with_simulated_time() {
        let physics = Rc::new(RefCell::new(PhysicsSystem::new(Scripted::default())));
        let mut scheduler = Scheduler::builder(config())
            .with_shared_system(Rc::clone(&physics))
            .build()
            .unwrap();

        scheduler.frame(0.25);
        scheduler.frame(0.31);

        let physics = physics.borrow();
        let steps = &physics.backend().steps;
        assert_eq!(steps.len(), 3);
        for (i, (time, delta, sub_steps)) in steps.iter().enumerate() {
            assert!((time - (i + 1) as f64 * 0.1).abs() < 1e-12);
            assert!((delta - 0.1).abs() < 1e-12);
            assert_eq!(*sub_steps, 3);
        }
    }

    #[test]
    fn test_events_reach_listeners_of_their_kind_only() {
        let mut scheduler = Scheduler::builder(config()).build().unwrap();
        let a = scheduler.world_mut().scene.spawn("a").unwrap();
        let b = scheduler.world_mut().scene.spawn("b").unwrap();

        let mut physics = PhysicsSystem::new(Scripted {
            script: vec![vec![
                PhysicsEvent::IntersectionStart { a, b },
                PhysicsEvent::BodyOutOfBounds { entity: b },
                PhysicsEvent::IntersectionEnd { a, b },
            ]],
            ..Scripted::default()
        });

        let seen: Rc<RefCell<Vec<String>>> = Rc::default();
        for kind in [PhysicsEventKind::IntersectionStart, PhysicsEventKind::IntersectionEnd] {
            let seen = Rc::clone(&seen);
            physics.on(kind, move |_, event| {
                seen.borrow_mut().push(event.kind().to_string());
                Ok(())
            });
        }
        let removed = Rc::clone(&seen);
        physics.on(PhysicsEventKind::BodyOutOfBounds, move |world, event| {
            removed.borrow_mut().push("out".into());
            if let PhysicsEvent::BodyOutOfBounds { entity } = event {
                world.scene.destroy(*entity)?;
            }
            Ok(())
        });

        let report = physics
            .step(scheduler.world_mut(), &TickTime::fixed(0.1, 0.1, 1, 1))
            .unwrap();
        assert_eq!(report.events, 3);
        // The end event refers to a node destroyed by the out-of-bounds listener
        assert_eq!(*seen.borrow(), vec!["IntersectionStart", "out"]);
    }

    #[test]
    fn test_listener_faults_are_counted_and_isolated() {
        let mut scheduler = Scheduler::builder(config()).build().unwrap();
        let a = scheduler.world_mut().scene.spawn("a").unwrap();
        let b = scheduler.world_mut().scene.spawn("b").unwrap();
        let mut physics = PhysicsSystem::new(Scripted {
            script: vec![vec![PhysicsEvent::IntersectionUpdate { a, b }]],
            ..Scripted::default()
        });

        let calls = Rc::new(RefCell::new(0));
        physics.on(
            PhysicsEventKind::IntersectionUpdate,
            |_: &mut World, _: &PhysicsEvent| -> anyhow::Result<()> { panic!("listener bug") },
        );
        let counter = Rc::clone(&calls);
        physics.on(PhysicsEventKind::IntersectionUpdate, move |_, _| {
            *counter.borrow_mut() += 1;
            Ok(())
        });

        let report = physics
            .step(scheduler.world_mut(), &TickTime::fixed(0.1, 0.1, 1, 1))
            .unwrap();
        assert_eq!(report.listener_faults, 1);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_poses_written_back_and_stale_bodies_removed() {
        let mut scheduler = Scheduler::builder(config()).build().unwrap();
        let scene = &mut scheduler.world_mut().scene;
        let crate_node = scene
            .spawn_with_transform("crate", Transform::IDENTITY.with_scale(Vec3::new(2.0, 2.0, 2.0)))
            .unwrap();
        let gone = scene.spawn("gone").unwrap();
        scene.destroy(gone).unwrap();

        let mut physics = PhysicsSystem::new(Scripted {
            bodies: vec![crate_node, gone],
            ..Scripted::default()
        });
        let report = physics
            .step(scheduler.world_mut(), &TickTime::fixed(0.1, 0.1, 1, 1))
            .unwrap();

        assert_eq!(report.poses_written, 1);
        assert_eq!(physics.backend().bodies(), vec![crate_node]);
        let local = scheduler.world().scene.local_transform(crate_node).unwrap();
        assert_eq!(local.position, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(local.scale, Vec3::new(2.0, 2.0, 2.0));
    }
}
