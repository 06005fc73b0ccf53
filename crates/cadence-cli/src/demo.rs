//! The scene `cadence run` drives: animated rigs with bone-merged gloves, a
//! door that opens once, a Rapier crate falling through a trigger, and a
//! couple of behaviours using the component lifecycle and timers

use anyhow::{Context, Result};
use cadence_animation::{AnimationClip, AnimationSystem, Joint, NodeAnimator, Skeleton};
use cadence_core::{SchedulerConfig, Transform, Vec3};
use cadence_physics::{
    ColliderBuilder, PhysicsEvent, PhysicsEventKind, PhysicsSystem, RapierBackend, RigidBodyBuilder,
    WorldBounds,
};
use cadence_runtime::{Behaviour, BehaviourContext, Scheduler};
use std::cell::RefCell;
use std::rc::Rc;

const SWAY: &str = r#"
name = "sway"
duration = 2.0

[[tracks]]
property = "Rotation"
keyframes = [
    { time = 0.0, value = [0.0, 0.0, 0.0, 1.0] },
    { time = 1.0, value = [0.0, 0.3827, 0.0, 0.9239] },
    { time = 2.0, value = [0.0, 0.0, 0.0, 1.0] },
]

[[tracks]]
target = { type = "Joint", name = "elbow" }
property = "Rotation"
keyframes = [
    { time = 0.0, value = [0.0, 0.0, 0.0, 1.0] },
    { time = 1.0, value = [0.5, 0.0, 0.0, 0.866] },
    { time = 2.0, value = [0.0, 0.0, 0.0, 1.0] },
]
"#;

const SPIN: &str = r#"
name = "spin"
duration = 1.0

[[tracks]]
property = "Rotation"
keyframes = [
    { time = 0.0, value = [0.0, 0.0, 0.0, 1.0] },
    { time = 0.5, value = [0.0, 1.0, 0.0, 0.0] },
    { time = 1.0, value = [0.0, 0.0, 0.0, -1.0] },
]
"#;

const OPEN: &str = r#"
name = "open"
duration = 0.5

[[tracks]]
property = "Translation"
keyframes = [
    { time = 0.0, value = [5.0, 0.0, 0.0] },
    { time = 0.5, value = [5.0, 0.0, 1.2] },
]
"#;

/// Counters updated by the demo's callbacks
#[derive(Debug, Clone, Default)]
pub struct DemoStats {
    pub updates: u64,
    pub fixed_updates: u64,
    pub clips_finished: u64,
    pub intersections_started: u64,
    pub intersections_ended: u64,
    pub out_of_bounds: u64,
    pub timers_fired: u64,
}

pub struct Demo {
    pub scheduler: Scheduler,
    pub animation: Rc<RefCell<AnimationSystem>>,
    pub physics: Rc<RefCell<PhysicsSystem<RapierBackend>>>,
    pub stats: Rc<RefCell<DemoStats>>,
}

/// Turns its node around the up axis
struct Spinner {
    speed: f32,
    stats: Rc<RefCell<DemoStats>>,
}

impl Behaviour for Spinner {
    fn name(&self) -> &str {
        "Spinner"
    }

    fn on_update(&mut self, cx: &mut BehaviourContext<'_>) -> anyhow::Result<()> {
        self.stats.borrow_mut().updates += 1;
        let owner = cx.owner();
        let angle = cx.time().now as f32 * self.speed;
        let half = angle * 0.5;
        if let Some(local) = cx.scene.local_transform(owner) {
            cx.scene
                .set_local_transform(owner, local.with_rotation([0.0, half.sin(), 0.0, half.cos()]))?;
        }
        Ok(())
    }

    fn on_fixed_update(&mut self, _cx: &mut BehaviourContext<'_>) -> anyhow::Result<()> {
        self.stats.borrow_mut().fixed_updates += 1;
        Ok(())
    }
}

/// Destroys a node after a delay, then itself
struct Fuse {
    target: String,
    delay: f64,
    stats: Rc<RefCell<DemoStats>>,
}

impl Behaviour for Fuse {
    fn name(&self) -> &str {
        "Fuse"
    }

    fn on_start(&mut self, cx: &mut BehaviourContext<'_>) -> anyhow::Result<()> {
        let target = self.target.clone();
        let stats = Rc::clone(&self.stats);
        cx.invoke_after(self.delay, move |t| {
            stats.borrow_mut().timers_fired += 1;
            let removed = t.scene.destroy_by_name(&target)?;
            log::info!("fuse destroyed '{}' ({} node(s)) at {:.3}s", target, removed.len(), t.now());
            let id = t.owner();
            t.requests().destroy(id);
            Ok(())
        });
        Ok(())
    }

    fn on_destroy(&mut self, _cx: &mut BehaviourContext<'_>) -> anyhow::Result<()> {
        log::debug!("fuse for '{}' removed", self.target);
        Ok(())
    }
}

fn arm() -> Result<Skeleton> {
    Ok(Skeleton::new(vec![
        Joint::new("shoulder", None),
        Joint::new("elbow", Some(0)),
        Joint::new("hand", Some(1)),
    ])?)
}

fn glove() -> Result<Skeleton> {
    Ok(Skeleton::new(vec![
        Joint::new("elbow", None),
        Joint::new("hand", Some(0)),
    ])?)
}

impl Demo {
    pub fn build(config: SchedulerConfig, rigs: usize) -> Result<Demo> {
        let stats = Rc::new(RefCell::new(DemoStats::default()));
        let animation = Rc::new(RefCell::new(AnimationSystem::new()));
        let physics = Rc::new(RefCell::new(PhysicsSystem::new(RapierBackend::new().with_bounds(
            WorldBounds {
                min: Vec3::new(-20.0, -5.0, -20.0),
                max: Vec3::new(20.0, 20.0, 20.0),
            },
        ))));

        let mut scheduler = Scheduler::builder(config)
            .with_shared_system(Rc::clone(&animation))
            .with_shared_system(Rc::clone(&physics))
            .build()
            .context("Failed to start scheduler")?;

        {
            let mut animation = animation.borrow_mut();
            for source in [SWAY, SPIN, OPEN] {
                animation.add_clip(AnimationClip::from_toml_str(source)?);
            }

            let scene = &mut scheduler.world_mut().scene;
            for i in 0..rigs {
                let body = scene.spawn_with_transform(
                    format!("rig{i}"),
                    Transform::from_position(Vec3::new(i as f32 * 2.0, 0.0, -4.0)),
                )?;
                let prop = scene.spawn_child(
                    format!("rig{i}/prop"),
                    body,
                    Transform::from_position(Vec3::new(0.0, 1.5, 0.0)),
                )?;
                let hand = scene.spawn_child(format!("rig{i}/glove"), body, Transform::IDENTITY)?;

                animation.attach_skeleton(body, arm()?);
                animation.play(body, NodeAnimator::new("sway").with_speed(1.0 + i as f64 * 0.1))?;
                animation.play(prop, NodeAnimator::new("spin"))?;
                animation.bone_merge(hand, body, glove()?)?;
            }

            let door = scene.spawn_with_transform("door", Transform::from_position(Vec3::new(5.0, 0.0, 0.0)))?;
            animation.play(door, NodeAnimator::once("open"))?;

            let debris = scene.spawn_with_transform("debris", Transform::from_position(Vec3::new(-3.0, 0.5, 2.0)))?;
            animation.play(debris, NodeAnimator::new("spin").with_speed(2.0))?;

            let finished = Rc::clone(&stats);
            animation.on_finished(move |world, event| {
                finished.borrow_mut().clips_finished += 1;
                if event.clip == "open" {
                    world.scene.set_enabled(event.entity, false)?;
                }
                Ok(())
            });
        }

        {
            let scene = &mut scheduler.world_mut().scene;
            let start = Transform::from_position(Vec3::new(0.0, 3.0, 0.0));
            let crate_node = scene.spawn_with_transform("crate", start)?;
            let trigger = scene.spawn("trigger")?;

            let mut physics = physics.borrow_mut();
            physics.backend_mut().add_body(
                crate_node,
                RigidBodyBuilder::dynamic(),
                &start,
                vec![ColliderBuilder::ball(0.25).build()],
            )?;
            physics.backend_mut().add_body(
                trigger,
                RigidBodyBuilder::fixed(),
                &Transform::IDENTITY,
                vec![ColliderBuilder::cuboid(1.0, 1.0, 1.0).sensor(true).build()],
            )?;

            let started = Rc::clone(&stats);
            physics.on(PhysicsEventKind::IntersectionStart, move |_, _| {
                started.borrow_mut().intersections_started += 1;
                Ok(())
            });
            let ended = Rc::clone(&stats);
            physics.on(PhysicsEventKind::IntersectionEnd, move |_, _| {
                ended.borrow_mut().intersections_ended += 1;
                Ok(())
            });
            let fallen = Rc::clone(&stats);
            physics.on(PhysicsEventKind::BodyOutOfBounds, move |world, event| {
                fallen.borrow_mut().out_of_bounds += 1;
                if let PhysicsEvent::BodyOutOfBounds { entity } = event {
                    world.scene.destroy(*entity)?;
                }
                Ok(())
            });
        }

        let world = scheduler.world_mut();
        let turntable = world
            .scene
            .spawn_with_transform("turntable", Transform::from_position(Vec3::new(0.0, 0.0, 4.0)))?;
        world.components.add(
            turntable,
            Spinner {
                speed: 1.5,
                stats: Rc::clone(&stats),
            },
        );
        let fuse = world.scene.spawn("fuse")?;
        world.components.add(
            fuse,
            Fuse {
                target: "debris".into(),
                delay: 1.5,
                stats: Rc::clone(&stats),
            },
        );

        log::info!(
            "demo scene: {} node(s), {} rig(s), {} animated, {} component(s)",
            world.scene.entity_count(),
            rigs,
            animation.borrow().node_count(),
            world.components.len()
        );
        for node in world.scene.all_nodes() {
            log::debug!(
                "  {} (parent: {}, {} child(ren))",
                node.name,
                node.parent.as_deref().unwrap_or("-"),
                node.children
            );
        }

        Ok(Demo {
            scheduler,
            animation,
            physics,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_physics::PhysicsBackend;

    #[test]
    fn test_two_seconds_of_demo() {
        let config = SchedulerConfig {
            fixed_frequency: 60.0,
            worker_threads: Some(2),
            ..SchedulerConfig::default()
        };
        let mut demo = Demo::build(config, 2).unwrap();
        for frame in 1..=120 {
            demo.scheduler.frame(frame as f64 / 60.0);
        }

        let stats = demo.stats.borrow().clone();
        assert_eq!(stats.clips_finished, 1);
        assert_eq!(stats.out_of_bounds, 1);
        assert!(stats.intersections_started >= 1);
        assert!(stats.updates > 0);
        assert!(stats.fixed_updates > 0);
        assert_eq!(stats.timers_fired, 1);

        let world = demo.scheduler.world();
        assert!(world.scene.find("debris").is_none());
        assert!(world.scene.find("crate").is_none());
        assert!(!world.scene.is_enabled(world.scene.find("door").unwrap()));
        assert_eq!(demo.physics.borrow().backend().bodies().len(), 1);

        let report = demo.animation.borrow().last_report();
        assert_eq!(report.roots.failed + report.merges.failed, 0);
        assert_eq!(report.merges.processed, 2);
    }
}
