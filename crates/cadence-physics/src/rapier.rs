//! Rapier 3D backend

use crate::backend::{BodyPose, PhysicsBackend, PhysicsEvent};
use cadence_core::{CadenceError, Result, Transform, Vec3};
use cadence_scene::Entity;
use crossbeam::channel::Receiver;
use rapier3d::na::{Quaternion, UnitQuaternion};
use rapier3d::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Axis-aligned region bodies are expected to stay inside
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl WorldBounds {
    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.y >= self.min.y
            && p.z >= self.min.z
            && p.x <= self.max.x
            && p.y <= self.max.y
            && p.z <= self.max.z
    }
}

/// Rapier pipeline plus the entity bookkeeping needed to report events
pub struct RapierBackend {
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub gravity: Vector<Real>,
    pub integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,

    collision_recv: Receiver<CollisionEvent>,
    contact_force_recv: Receiver<ContactForceEvent>,
    event_handler: ChannelEventCollector,

    bodies: HashMap<Entity, RigidBodyHandle>,
    collider_owners: HashMap<ColliderHandle, Entity>,
    /// Pairs overlapping after the last step
    overlapping: BTreeSet<(Entity, Entity)>,
    bounds: Option<WorldBounds>,
    out_of_bounds: HashSet<Entity>,
}

impl Default for RapierBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RapierBackend {
    /// Empty world with standard gravity
    pub fn new() -> Self {
        let (collision_send, collision_recv) = crossbeam::channel::unbounded();
        let (contact_force_send, contact_force_recv) = crossbeam::channel::unbounded();
        let event_handler = ChannelEventCollector::new(collision_send, contact_force_send);

        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            gravity: vector![0.0, -9.81, 0.0],
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            collision_recv,
            contact_force_recv,
            event_handler,
            bodies: HashMap::new(),
            collider_owners: HashMap::new(),
            overlapping: BTreeSet::new(),
            bounds: None,
            out_of_bounds: HashSet::new(),
        }
    }

    /// Report `BodyOutOfBounds` once for each dynamic body that leaves `bounds`
    pub fn with_bounds(mut self, bounds: WorldBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Give `entity` a body with its colliders, placed at `transform`.
    /// Colliders report intersection events.
    pub fn add_body(
        &mut self,
        entity: Entity,
        body: RigidBodyBuilder,
        transform: &Transform,
        colliders: Vec<Collider>,
    ) -> Result<RigidBodyHandle> {
        if self.bodies.contains_key(&entity) {
            return Err(CadenceError::PhysicsError(format!(
                "{entity:?} already owns a body"
            )));
        }

        let p = transform.position;
        let [qx, qy, qz, qw] = transform.rotation;
        let rotation = UnitQuaternion::from_quaternion(Quaternion::new(qw, qx, qy, qz));
        let body = body
            .translation(vector![p.x, p.y, p.z])
            .rotation(rotation.scaled_axis())
            .build();
        let handle = self.rigid_body_set.insert(body);

        for mut collider in colliders {
            collider.set_active_events(collider.active_events() | ActiveEvents::COLLISION_EVENTS);
            let collider_handle =
                self.collider_set
                    .insert_with_parent(collider, handle, &mut self.rigid_body_set);
            self.collider_owners.insert(collider_handle, entity);
        }

        self.bodies.insert(entity, handle);
        Ok(handle)
    }

    pub fn body(&self, entity: Entity) -> Option<&RigidBody> {
        self.bodies
            .get(&entity)
            .and_then(|h| self.rigid_body_set.get(*h))
    }

    pub fn body_mut(&mut self, entity: Entity) -> Option<&mut RigidBody> {
        let handle = *self.bodies.get(&entity)?;
        self.rigid_body_set.get_mut(handle)
    }

    fn owner(&self, collider: ColliderHandle) -> Option<Entity> {
        self.collider_owners.get(&collider).copied()
    }

    fn step_once(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &self.event_handler,
        );
    }

    /// Turn raw collision events into start/update/end events for the tick
    fn intersection_events(&mut self) -> Vec<PhysicsEvent> {
        let before = self.overlapping.clone();
        let mut started = BTreeSet::new();
        let mut ended = BTreeSet::new();

        let raw: Vec<CollisionEvent> = self.collision_recv.try_iter().collect();
        for event in raw {
            let (h1, h2) = (event.collider1(), event.collider2());
            let (Some(e1), Some(e2)) = (self.owner(h1), self.owner(h2)) else {
                continue;
            };
            if e1 == e2 {
                continue;
            }
            let pair = if e1 < e2 { (e1, e2) } else { (e2, e1) };
            if event.started() {
                if self.overlapping.insert(pair) {
                    started.insert(pair);
                }
            } else if self.overlapping.remove(&pair) {
                ended.insert(pair);
            }
        }
        // Contact forces are not reported
        self.contact_force_recv.try_iter().for_each(drop);

        let mut events = Vec::new();
        for &(a, b) in &started {
            events.push(PhysicsEvent::IntersectionStart { a, b });
        }
        for &(a, b) in self.overlapping.intersection(&before) {
            events.push(PhysicsEvent::IntersectionUpdate { a, b });
        }
        for &(a, b) in &ended {
            events.push(PhysicsEvent::IntersectionEnd { a, b });
        }
        events
    }

    fn bounds_events(&mut self) -> Vec<PhysicsEvent> {
        let Some(bounds) = self.bounds else {
            return Vec::new();
        };
        let mut entities: Vec<Entity> = self.bodies.keys().copied().collect();
        entities.sort();

        let mut events = Vec::new();
        for entity in entities {
            let Some(body) = self.body(entity) else {
                continue;
            };
            if !body.is_dynamic() {
                continue;
            }
            let t = body.translation();
            let inside = bounds.contains(Vec3::new(t.x, t.y, t.z));
            if inside {
                self.out_of_bounds.remove(&entity);
            } else if self.out_of_bounds.insert(entity) {
                events.push(PhysicsEvent::BodyOutOfBounds { entity });
            }
        }
        events
    }
}

impl PhysicsBackend for RapierBackend {
    fn step(&mut self, sim_time: f64, delta: f64, sub_steps: u32) -> anyhow::Result<Vec<PhysicsEvent>> {
        if !delta.is_finite() || delta <= 0.0 {
            anyhow::bail!("invalid physics step {delta} at t={sim_time}");
        }
        let sub_steps = sub_steps.max(1);
        let dt = (delta / sub_steps as f64) as f32;
        for _ in 0..sub_steps {
            self.step_once(dt);
        }

        let mut events = self.intersection_events();
        events.extend(self.bounds_events());
        log::trace!(
            "rapier stepped t={:.4} ({} sub-step(s)), {} event(s)",
            sim_time,
            sub_steps,
            events.len()
        );
        Ok(events)
    }

    fn body_poses(&self) -> Vec<BodyPose> {
        let mut poses: Vec<BodyPose> = self
            .bodies
            .iter()
            .filter_map(|(&entity, &handle)| {
                let body = self.rigid_body_set.get(handle)?;
                if !body.is_dynamic() {
                    return None;
                }
                let t = body.translation();
                let q = body.rotation().coords;
                Some(BodyPose {
                    entity,
                    position: Vec3::new(t.x, t.y, t.z),
                    rotation: [q.x, q.y, q.z, q.w],
                })
            })
            .collect();
        poses.sort_by_key(|p| p.entity);
        poses
    }

    fn bodies(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self.bodies.keys().copied().collect();
        entities.sort();
        entities
    }

    fn remove_body(&mut self, entity: Entity) -> bool {
        let Some(handle) = self.bodies.remove(&entity) else {
            return false;
        };
        self.rigid_body_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        self.collider_owners.retain(|_, owner| *owner != entity);
        self.overlapping.retain(|(a, b)| *a != entity && *b != entity);
        self.out_of_bounds.remove(&entity);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_scene::SceneGraph;

    fn ball(backend: &mut RapierBackend, entity: Entity, y: f32) {
        backend
            .add_body(
                entity,
                RigidBodyBuilder::dynamic(),
                &Transform::from_position(Vec3::new(0.0, y, 0.0)),
                vec![ColliderBuilder::ball(0.5).build()],
            )
            .unwrap();
    }

    #[test]
    fn test_gravity_pulls_bodies_down() {
        let mut scene = SceneGraph::new();
        let entity = scene.spawn("ball").unwrap();
        let mut backend = RapierBackend::new();
        ball(&mut backend, entity, 10.0);

        for tick in 0..60 {
            backend.step(tick as f64 / 60.0, 1.0 / 60.0, 1).unwrap();
        }
        let poses = backend.body_poses();
        assert_eq!(poses.len(), 1);
        assert!(poses[0].position.y < 10.0);
    }

    #[test]
    fn test_sub_steps_cover_the_same_time() {
        let mut scene = SceneGraph::new();
        let a = scene.spawn("a").unwrap();
        let mut one = RapierBackend::new();
        let mut four = RapierBackend::new();
        ball(&mut one, a, 10.0);
        ball(&mut four, a, 10.0);

        for tick in 0..30 {
            one.step(tick as f64 / 30.0, 1.0 / 30.0, 1).unwrap();
            four.step(tick as f64 / 30.0, 1.0 / 30.0, 4).unwrap();
        }
        let y1 = one.body_poses()[0].position.y;
        let y4 = four.body_poses()[0].position.y;
        assert!(y1 < 6.0 && y4 < 6.0);
        assert!((y1 - y4).abs() < 0.25, "{y1} vs {y4}");
    }

    #[test]
    fn test_sensor_reports_start_update_end() {
        let mut scene = SceneGraph::new();
        let zone = scene.spawn("zone").unwrap();
        let rock = scene.spawn("rock").unwrap();
        let mut backend = RapierBackend::new();
        backend
            .add_body(
                zone,
                RigidBodyBuilder::fixed(),
                &Transform::IDENTITY,
                vec![ColliderBuilder::cuboid(1.0, 1.0, 1.0).sensor(true).build()],
            )
            .unwrap();
        ball(&mut backend, rock, 3.0);

        let mut kinds = Vec::new();
        for tick in 0..240 {
            for event in backend.step(tick as f64 / 60.0, 1.0 / 60.0, 1).unwrap() {
                if kinds.last() != Some(&event.kind()) {
                    kinds.push(event.kind());
                }
            }
        }
        use crate::backend::PhysicsEventKind::*;
        assert_eq!(kinds, vec![IntersectionStart, IntersectionUpdate, IntersectionEnd]);
    }

    #[test]
    fn test_leaving_bounds_is_reported_once() {
        let mut scene = SceneGraph::new();
        let entity = scene.spawn("faller").unwrap();
        let mut backend = RapierBackend::new().with_bounds(WorldBounds {
            min: Vec3::new(-10.0, -1.0, -10.0),
            max: Vec3::new(10.0, 10.0, 10.0),
        });
        ball(&mut backend, entity, 0.0);

        let mut reported = 0;
        for tick in 0..120 {
            reported += backend
                .step(tick as f64 / 60.0, 1.0 / 60.0, 1)
                .unwrap()
                .iter()
                .filter(|e| matches!(e, PhysicsEvent::BodyOutOfBounds { .. }))
                .count();
        }
        assert_eq!(reported, 1);
    }

    #[test]
    fn test_removal_forgets_the_body() {
        let mut scene = SceneGraph::new();
        let entity = scene.spawn("ball").unwrap();
        let mut backend = RapierBackend::new();
        ball(&mut backend, entity, 1.0);
        assert!(backend.add_body(entity, RigidBodyBuilder::dynamic(), &Transform::IDENTITY, Vec::new()).is_err());

        assert!(backend.remove_body(entity));
        assert!(!backend.remove_body(entity));
        assert!(backend.bodies().is_empty());
        assert_eq!(backend.collider_set.len(), 0);
    }

    #[test]
    fn test_rejects_bad_delta() {
        let mut backend = RapierBackend::new();
        assert!(backend.step(0.0, 0.0, 1).is_err());
        assert!(backend.step(0.0, f64::NAN, 1).is_err());
    }
}
