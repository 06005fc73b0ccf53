//! Per-frame node animation on the worker pool.
//!
//! Each frame in `UpdateBones`:
//! 1. every animated node without an animated ancestor becomes a root task;
//!    a task walks its animated descendants parents first
//! 2. bone-merge dependents copy joint poses from their target, grouped by
//!    the skeleton at the end of the merge chain
//! 3. the main thread drains the queued pose changes into the scene
//! 4. finished observers run on the main thread

use crate::animator::NodeAnimator;
use crate::clip::{AnimationClip, TrackTarget};
use crate::sampler::{apply_sample, sample_track};
use crate::skeleton::Skeleton;
use cadence_core::{mat4_mul, CadenceError, Mat4, Result, Transform, IDENTITY_MAT4};
use cadence_runtime::{guard, DispatchReport, PendingQueue, RuntimeSystem, Stage, SubtreeRoot, TickTime, World};
use cadence_scene::{Entity, SceneGraph};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Raised when a non-looping clip reaches its end
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationFinished {
    pub entity: Entity,
    pub clip: String,
}

type FinishedObserver = Box<dyn FnMut(&mut World, &AnimationFinished) -> anyhow::Result<()>>;

/// What the last `UpdateBones` pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnimationReport {
    pub roots: DispatchReport,
    pub merges: DispatchReport,
    /// Entities whose transform change was applied by the drain
    pub changed: usize,
    pub finished: usize,
}

#[derive(Debug, Clone)]
struct AnimatedNode {
    animator: Option<NodeAnimator>,
    skeleton: Option<Skeleton>,
    merge_target: Option<Entity>,
    world: Mat4,
}

impl AnimatedNode {
    fn empty() -> Self {
        Self {
            animator: None,
            skeleton: None,
            merge_target: None,
            world: IDENTITY_MAT4,
        }
    }
}

/// Worker output, applied by the drain
enum PoseUpdate {
    Transform(Entity, Transform),
    Posed(Entity),
    Finished(AnimationFinished),
}

#[derive(Clone)]
struct NodeTask {
    entity: Entity,
    /// Index of the nearest animated ancestor in the same task
    parent: Option<usize>,
    /// Transforms of the non-animated nodes between that ancestor and this node
    offset: Mat4,
    local: Transform,
    animator: Option<NodeAnimator>,
    skeleton: Option<Skeleton>,
    world: Mat4,
}

struct RootTask {
    label: String,
    nodes: Vec<NodeTask>,
}

impl SubtreeRoot for RootTask {
    fn label(&self) -> &str {
        &self.label
    }
}

#[derive(Clone)]
struct MergeMember {
    entity: Entity,
    target: Entity,
    skeleton: Skeleton,
}

struct MergeTask {
    label: String,
    root: Entity,
    source: Skeleton,
    /// Ordered so every member comes after its target
    members: Vec<MergeMember>,
}

impl SubtreeRoot for MergeTask {
    fn label(&self) -> &str {
        &self.label
    }
}

/// Animation clips, per-node playback state and finished observers
pub struct AnimationSystem {
    clips: HashMap<String, AnimationClip>,
    nodes: BTreeMap<Entity, AnimatedNode>,
    observers: Vec<FinishedObserver>,
    queue: PendingQueue<PoseUpdate>,
    last_report: AnimationReport,
}

impl Default for AnimationSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationSystem {
    pub fn new() -> Self {
        Self {
            clips: HashMap::new(),
            nodes: BTreeMap::new(),
            observers: Vec::new(),
            queue: PendingQueue::new(),
            last_report: AnimationReport::default(),
        }
    }

    /// Register a clip, replacing any clip with the same name
    pub fn add_clip(&mut self, clip: AnimationClip) {
        self.clips.insert(clip.name.clone(), clip);
    }

    /// Load a clip file and register it. Returns the clip name.
    pub fn load_clip(&mut self, path: &Path) -> Result<String> {
        let clip = AnimationClip::load(path)?;
        let name = clip.name.clone();
        log::debug!("loaded clip '{}' from {}", name, path.display());
        self.add_clip(clip);
        Ok(name)
    }

    pub fn clip(&self, name: &str) -> Option<&AnimationClip> {
        self.clips.get(name)
    }

    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    /// Start (or replace) playback on `entity`
    pub fn play(&mut self, entity: Entity, animator: NodeAnimator) -> Result<()> {
        if !self.clips.contains_key(&animator.clip) {
            return Err(CadenceError::AnimationError(format!(
                "unknown clip '{}'",
                animator.clip
            )));
        }
        let node = self.nodes.entry(entity).or_insert_with(AnimatedNode::empty);
        if node.merge_target.is_some() {
            return Err(CadenceError::AnimationError(format!(
                "{entity:?} follows another skeleton and cannot play clips"
            )));
        }
        node.animator = Some(animator);
        Ok(())
    }

    /// Stop playback, keeping the node's current pose
    pub fn stop(&mut self, entity: Entity) -> Option<NodeAnimator> {
        self.nodes.get_mut(&entity).and_then(|n| n.animator.take())
    }

    /// Give `entity` a skeleton driven by its clip's joint tracks
    pub fn attach_skeleton(&mut self, entity: Entity, mut skeleton: Skeleton) {
        skeleton.compute_bone_matrices();
        self.nodes
            .entry(entity)
            .or_insert_with(AnimatedNode::empty)
            .skeleton = Some(skeleton);
    }

    /// Make `entity`'s skeleton follow the joint poses of `target`'s
    /// skeleton, matching joints by name
    pub fn bone_merge(&mut self, entity: Entity, target: Entity, mut skeleton: Skeleton) -> Result<()> {
        if entity == target {
            return Err(CadenceError::AnimationError(format!(
                "{entity:?} cannot bone-merge onto itself"
            )));
        }
        skeleton.compute_bone_matrices();
        let node = self.nodes.entry(entity).or_insert_with(AnimatedNode::empty);
        node.animator = None;
        node.skeleton = Some(skeleton);
        node.merge_target = Some(target);
        Ok(())
    }

    /// Forget everything about `entity`
    pub fn remove(&mut self, entity: Entity) -> bool {
        self.nodes.remove(&entity).is_some()
    }

    pub fn animator(&self, entity: Entity) -> Option<&NodeAnimator> {
        self.nodes.get(&entity).and_then(|n| n.animator.as_ref())
    }

    pub fn animator_mut(&mut self, entity: Entity) -> Option<&mut NodeAnimator> {
        self.nodes.get_mut(&entity).and_then(|n| n.animator.as_mut())
    }

    pub fn skeleton(&self, entity: Entity) -> Option<&Skeleton> {
        self.nodes.get(&entity).and_then(|n| n.skeleton.as_ref())
    }

    /// World matrix computed for an animated node on the last pass
    pub fn world_matrix(&self, entity: Entity) -> Option<Mat4> {
        self.nodes
            .get(&entity)
            .filter(|n| n.merge_target.is_none())
            .map(|n| n.world)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Observe clips finishing. Observers run on the main thread after the
    /// pose drain and may change the scene.
    pub fn on_finished<F>(&mut self, observer: F)
    where
        F: FnMut(&mut World, &AnimationFinished) -> anyhow::Result<()> + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    pub fn last_report(&self) -> AnimationReport {
        self.last_report
    }

    /// Run one animation pass over the world
    pub fn update(&mut self, world: &mut World, dt: f64) -> AnimationReport {
        self.prune(&world.scene);

        let mut roots = self.root_tasks(&world.scene);
        let clips = &self.clips;
        let root_report = world
            .dispatcher()
            .dispatch("animation", &mut roots, &self.queue, |task, out| {
                animate_root(task, clips, dt, out)
            });
        self.commit_roots(roots);

        let mut merges = self.merge_tasks(&world.scene);
        let merge_report = world
            .dispatcher()
            .dispatch("bone-merge", &mut merges, &self.queue, follow_merges);
        self.commit_merges(merges);

        let (changed, finished) = self.drain(&mut world.scene);
        self.notify(world, &finished);

        self.last_report = AnimationReport {
            roots: root_report,
            merges: merge_report,
            changed,
            finished: finished.len(),
        };
        self.last_report
    }

    fn prune(&mut self, scene: &SceneGraph) {
        let before = self.nodes.len();
        self.nodes.retain(|entity, _| scene.liveness(*entity).is_ok());
        let dropped = before - self.nodes.len();
        if dropped > 0 {
            log::debug!("dropped animation state of {} destroyed node(s)", dropped);
        }
    }

    fn root_tasks(&self, scene: &SceneGraph) -> Vec<RootTask> {
        let animated: HashSet<Entity> = self
            .nodes
            .iter()
            .filter(|(entity, node)| node.merge_target.is_none() && scene.is_active_in_hierarchy(**entity))
            .map(|(entity, _)| *entity)
            .collect();

        let mut tasks = Vec::new();
        for &root in self.nodes.keys().filter(|e| animated.contains(*e)) {
            let chain = scene.ancestors(root);
            if chain.iter().any(|a| animated.contains(a)) {
                continue;
            }
            let root_offset = chain
                .first()
                .and_then(|parent| scene.world_matrix(*parent))
                .unwrap_or(IDENTITY_MAT4);

            let mut index: HashMap<Entity, usize> = HashMap::new();
            let mut nodes = Vec::new();
            for entity in scene.subtree(root) {
                if !animated.contains(&entity) {
                    continue;
                }
                let (parent, offset) = if entity == root {
                    (None, root_offset)
                } else {
                    let mut between = Vec::new();
                    let mut parent = None;
                    for ancestor in scene.ancestors(entity) {
                        if let Some(&i) = index.get(&ancestor) {
                            parent = Some(i);
                            break;
                        }
                        between.push(ancestor);
                    }
                    let offset = between.iter().rev().fold(IDENTITY_MAT4, |acc, e| {
                        let local = scene.local_transform(*e).unwrap_or_default();
                        mat4_mul(&acc, &local.to_matrix())
                    });
                    (parent, offset)
                };

                let state = &self.nodes[&entity];
                index.insert(entity, nodes.len());
                nodes.push(NodeTask {
                    entity,
                    parent,
                    offset,
                    local: scene.local_transform(entity).unwrap_or_default(),
                    animator: state.animator.clone(),
                    skeleton: state.skeleton.clone(),
                    world: state.world,
                });
            }

            tasks.push(RootTask {
                label: scene.name(root).unwrap_or("<unnamed>").to_string(),
                nodes,
            });
        }
        tasks
    }

    fn commit_roots(&mut self, tasks: Vec<RootTask>) {
        for node in tasks.into_iter().flat_map(|t| t.nodes) {
            if let Some(state) = self.nodes.get_mut(&node.entity) {
                state.animator = node.animator;
                state.skeleton = node.skeleton;
                state.world = node.world;
            }
        }
    }

    /// Follow merge targets to the skeleton that actually animates. `None`
    /// for cycles.
    fn merge_chain_root(&self, entity: Entity) -> Option<(Entity, usize)> {
        let mut current = self.nodes.get(&entity)?.merge_target?;
        let mut depth = 1;
        while let Some(next) = self.nodes.get(&current).and_then(|n| n.merge_target) {
            if depth > self.nodes.len() {
                log::warn!("bone-merge chain from {:?} loops, skipping it", entity);
                return None;
            }
            current = next;
            depth += 1;
        }
        Some((current, depth))
    }

    fn merge_tasks(&self, scene: &SceneGraph) -> Vec<MergeTask> {
        let mut groups: BTreeMap<Entity, Vec<(usize, Entity)>> = BTreeMap::new();
        for (&entity, node) in &self.nodes {
            if node.merge_target.is_none() || node.skeleton.is_none() {
                continue;
            }
            if !scene.is_active_in_hierarchy(entity) {
                continue;
            }
            if let Some((root, depth)) = self.merge_chain_root(entity) {
                groups.entry(root).or_default().push((depth, entity));
            }
        }

        let mut tasks = Vec::new();
        for (root, mut members) in groups {
            let Some(source) = self.nodes.get(&root).and_then(|n| n.skeleton.clone()) else {
                log::trace!("bone-merge target {:?} has no skeleton", root);
                continue;
            };
            if !scene.is_active_in_hierarchy(root) {
                continue;
            }
            members.sort();
            let members = members
                .into_iter()
                .filter_map(|(_, entity)| {
                    let node = self.nodes.get(&entity)?;
                    Some(MergeMember {
                        entity,
                        target: node.merge_target?,
                        skeleton: node.skeleton.clone()?,
                    })
                })
                .collect();
            tasks.push(MergeTask {
                label: scene.name(root).unwrap_or("<unnamed>").to_string(),
                root,
                source,
                members,
            });
        }
        tasks
    }

    fn commit_merges(&mut self, tasks: Vec<MergeTask>) {
        for member in tasks.into_iter().flat_map(|t| t.members) {
            if let Some(state) = self.nodes.get_mut(&member.entity) {
                state.skeleton = Some(member.skeleton);
            }
        }
    }

    /// Apply queued changes once per entity, skipping nodes destroyed since
    /// the tasks were built
    fn drain(&mut self, scene: &mut SceneGraph) -> (usize, Vec<AnimationFinished>) {
        let mut latest: BTreeMap<Entity, Option<Transform>> = BTreeMap::new();
        let mut finished = Vec::new();
        for update in self.queue.drain() {
            match update {
                PoseUpdate::Transform(entity, transform) => {
                    latest.insert(entity, Some(transform));
                }
                PoseUpdate::Posed(entity) => {
                    latest.entry(entity).or_insert(None);
                }
                PoseUpdate::Finished(event) => finished.push(event),
            }
        }

        let mut changed = 0;
        for (entity, transform) in latest {
            if scene.liveness(entity).is_stale() {
                continue;
            }
            let applied = match transform {
                Some(transform) => scene.set_local_transform(entity, transform),
                None => scene.mark_transform_changed(entity),
            };
            match applied {
                Ok(()) => changed += 1,
                Err(e) => log::warn!("could not apply pose to {:?}: {}", entity, e),
            }
        }

        finished.sort_by_key(|event| event.entity);
        (changed, finished)
    }

    fn notify(&mut self, world: &mut World, finished: &[AnimationFinished]) {
        for event in finished {
            log::debug!("clip '{}' finished on {:?}", event.clip, event.entity);
            for observer in &mut self.observers {
                if let Err(fault) = guard(|| observer(&mut *world, event)) {
                    log::error!(
                        "animation-finished observer for '{}' on {:?} failed: {}",
                        event.clip,
                        event.entity,
                        fault
                    );
                }
            }
        }
    }
}

fn animate_root(
    task: &mut RootTask,
    clips: &HashMap<String, AnimationClip>,
    dt: f64,
    out: &mut Vec<PoseUpdate>,
) -> anyhow::Result<()> {
    let mut nodes = task.nodes.clone();

    for i in 0..nodes.len() {
        let parent_world = match nodes[i].parent {
            Some(p) => mat4_mul(&nodes[p].world, &nodes[i].offset),
            None => nodes[i].offset,
        };
        let node = &mut nodes[i];
        let mut local = node.local;
        let mut posed = false;

        if let Some(animator) = node.animator.as_mut() {
            let clip = clips
                .get(&animator.clip)
                .ok_or_else(|| anyhow::anyhow!("unknown clip '{}'", animator.clip))?;
            let finished = animator.advance(clip.duration, dt);

            for track in &clip.tracks {
                let value = sample_track(track, animator.time);
                match &track.target {
                    TrackTarget::Node => apply_sample(&mut local, track.property, &value),
                    TrackTarget::Joint { name } => {
                        let Some(skeleton) = node.skeleton.as_mut() else {
                            continue;
                        };
                        let Some(joint) = skeleton.joint_index(name) else {
                            continue;
                        };
                        let mut pose = skeleton.local_poses[joint];
                        apply_sample(&mut pose, track.property, &value);
                        if pose != skeleton.local_poses[joint] {
                            skeleton.local_poses[joint] = pose;
                            posed = true;
                        }
                    }
                }
            }

            if finished {
                out.push(PoseUpdate::Finished(AnimationFinished {
                    entity: node.entity,
                    clip: animator.clip.clone(),
                }));
            }
        }

        if posed {
            if let Some(skeleton) = node.skeleton.as_mut() {
                skeleton.compute_bone_matrices();
            }
        }

        let world = mat4_mul(&parent_world, &local.to_matrix());
        if local != node.local {
            out.push(PoseUpdate::Transform(node.entity, local));
        } else if posed || world != node.world {
            out.push(PoseUpdate::Posed(node.entity));
        }
        node.local = local;
        node.world = world;
    }

    task.nodes = nodes;
    Ok(())
}

fn follow_merges(task: &mut MergeTask, out: &mut Vec<PoseUpdate>) -> anyhow::Result<()> {
    let mut members = task.members.clone();

    for i in 0..members.len() {
        let (before, rest) = members.split_at_mut(i);
        let member = &mut rest[0];
        let source = if member.target == task.root {
            &task.source
        } else {
            match before.iter().find(|m| m.entity == member.target) {
                Some(target) => &target.skeleton,
                None => continue,
            }
        };

        let previous = member.skeleton.local_poses.clone();
        member.skeleton.copy_pose_from(source);
        if member.skeleton.local_poses != previous {
            member.skeleton.compute_bone_matrices();
            out.push(PoseUpdate::Posed(member.entity));
        }
    }

    task.members = members;
    Ok(())
}

impl RuntimeSystem for AnimationSystem {
    fn name(&self) -> &str {
        "animation"
    }

    fn subscriptions(&self) -> Vec<(Stage, i32)> {
        vec![(Stage::UpdateBones, 0)]
    }

    fn initialize(&mut self, _world: &mut World) -> anyhow::Result<()> {
        log::debug!(
            "animation: {} clip(s), {} animated node(s)",
            self.clips.len(),
            self.nodes.len()
        );
        Ok(())
    }

    fn run(&mut self, _stage: Stage, world: &mut World, time: &TickTime) -> anyhow::Result<()> {
        self.update(world, time.delta);
        Ok(())
    }

    fn shutdown(&mut self, _world: &mut World) -> anyhow::Result<()> {
        self.nodes.clear();
        self.observers.clear();
        Ok(())
    }
}
