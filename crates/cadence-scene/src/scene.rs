//! SceneGraph - hecs world with named nodes, hierarchy and liveness checks

use crate::node::{Node, NodeInfo};
use bimap::BiMap;
use cadence_core::{mat4_mul, CadenceError, Liveness, Mat4, Result, Transform};
use hecs::Entity;
use std::collections::HashSet;

/// The scene graph owned by a scheduler instance
///
/// Wraps hecs::World with:
/// - Named entity lookup (names are unique)
/// - Parent/child hierarchy with cycle rejection
/// - Enabled flags and derived "active in hierarchy" state
/// - Local transforms with per-node change versions
///
/// Membership (spawn, reparent, destroy) is main-thread only. Despawned
/// entities keep their generation retired in hecs, so a stale `Entity`
/// resolves to `Liveness::Stale` instead of aliasing a new node.
pub struct SceneGraph {
    world: hecs::World,
    /// Bidirectional mapping: name <-> entity
    names: BiMap<String, Entity>,
    /// Entities whose transform changed since the last `take_transform_changes`
    changed: Vec<Entity>,
    changed_set: HashSet<Entity>,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            world: hecs::World::new(),
            names: BiMap::new(),
            changed: Vec::new(),
            changed_set: HashSet::new(),
        }
    }

    /// Spawn a new root node with an identity transform
    pub fn spawn(&mut self, name: impl Into<String>) -> Result<Entity> {
        self.spawn_with_transform(name, Transform::IDENTITY)
    }

    /// Spawn a new root node with the given local transform
    pub fn spawn_with_transform(
        &mut self,
        name: impl Into<String>,
        transform: Transform,
    ) -> Result<Entity> {
        let name = name.into();
        if self.names.contains_left(&name) {
            return Err(CadenceError::DuplicateEntityName(name));
        }

        let entity = self.world.spawn((Node::new(name.clone()), transform));
        self.names.insert(name, entity);
        Ok(entity)
    }

    /// Spawn a node directly under `parent`
    pub fn spawn_child(
        &mut self,
        name: impl Into<String>,
        parent: Entity,
        transform: Transform,
    ) -> Result<Entity> {
        if !self.contains(parent) {
            return Err(CadenceError::EntityNotFound(format!("{parent:?}")));
        }
        let child = self.spawn_with_transform(name, transform)?;
        self.set_parent(child, Some(parent))?;
        Ok(child)
    }

    /// Reparent `child` under `parent`, or detach it with `None`
    pub fn set_parent(&mut self, child: Entity, parent: Option<Entity>) -> Result<()> {
        if !self.contains(child) {
            return Err(CadenceError::EntityNotFound(format!("{child:?}")));
        }
        if let Some(parent) = parent {
            if !self.contains(parent) {
                return Err(CadenceError::EntityNotFound(format!("{parent:?}")));
            }
            if parent == child || self.ancestors(parent).contains(&child) {
                return Err(CadenceError::InvalidHierarchy(format!(
                    "{} cannot be parented under its own descendant {}",
                    self.name(child).unwrap_or("?"),
                    self.name(parent).unwrap_or("?")
                )));
            }
        }

        if let Some(old) = self.parent(child) {
            if let Ok(mut node) = self.world.get::<&mut Node>(old) {
                node.children.retain(|c| *c != child);
            }
        }
        if let Some(parent) = parent {
            if let Ok(mut node) = self.world.get::<&mut Node>(parent) {
                node.children.push(child);
            }
        }
        if let Ok(mut node) = self.world.get::<&mut Node>(child) {
            node.parent = parent;
        }
        Ok(())
    }

    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        self.world.get::<&Node>(entity).ok().and_then(|n| n.parent)
    }

    pub fn children(&self, entity: Entity) -> Vec<Entity> {
        self.world
            .get::<&Node>(entity)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Ancestors from the nearest parent up to the root
    pub fn ancestors(&self, entity: Entity) -> Vec<Entity> {
        let mut out = Vec::new();
        let mut current = self.parent(entity);
        while let Some(e) = current {
            out.push(e);
            current = self.parent(e);
        }
        out
    }

    /// Depth-first list of `entity` and everything below it, parents first
    pub fn subtree(&self, entity: Entity) -> Vec<Entity> {
        let mut out = Vec::new();
        if !self.contains(entity) {
            return out;
        }
        let mut stack = vec![entity];
        while let Some(e) = stack.pop() {
            out.push(e);
            let children = self.children(e);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Nodes without a parent
    pub fn roots(&self) -> Vec<Entity> {
        let mut roots: Vec<Entity> = self
            .world
            .query::<&Node>()
            .iter()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(e, _)| e)
            .collect();
        roots.sort();
        roots
    }

    pub fn find(&self, name: &str) -> Option<Entity> {
        self.names.get_by_left(name).copied()
    }

    pub fn name(&self, entity: Entity) -> Option<&str> {
        self.names.get_by_right(&entity).map(String::as_str)
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.world.contains(entity)
    }

    /// Single liveness check for references that may have outlived their node
    pub fn liveness(&self, entity: Entity) -> Liveness {
        Liveness::from_alive(self.contains(entity))
    }

    pub fn entity_count(&self) -> usize {
        self.names.len()
    }

    pub fn set_enabled(&mut self, entity: Entity, enabled: bool) -> Result<()> {
        let mut node = self
            .world
            .get::<&mut Node>(entity)
            .map_err(|_| CadenceError::EntityNotFound(format!("{entity:?}")))?;
        node.enabled = enabled;
        Ok(())
    }

    pub fn is_enabled(&self, entity: Entity) -> bool {
        self.world
            .get::<&Node>(entity)
            .map(|n| n.enabled)
            .unwrap_or(false)
    }

    /// True when the node is alive and it and all of its ancestors are enabled
    pub fn is_active_in_hierarchy(&self, entity: Entity) -> bool {
        let mut current = Some(entity);
        while let Some(e) = current {
            let Ok(node) = self.world.get::<&Node>(e) else {
                return false;
            };
            if !node.enabled {
                return false;
            }
            current = node.parent;
        }
        true
    }

    pub fn local_transform(&self, entity: Entity) -> Option<Transform> {
        self.world.get::<&Transform>(entity).ok().map(|t| *t)
    }

    /// Write a local transform and record a single change notification for it
    pub fn set_local_transform(&mut self, entity: Entity, transform: Transform) -> Result<()> {
        {
            let mut local = self
                .world
                .get::<&mut Transform>(entity)
                .map_err(|_| CadenceError::EntityNotFound(format!("{entity:?}")))?;
            *local = transform;
        }
        self.mark_transform_changed(entity)
    }

    /// Record a transform change without writing a new local transform, for
    /// nodes whose pose lives outside the scene (skeletons)
    pub fn mark_transform_changed(&mut self, entity: Entity) -> Result<()> {
        let mut node = self
            .world
            .get::<&mut Node>(entity)
            .map_err(|_| CadenceError::EntityNotFound(format!("{entity:?}")))?;
        node.transform_version += 1;
        drop(node);
        if self.changed_set.insert(entity) {
            self.changed.push(entity);
        }
        Ok(())
    }

    /// Number of transform changes applied to the node so far
    pub fn transform_version(&self, entity: Entity) -> Option<u64> {
        self.world
            .get::<&Node>(entity)
            .ok()
            .map(|n| n.transform_version)
    }

    /// Drain the set of nodes whose transform changed, in first-change order
    pub fn take_transform_changes(&mut self) -> Vec<Entity> {
        self.changed_set.clear();
        std::mem::take(&mut self.changed)
    }

    /// World-space matrix, walking the parent chain
    pub fn world_matrix(&self, entity: Entity) -> Option<Mat4> {
        let local = self.local_transform(entity)?.to_matrix();
        match self.parent(entity) {
            Some(parent) => {
                let parent_mat = self.world_matrix(parent)?;
                Some(mat4_mul(&parent_mat, &local))
            }
            None => Some(local),
        }
    }

    /// Destroy a node and its whole subtree. Returns every despawned entity.
    pub fn destroy(&mut self, entity: Entity) -> Result<Vec<Entity>> {
        if !self.contains(entity) {
            return Err(CadenceError::EntityNotFound(format!("{entity:?}")));
        }

        if let Some(parent) = self.parent(entity) {
            if let Ok(mut node) = self.world.get::<&mut Node>(parent) {
                node.children.retain(|c| *c != entity);
            }
        }

        let doomed = self.subtree(entity);
        for e in &doomed {
            self.names.remove_by_right(e);
            self.changed_set.remove(e);
            let _ = self.world.despawn(*e);
        }
        self.changed.retain(|e| !doomed.contains(e));
        Ok(doomed)
    }

    /// Destroy a node by name
    pub fn destroy_by_name(&mut self, name: &str) -> Result<Vec<Entity>> {
        let entity = self
            .find(name)
            .ok_or_else(|| CadenceError::EntityNotFound(name.to_string()))?;
        self.destroy(entity)
    }

    /// Info about every node, ordered by name
    pub fn all_nodes(&self) -> Vec<NodeInfo> {
        let mut infos: Vec<NodeInfo> = self
            .world
            .query::<&Node>()
            .iter()
            .map(|(entity, node)| NodeInfo {
                entity,
                name: node.name.clone(),
                parent: node
                    .parent
                    .and_then(|p| self.name(p).map(String::from)),
                enabled: node.enabled,
                active: self.is_active_in_hierarchy(entity),
                children: node.children.len(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Clear the scene (teardown)
    pub fn clear(&mut self) {
        self.world.clear();
        self.names.clear();
        self.changed.clear();
        self.changed_set.clear();
    }
}
