//! Scene node data and metadata

use hecs::Entity;

/// Hierarchy and activation data stored on every scene entity
#[derive(Debug, Clone)]
pub struct Node {
    /// Human-readable name, unique within a scene
    pub name: String,
    pub parent: Option<Entity>,
    /// Children in insertion order
    pub children: Vec<Entity>,
    /// Local enabled flag; effective activity also depends on ancestors
    pub enabled: bool,
    /// Bumped once for every applied transform change
    pub transform_version: u64,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            children: Vec::new(),
            enabled: true,
            transform_version: 0,
        }
    }
}

/// Information about a node for listings and reports
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub entity: Entity,
    pub name: String,
    pub parent: Option<String>,
    pub enabled: bool,
    pub active: bool,
    pub children: usize,
}
