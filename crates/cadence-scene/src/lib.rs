//! Cadence Scene - hierarchical scene graph with generation-checked handles
//!
//! This crate wraps hecs with named nodes, a parent/child hierarchy,
//! enabled/active state and local transforms with change notifications.

mod node;
mod scene;

pub use hecs::Entity;
pub use node::{Node, NodeInfo};
pub use scene::SceneGraph;
