//! Layout projection.
//!
//! Nodes that opt into layout animation register with the
//! [`ProjectionEngine`]. Before a layout-affecting mutation the host calls
//! `schedule_update`, which snapshots every registered box; on the next
//! frame the engine measures the new boxes, animates from old to new, and
//! each frame hands every node a compensating transform plus the context
//! for scale-correcting its radius and shadow styles.

mod engine;
mod node;
mod shared;

pub use engine::ProjectionEngine;
pub use node::{LayoutMode, LayoutOptions, ProjectionOutput, ProjectionSink};

slotmap::new_key_type! {
    /// Handle for a registered layout node.
    pub struct LayoutNodeId;
}
