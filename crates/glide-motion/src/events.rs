//! Lifecycle events.
//!
//! The engine records what happened during a tick as [`MotionEvent`]s; the
//! host drains them afterwards (`MotionRuntime::drain_events`) to run its
//! own callbacks.
//!
//! # Usage
//!
//! ```ignore
//! runtime.tick(16.0);
//! for event in runtime.drain_events() {
//!     if let MotionEvent::ExitComplete { key, .. } = event {
//!         println!("{} left the tree", key);
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::reconciler::{LayerType, NodeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MotionEvent {
    /// A layer started animating towards a new target.
    AnimationStart { node: NodeId, layer: LayerType },
    /// Every property of a layer's run settled and `transitionEnd` was applied.
    AnimationComplete { node: NodeId, layer: LayerType },
    LayoutAnimationStart { node: NodeId },
    LayoutAnimationComplete { node: NodeId },
    /// A presence child was released. `forced` is set when the safety
    /// timeout released it rather than its exit animation.
    ExitComplete { key: String, forced: bool },
}

impl MotionEvent {
    /// Node the event refers to, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::AnimationStart { node, .. }
            | Self::AnimationComplete { node, .. }
            | Self::LayoutAnimationStart { node }
            | Self::LayoutAnimationComplete { node } => Some(*node),
            Self::ExitComplete { .. } => None,
        }
    }
}

/// FIFO of pending events.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<MotionEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: MotionEvent) {
        self.events.push_back(event);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = MotionEvent> + '_ {
        self.events.drain(..)
    }

    /// Events that refer to `node`.
    pub fn events_for_node(&self, node: NodeId) -> Vec<&MotionEvent> {
        self.events
            .iter()
            .filter(|e| e.node() == Some(node))
            .collect()
    }
}
