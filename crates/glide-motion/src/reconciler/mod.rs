//! Per-node animation reconciliation.
//!
//! A [`MotionNode`] owns the animated values of one element. Whenever its
//! props, gesture flags or presence change it re-resolves every animation
//! layer, decides which layer owns each property, and restarts only the
//! properties whose owner or keyframes changed.

mod node;
mod props;

pub use node::{ExitParticipant, MotionNode};
pub use props::{Initial, MotionProps};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a motion node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Animation layers, ordered from lowest to highest priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerType {
    /// The `animate` prop, plus the synthesized rest state.
    Base,
    InView,
    Focus,
    Hover,
    Tap,
    Drag,
    Exit,
}

impl LayerType {
    /// Every layer, lowest priority first.
    pub const ALL: [LayerType; 7] = [
        LayerType::Base,
        LayerType::InView,
        LayerType::Focus,
        LayerType::Hover,
        LayerType::Tap,
        LayerType::Drag,
        LayerType::Exit,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Base => "animate",
            Self::InView => "whileInView",
            Self::Focus => "whileFocus",
            Self::Hover => "whileHover",
            Self::Tap => "whileTap",
            Self::Drag => "whileDrag",
            Self::Exit => "exit",
        };
        f.write_str(name)
    }
}

/// Gesture flags reported by the host's gesture layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GestureState {
    pub hover: bool,
    pub tap: bool,
    pub focus: bool,
    pub drag: bool,
    pub in_view: bool,
}

impl GestureState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hover(mut self, hover: bool) -> Self {
        self.hover = hover;
        self
    }

    pub fn with_tap(mut self, tap: bool) -> Self {
        self.tap = tap;
        self
    }

    pub fn with_focus(mut self, focus: bool) -> Self {
        self.focus = focus;
        self
    }

    pub fn with_drag(mut self, drag: bool) -> Self {
        self.drag = drag;
        self
    }

    pub fn with_in_view(mut self, in_view: bool) -> Self {
        self.in_view = in_view;
        self
    }

    /// Flag backing a gesture layer. `Base` and `Exit` are not gestures.
    pub fn is_active(&self, layer: LayerType) -> bool {
        match layer {
            LayerType::Hover => self.hover,
            LayerType::Tap => self.tap,
            LayerType::Focus => self.focus,
            LayerType::Drag => self.drag,
            LayerType::InView => self.in_view,
            LayerType::Base | LayerType::Exit => false,
        }
    }

    pub(crate) fn set(&mut self, layer: LayerType, active: bool) -> bool {
        let slot = match layer {
            LayerType::Hover => &mut self.hover,
            LayerType::Tap => &mut self.tap,
            LayerType::Focus => &mut self.focus,
            LayerType::Drag => &mut self.drag,
            LayerType::InView => &mut self.in_view,
            LayerType::Base | LayerType::Exit => return false,
        };
        let changed = *slot != active;
        *slot = active;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_priority_order() {
        assert!(LayerType::Exit > LayerType::Drag);
        assert!(LayerType::Drag > LayerType::Tap);
        assert!(LayerType::Tap > LayerType::Hover);
        assert!(LayerType::Hover > LayerType::Focus);
        assert!(LayerType::Focus > LayerType::InView);
        assert!(LayerType::InView > LayerType::Base);
        assert_eq!(LayerType::ALL.iter().max(), Some(&LayerType::Exit));
    }

    #[test]
    fn test_gesture_state() {
        let mut state = GestureState::new().with_hover(true);
        assert!(state.is_active(LayerType::Hover));
        assert!(!state.is_active(LayerType::Exit));
        assert!(state.set(LayerType::Tap, true));
        assert!(!state.set(LayerType::Tap, true));
        assert!(!state.set(LayerType::Base, true));
    }

    #[test]
    fn test_node_ids_are_unique() {
        assert_ne!(NodeId::new(), NodeId::new());
    }
}
