//! Error types for the motion engine.
//!
//! Only API misuse is reported as an error. Malformed values, unknown
//! variant labels and degenerate geometry are normal inputs that resolve
//! to "nothing to do".

use thiserror::Error;

use crate::projection::LayoutNodeId;
use crate::reconciler::NodeId;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, MotionError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MotionError {
    /// The layout node was never registered or has been unregistered.
    #[error("unknown layout node {0:?}")]
    UnknownLayoutNode(LayoutNodeId),

    /// The motion node has already been unmounted.
    #[error("motion node {0} is not mounted")]
    NodeUnmounted(NodeId),

    /// A presence group already tracks a live node under this key.
    #[error("presence key {0:?} is already registered")]
    DuplicatePresenceKey(String),
}
