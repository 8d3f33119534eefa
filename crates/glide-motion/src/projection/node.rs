use serde::{Deserialize, Serialize};
use std::rc::Rc;

use crate::driver::Controls;
use crate::geometry::{Delta, LayoutBox};
use crate::host::ElementHandle;
use crate::reconciler::NodeId;
use crate::scale_correction::CorrectionContext;
use crate::transition::TransitionSpec;
use crate::value::{MotionValue, Subscription};

use super::LayoutNodeId;

/// Which layout changes animate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    /// Layout changes snap.
    #[default]
    None,
    /// Position and size changes animate (translate and scale).
    Full,
    /// Only position changes animate; size changes snap.
    Position,
}

impl LayoutMode {
    pub fn is_enabled(self) -> bool {
        self != Self::None
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayoutOptions {
    pub mode: LayoutMode,
    /// Shared identity for element-to-element transitions.
    pub layout_id: Option<String>,
    /// Overrides the engine's default layout transition.
    pub transition: Option<TransitionSpec>,
}

/// What a node should apply for the current frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProjectionOutput {
    /// Projection part of the `transform`, written before the node's own
    /// motion transform.
    pub transform: Option<String>,
    /// Set while the node is scaled, so radius and shadow can be corrected.
    pub correction: Option<CorrectionContext>,
}

/// Receiver of projection output, implemented by the owning motion node.
pub trait ProjectionSink {
    fn apply_projection(&self, output: &ProjectionOutput);
}

pub(super) struct LayoutAnimation {
    pub seq: u64,
    pub from: LayoutBox,
    pub to: LayoutBox,
    pub progress: MotionValue,
    pub controls: Option<Controls>,
    pub subscription: Option<Subscription>,
}

impl LayoutAnimation {
    pub fn progress(&self) -> f64 {
        self.progress.get().as_number().unwrap_or(1.0)
    }
}

pub(super) struct LayoutNode {
    pub owner: NodeId,
    pub element: Rc<dyn ElementHandle>,
    pub sink: Rc<dyn ProjectionSink>,
    pub parent: Option<LayoutNodeId>,
    pub children: Vec<LayoutNodeId>,
    pub depth: usize,
    pub options: LayoutOptions,
    /// Last measured (untransformed) box.
    pub layout_box: LayoutBox,
    /// Visual box captured before a mutation.
    pub snapshot: Option<LayoutBox>,
    /// Box handed over by a departing node with the same layout id.
    pub pending_from: Option<LayoutBox>,
    /// Box the node visually occupies this frame.
    pub target_box: LayoutBox,
    pub animation: Option<LayoutAnimation>,
    pub delta: Delta,
    pub visible: bool,
    pub last_output: ProjectionOutput,
}

impl LayoutNode {
    /// Where the node currently appears on screen.
    pub fn visual_box(&self) -> LayoutBox {
        if self.animation.is_some() {
            self.target_box
        } else {
            self.layout_box
        }
    }
}
