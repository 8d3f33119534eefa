use slotmap::SlotMap;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

use crate::completion::Outcome;
use crate::driver::{AnimationDriver, AnimationRequest};
use crate::error::{MotionError, Result};
use crate::events::{EventQueue, MotionEvent};
use crate::geometry::{
    DEFAULT_ORIGIN, DELTA_EPSILON, Delta, LayoutBox, apply_tree_deltas, calc_box_delta, mix_box,
};
use crate::host::ElementHandle;
use crate::reconciler::NodeId;
use crate::scale_correction::CorrectionContext;
use crate::scheduler::Scheduler;
use crate::transform::build_projection_transform;
use crate::transition::TransitionSpec;
use crate::value::{Keyframes, MotionValue};

use super::LayoutNodeId;
use super::node::{LayoutAnimation, LayoutMode, LayoutNode, LayoutOptions, ProjectionOutput, ProjectionSink};
use super::shared::SharedStack;

#[derive(Default)]
struct EngineState {
    nodes: SlotMap<LayoutNodeId, LayoutNode>,
    /// Registered nodes sorted by depth, ancestors before descendants.
    order: Vec<LayoutNodeId>,
    shared: SharedStack,
    /// Snapshots were taken for the current update window.
    snapshot_taken: bool,
    flush_pending: bool,
    projection_pending: bool,
    next_seq: u64,
}

struct EngineShared {
    state: RefCell<EngineState>,
    scheduler: Scheduler,
    driver: Rc<dyn AnimationDriver>,
    events: Rc<RefCell<EventQueue>>,
    default_transition: TransitionSpec,
}

/// Registry of layout-animated nodes.
///
/// One engine exists per runtime. Nodes are only touched through its
/// methods; sinks and the host element are called with no internal borrow
/// held.
#[derive(Clone)]
pub struct ProjectionEngine {
    shared: Rc<EngineShared>,
}

struct PlannedAnimation {
    id: LayoutNodeId,
    owner: NodeId,
    from: LayoutBox,
    to: LayoutBox,
    spec: TransitionSpec,
    seq: u64,
}

impl ProjectionEngine {
    pub fn new(
        scheduler: Scheduler,
        driver: Rc<dyn AnimationDriver>,
        events: Rc<RefCell<EventQueue>>,
        default_transition: TransitionSpec,
    ) -> Self {
        Self {
            shared: Rc::new(EngineShared {
                state: RefCell::new(EngineState::default()),
                scheduler,
                driver,
                events,
                default_transition,
            }),
        }
    }

    fn downgrade(&self) -> Weak<EngineShared> {
        Rc::downgrade(&self.shared)
    }

    fn upgrade(weak: &Weak<EngineShared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    /// Register a node under `parent` and measure it.
    ///
    /// A node joining a `layout_id` starts from the box of the member it
    /// replaces: a box donated by a member that just left, or else the
    /// current lead's visual box.
    pub fn register(
        &self,
        element: Rc<dyn ElementHandle>,
        parent: Option<LayoutNodeId>,
        options: LayoutOptions,
        sink: Rc<dyn ProjectionSink>,
        owner: NodeId,
    ) -> LayoutNodeId {
        let measured = element.measure();
        let (id, handed_over) = {
            let mut guard = self.shared.state.borrow_mut();
            let state = &mut *guard;
            let parent = parent.filter(|p| state.nodes.contains_key(*p));
            let depth = parent
                .and_then(|p| state.nodes.get(p))
                .map_or(0, |p| p.depth + 1);
            let layout_id = options.layout_id.clone();

            let id = state.nodes.insert(LayoutNode {
                owner,
                element,
                sink,
                parent,
                children: Vec::new(),
                depth,
                options,
                layout_box: measured,
                snapshot: None,
                pending_from: None,
                target_box: measured,
                animation: None,
                delta: Delta::default(),
                visible: true,
                last_output: ProjectionOutput::default(),
            });
            if let Some(parent) = parent.and_then(|p| state.nodes.get_mut(p)) {
                parent.children.push(id);
            }
            let nodes = &state.nodes;
            let at = state
                .order
                .partition_point(|other| nodes.get(*other).is_some_and(|n| n.depth <= depth));
            state.order.insert(at, id);

            let handed_over = layout_id.as_deref().and_then(|layout_id| {
                let previous = state.shared.lead(layout_id, id, |m| {
                    state.nodes.get(m).is_some_and(|n| n.visible)
                });
                let donated = state.shared.add(layout_id, id);
                donated.or_else(|| previous.and_then(|p| state.nodes.get(p)).map(|n| n.visual_box()))
            });
            if let Some(from) = handed_over
                && let Some(node) = state.nodes.get_mut(id)
            {
                node.pending_from = Some(from);
            }
            (id, handed_over.is_some())
        };

        debug!(node = %owner, ?id, "layout node registered");
        if handed_over {
            self.request_flush();
        }
        id
    }

    /// Remove a node. Its children move up to its parent, and if it shared
    /// a `layout_id` its last visual box is handed to the next member.
    pub fn unregister(&self, id: LayoutNodeId) -> Result<()> {
        let (animation, handed_over) = {
            let mut guard = self.shared.state.borrow_mut();
            let state = &mut *guard;
            let node = state
                .nodes
                .remove(id)
                .ok_or(MotionError::UnknownLayoutNode(id))?;

            if let Some(parent) = node.parent.and_then(|p| state.nodes.get_mut(p)) {
                parent.children.retain(|c| *c != id);
                parent.children.extend(node.children.iter().copied());
            }
            for child in &node.children {
                if let Some(child) = state.nodes.get_mut(*child) {
                    child.parent = node.parent;
                }
            }
            reassign_depths(&mut state.nodes, &node.children);
            state.order.retain(|n| *n != id);
            let nodes = &state.nodes;
            state
                .order
                .sort_by_key(|n| nodes.get(*n).map_or(0, |node| node.depth));

            let mut handed_over = false;
            if let Some(layout_id) = &node.options.layout_id {
                state.shared.remove(layout_id, id);
                if node.visible {
                    handed_over = hand_over(state, layout_id, id, node.visual_box());
                }
            }
            debug!(node = %node.owner, ?id, "layout node unregistered");
            (node.animation, handed_over)
        };

        if let Some(animation) = animation {
            stop_animation(animation);
        }
        if handed_over {
            self.request_flush();
        }
        Ok(())
    }

    /// Replace a node's options, moving it between shared identities if
    /// its `layout_id` changed.
    pub fn set_options(&self, id: LayoutNodeId, options: LayoutOptions) -> Result<()> {
        let mut guard = self.shared.state.borrow_mut();
        let state = &mut *guard;
        let node = state
            .nodes
            .get_mut(id)
            .ok_or(MotionError::UnknownLayoutNode(id))?;
        let previous = std::mem::replace(&mut node.options, options);
        let current = node.options.layout_id.clone();
        if previous.layout_id != current {
            if let Some(old) = &previous.layout_id {
                state.shared.remove(old, id);
            }
            if let Some(new) = &current {
                state.shared.add(new, id);
            }
        }
        Ok(())
    }

    /// Show or hide a node. Hiding a member of a shared identity hands its
    /// box to the next visible member, which animates from there.
    pub fn set_visible(&self, id: LayoutNodeId, visible: bool) -> Result<()> {
        let handed_over = {
            let mut guard = self.shared.state.borrow_mut();
            let state = &mut *guard;
            let node = state
                .nodes
                .get_mut(id)
                .ok_or(MotionError::UnknownLayoutNode(id))?;
            if node.visible == visible {
                return Ok(());
            }
            node.visible = visible;
            let layout_id = node.options.layout_id.clone();
            let visual = node.visual_box();
            match layout_id {
                Some(layout_id) if !visible => hand_over(state, &layout_id, id, visual),
                _ => false,
            }
        };
        if handed_over {
            self.request_flush();
        }
        Ok(())
    }

    /// Snapshot every node before a layout-affecting mutation. The new
    /// layout is measured on the next frame. Calls within one update window
    /// share a single snapshot and a single measurement pass.
    pub fn schedule_update(&self) {
        {
            let mut guard = self.shared.state.borrow_mut();
            let state = &mut *guard;
            if state.snapshot_taken {
                trace!("layout update coalesced");
                return;
            }
            state.snapshot_taken = true;
            for id in &state.order {
                if let Some(node) = state.nodes.get_mut(*id) {
                    let visual = if node.animation.is_some() {
                        node.target_box
                    } else {
                        node.element.measure()
                    };
                    node.snapshot = Some(visual);
                }
            }
            debug!(nodes = state.order.len(), "layout snapshot taken");
        }
        self.request_flush();
    }

    fn request_flush(&self) {
        {
            let mut state = self.shared.state.borrow_mut();
            if state.flush_pending {
                return;
            }
            state.flush_pending = true;
        }
        let weak = self.downgrade();
        self.shared.scheduler.request_frame(move || {
            if let Some(engine) = Self::upgrade(&weak) {
                engine.flush();
            }
        });
    }

    fn request_projection_frame(&self) {
        {
            let mut state = self.shared.state.borrow_mut();
            if state.projection_pending {
                return;
            }
            state.projection_pending = true;
        }
        let weak = self.downgrade();
        self.shared.scheduler.request_frame(move || {
            if let Some(engine) = Self::upgrade(&weak) {
                engine.update_projections();
            }
        });
    }

    /// Measure the new layout, start an animation for every node whose box
    /// moved, and project the first frame.
    fn flush(&self) {
        let mut planned = Vec::new();
        let mut settled = Vec::new();
        {
            let mut guard = self.shared.state.borrow_mut();
            let state = &mut *guard;
            state.flush_pending = false;
            state.snapshot_taken = false;

            for id in &state.order {
                let Some(node) = state.nodes.get_mut(*id) else {
                    continue;
                };
                let measured = node.element.measure();
                node.layout_box = measured;
                let from = node.pending_from.take().or(node.snapshot.take());
                let Some(from) = from else {
                    continue;
                };
                if node.options.mode == LayoutMode::None && node.options.layout_id.is_none() {
                    continue;
                }
                let from = match node.options.mode {
                    LayoutMode::Position => from.with_size_of(&measured),
                    LayoutMode::Full | LayoutMode::None => from,
                };

                if boxes_match(&from, &measured) {
                    if let Some(animation) = node.animation.take() {
                        node.target_box = measured;
                        settled.push(animation);
                    }
                    continue;
                }

                if let Some(animation) = node.animation.take() {
                    settled.push(animation);
                }
                state.next_seq += 1;
                planned.push(PlannedAnimation {
                    id: *id,
                    owner: node.owner,
                    from,
                    to: measured,
                    spec: node
                        .options
                        .transition
                        .unwrap_or(self.shared.default_transition),
                    seq: state.next_seq,
                });
            }
            state.shared.clear_donations();
        }

        for animation in settled {
            stop_animation(animation);
        }
        for plan in planned {
            self.start_animation(plan);
        }
        self.update_projections();
    }

    fn start_animation(&self, plan: PlannedAnimation) {
        let PlannedAnimation {
            id,
            owner,
            from,
            to,
            spec,
            seq,
        } = plan;

        let progress = MotionValue::new(0.0);
        let weak = self.downgrade();
        let subscription = progress.on_change(move |_| {
            if let Some(engine) = Self::upgrade(&weak) {
                engine.request_projection_frame();
            }
        });
        {
            let mut state = self.shared.state.borrow_mut();
            let Some(node) = state.nodes.get_mut(id) else {
                subscription.unsubscribe();
                return;
            };
            node.animation = Some(LayoutAnimation {
                seq,
                from,
                to,
                progress: progress.clone(),
                controls: None,
                subscription: Some(subscription),
            });
        }

        debug!(node = %owner, ?from, ?to, duration_ms = spec.duration_ms, "layout animation started");
        self.shared
            .events
            .borrow_mut()
            .push(MotionEvent::LayoutAnimationStart { node: owner });

        let controls = self.shared.driver.animate(AnimationRequest {
            key: "layout".to_string(),
            value: progress,
            keyframes: Keyframes::single(1.0),
            spec,
        });
        let finished = controls.finished.clone();
        {
            let mut state = self.shared.state.borrow_mut();
            let current = state
                .nodes
                .get_mut(id)
                .and_then(|n| n.animation.as_mut())
                .filter(|a| a.seq == seq);
            if let Some(animation) = current {
                animation.controls = Some(controls);
            }
        }

        let weak = self.downgrade();
        let scheduler = self.shared.scheduler.clone();
        finished.on_settled(move |outcome| {
            scheduler.queue_microtask(move || {
                if let Some(engine) = Self::upgrade(&weak) {
                    engine.finish_animation(id, seq, outcome);
                }
            });
        });
    }

    fn finish_animation(&self, id: LayoutNodeId, seq: u64, outcome: Outcome) {
        let (owner, animation) = {
            let mut state = self.shared.state.borrow_mut();
            let Some(node) = state.nodes.get_mut(id) else {
                return;
            };
            if node.animation.as_ref().map(|a| a.seq) != Some(seq) {
                return;
            }
            node.target_box = node.layout_box;
            (node.owner, node.animation.take())
        };
        if let Some(animation) = animation {
            stop_animation(animation);
        }
        debug!(node = %owner, ?outcome, "layout animation complete");
        self.shared
            .events
            .borrow_mut()
            .push(MotionEvent::LayoutAnimationComplete { node: owner });
        self.request_projection_frame();
    }

    /// Recompute every node's delta, ancestors first, and hand changed
    /// output to the sinks.
    pub fn update_projections(&self) {
        let mut outputs = Vec::new();
        {
            let mut guard = self.shared.state.borrow_mut();
            let state = &mut *guard;
            state.projection_pending = false;

            for id in &state.order {
                let mut ancestors = Vec::new();
                let mut cursor = state.nodes.get(*id).and_then(|n| n.parent);
                while let Some(parent) = cursor.and_then(|p| state.nodes.get(p)) {
                    ancestors.push(parent.delta);
                    cursor = parent.parent;
                }
                ancestors.reverse();

                let Some(node) = state.nodes.get_mut(*id) else {
                    continue;
                };
                let target = match &node.animation {
                    Some(animation) => mix_box(&animation.from, &animation.to, animation.progress()),
                    None => node.layout_box,
                };
                let mut projected = node.layout_box;
                let tree_scale = apply_tree_deltas(&mut projected, ancestors.iter());
                calc_box_delta(&mut node.delta, &projected, &target, (DEFAULT_ORIGIN, DEFAULT_ORIGIN));
                node.target_box = target;

                let scale_x = tree_scale.0 * node.delta.x.scale;
                let scale_y = tree_scale.1 * node.delta.y.scale;
                let scaled = (scale_x - 1.0).abs() > DELTA_EPSILON || (scale_y - 1.0).abs() > DELTA_EPSILON;
                let output = ProjectionOutput {
                    transform: build_projection_transform(&node.delta, tree_scale),
                    correction: scaled.then_some(CorrectionContext {
                        target,
                        scale_x,
                        scale_y,
                    }),
                };
                if output != node.last_output {
                    trace!(node = %node.owner, transform = ?output.transform, "projection changed");
                    node.last_output = output.clone();
                    outputs.push((node.sink.clone(), output));
                }
            }
        }
        for (sink, output) in outputs {
            sink.apply_projection(&output);
        }
    }

    pub fn contains(&self, id: LayoutNodeId) -> bool {
        self.shared.state.borrow().nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.shared.state.borrow().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered nodes in processing order.
    pub fn order(&self) -> Vec<LayoutNodeId> {
        self.shared.state.borrow().order.clone()
    }

    fn with_node<T>(&self, id: LayoutNodeId, f: impl FnOnce(&LayoutNode) -> T) -> Result<T> {
        let state = self.shared.state.borrow();
        state
            .nodes
            .get(id)
            .map(f)
            .ok_or(MotionError::UnknownLayoutNode(id))
    }

    pub fn parent(&self, id: LayoutNodeId) -> Result<Option<LayoutNodeId>> {
        self.with_node(id, |n| n.parent)
    }

    pub fn depth(&self, id: LayoutNodeId) -> Result<usize> {
        self.with_node(id, |n| n.depth)
    }

    /// Last measured box.
    pub fn layout_box(&self, id: LayoutNodeId) -> Result<LayoutBox> {
        self.with_node(id, |n| n.layout_box)
    }

    /// Box the node appears to occupy this frame.
    pub fn visual_box(&self, id: LayoutNodeId) -> Result<LayoutBox> {
        self.with_node(id, |n| n.visual_box())
    }

    pub fn is_animating(&self, id: LayoutNodeId) -> Result<bool> {
        self.with_node(id, |n| n.animation.is_some())
    }

    pub fn output(&self, id: LayoutNodeId) -> Result<ProjectionOutput> {
        self.with_node(id, |n| n.last_output.clone())
    }

    /// Nodes sharing `layout_id`.
    pub fn shared_members(&self, layout_id: &str) -> usize {
        self.shared.state.borrow().shared.members(layout_id)
    }

    /// True when no update is queued and no layout animation is running.
    pub fn is_idle(&self) -> bool {
        let state = self.shared.state.borrow();
        !state.flush_pending
            && !state.projection_pending
            && state.nodes.values().all(|n| n.animation.is_none())
    }
}

fn boxes_match(a: &LayoutBox, b: &LayoutBox) -> bool {
    [
        (a.x.min, b.x.min),
        (a.x.max, b.x.max),
        (a.y.min, b.y.min),
        (a.y.max, b.y.max),
    ]
    .iter()
    .all(|(p, q)| (p - q).abs() <= DELTA_EPSILON)
}

/// Give `visual` to the next visible member of `layout_id`, or park it in
/// the stack for a member registering within this update window. Returns
/// true when a flush is needed.
fn hand_over(state: &mut EngineState, layout_id: &str, from: LayoutNodeId, visual: LayoutBox) -> bool {
    let nodes = &state.nodes;
    let lead = state
        .shared
        .lead(layout_id, from, |m| nodes.get(m).is_some_and(|n| n.visible));
    match lead.and_then(|lead| state.nodes.get_mut(lead)) {
        Some(lead) => {
            trace!(node = %lead.owner, layout_id, "shared layout box handed over");
            lead.pending_from = Some(visual);
            true
        }
        None => {
            state.shared.donate(layout_id, visual);
            false
        }
    }
}

fn reassign_depths(nodes: &mut SlotMap<LayoutNodeId, LayoutNode>, roots: &[LayoutNodeId]) {
    let mut stack = roots.to_vec();
    while let Some(id) = stack.pop() {
        let depth = nodes
            .get(id)
            .and_then(|n| n.parent)
            .and_then(|p| nodes.get(p))
            .map_or(0, |p| p.depth + 1);
        if let Some(node) = nodes.get_mut(id) {
            node.depth = depth;
            stack.extend(node.children.iter().copied());
        }
    }
}

fn stop_animation(animation: LayoutAnimation) {
    if let Some(subscription) = animation.subscription {
        subscription.unsubscribe();
    }
    if let Some(controls) = animation.controls {
        controls.stop();
    }
}
