use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

use crate::completion::{Completion, Outcome};
use crate::context::MotionContext;
use crate::driver::{AnimationRequest, Controls};
use crate::error::{MotionError, Result};
use crate::events::MotionEvent;
use crate::host::ElementHandle;
use crate::orchestration::{ChildTicket, OrchestrationContext};
use crate::projection::{LayoutNodeId, LayoutOptions, ProjectionOutput, ProjectionSink};
use crate::scale_correction::{correct, is_scale_corrected};
use crate::style::{StyleWriter, css_value, is_transform_key, split_unit, transform_identity};
use crate::transform::{build_motion_transform, compose};
use crate::transition::{Orchestration, Transition, TransitionSpec, When};
use crate::value::{Keyframes, MotionValue, Subscription, Value, first_keyframe, keyframes_equal, last_keyframe};
use crate::variants::{AnimationTarget, Definition, ResolveInput, VariantScope, resolve};

use super::{GestureState, Initial, LayerType, MotionProps, NodeId};

const LAYERS: usize = LayerType::ALL.len();

/// Something nested under a node that has its own exit work, such as a
/// presence group whose children must finish exiting first.
pub trait ExitParticipant {
    /// Start exiting. `None` means there is nothing to wait for.
    fn begin_exit(&self) -> Option<Completion>;
    fn cancel_exit(&self);
}

struct ValueEntry {
    value: MotionValue,
    subscription: Subscription,
}

/// Which layer last claimed a key, and with what.
#[derive(Debug, Clone)]
struct KeyOwner {
    layer: LayerType,
    keyframes: Keyframes,
    run_id: u64,
}

struct RunningAnimation {
    run_id: u64,
    controls: Controls,
}

/// One layer animating towards one resolved target.
struct LayerRun {
    id: u64,
    done: Completion,
    transition_end: BTreeMap<String, Value>,
    ticket: Option<(Rc<OrchestrationContext>, ChildTicket)>,
}

impl LayerRun {
    fn cancel(self) {
        self.done.settle(Outcome::Cancelled);
        if let Some((ctx, ticket)) = self.ticket {
            ctx.child_completed(ticket);
        }
    }
}

#[derive(Default)]
struct ExitState {
    exiting: bool,
    cycle: u64,
    handoff: Option<Completion>,
    participants: Vec<Rc<dyn ExitParticipant>>,
}

struct NodeState {
    props: MotionProps,
    /// `initial` after inheritance from the parent.
    initial: Option<Initial>,
    initial_target: Option<AnimationTarget>,
    /// Initial values were created.
    seeded: bool,
    gestures: GestureState,
    mounted: bool,
    parent: Option<Weak<NodeCell>>,
    children: Vec<Weak<NodeCell>>,
    values: BTreeMap<String, ValueEntry>,
    owners: BTreeMap<String, KeyOwner>,
    running: BTreeMap<String, RunningAnimation>,
    resolved: [Option<AnimationTarget>; LAYERS],
    runs: [Option<LayerRun>; LAYERS],
    orchestration: [Option<Rc<OrchestrationContext>>; LAYERS],
    base_cache: BTreeMap<String, Value>,
    writer: StyleWriter,
    projection: ProjectionOutput,
    layout_node: Option<LayoutNodeId>,
    exit: ExitState,
    next_run_id: u64,
}

struct NodeCell {
    id: NodeId,
    ctx: MotionContext,
    element: Rc<dyn ElementHandle>,
    render_pending: Cell<bool>,
    state: RefCell<NodeState>,
}

/// The animated values and animation state of one mounted element.
///
/// Cloning yields another handle to the same node. Parents hold their
/// children weakly; the host owns nodes by keeping handles.
#[derive(Clone)]
pub struct MotionNode {
    cell: Rc<NodeCell>,
}

/// Definition and activity of one layer after inheritance.
#[derive(Clone, Default)]
struct LayerInput {
    definition: Option<Definition>,
    active: bool,
    /// The definition is the parent's label.
    from_parent: bool,
}

struct KeyStart {
    key: String,
    value: MotionValue,
    keyframes: Keyframes,
    spec: TransitionSpec,
}

/// Key animations of one run, started once its gates open.
struct Launch {
    layer: LayerType,
    run_id: u64,
    starts: Vec<KeyStart>,
    wait: Option<Completion>,
    after_children: Option<Rc<OrchestrationContext>>,
    /// Stagger offset still to be added once every sibling has registered.
    stagger: Option<(Rc<OrchestrationContext>, ChildTicket)>,
}

#[derive(Default)]
struct ReconcilePlan {
    cancelled: Vec<LayerRun>,
    stopped: Vec<Controls>,
    launches: Vec<Launch>,
    events: Vec<MotionEvent>,
}

impl MotionNode {
    pub(crate) fn mount(
        ctx: MotionContext,
        element: Rc<dyn ElementHandle>,
        props: MotionProps,
        parent: Option<&MotionNode>,
    ) -> MotionNode {
        let initial = props.initial.clone().or_else(|| {
            let parent = parent?;
            let parent_state = parent.cell.state.borrow();
            if !props.inherit {
                return None;
            }
            match &parent_state.initial {
                Some(Initial::Definition(d)) if d.is_label() => Some(Initial::Definition(d.clone())),
                Some(Initial::Disabled) => Some(Initial::Disabled),
                _ => None,
            }
        });

        let cell = Rc::new(NodeCell {
            id: NodeId::new(),
            ctx,
            element,
            render_pending: Cell::new(false),
            state: RefCell::new(NodeState {
                props,
                initial,
                initial_target: None,
                seeded: false,
                gestures: GestureState::default(),
                mounted: true,
                parent: parent.map(|p| Rc::downgrade(&p.cell)),
                children: Vec::new(),
                values: BTreeMap::new(),
                owners: BTreeMap::new(),
                running: BTreeMap::new(),
                resolved: Default::default(),
                runs: Default::default(),
                orchestration: Default::default(),
                base_cache: BTreeMap::new(),
                writer: StyleWriter::new(),
                projection: ProjectionOutput::default(),
                layout_node: None,
                exit: ExitState::default(),
                next_run_id: 0,
            }),
        });
        if let Some(parent) = parent {
            parent
                .cell
                .state
                .borrow_mut()
                .children
                .push(Rc::downgrade(&cell));
        }

        let node = MotionNode { cell };
        node.seed_values();
        node.render();
        node.register_layout();
        debug!(node = %node.id(), "motion node mounted");
        node.reconcile();
        node
    }

    pub fn id(&self) -> NodeId {
        self.cell.id
    }

    pub fn element(&self) -> Rc<dyn ElementHandle> {
        self.cell.element.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.cell.state.borrow().mounted
    }

    pub fn is_exiting(&self) -> bool {
        self.cell.state.borrow().exit.exiting
    }

    /// Incremented every time an exit starts or is cancelled.
    pub fn exit_cycle(&self) -> u64 {
        self.cell.state.borrow().exit.cycle
    }

    pub fn props(&self) -> MotionProps {
        self.cell.state.borrow().props.clone()
    }

    pub fn gestures(&self) -> GestureState {
        self.cell.state.borrow().gestures
    }

    pub fn value(&self, key: &str) -> Option<MotionValue> {
        let key = crate::style::canonical_key(key);
        self.cell
            .state
            .borrow()
            .values
            .get(&key)
            .map(|e| e.value.clone())
    }

    /// Current value of every animated property.
    pub fn values(&self) -> BTreeMap<String, Value> {
        current_values(&self.cell.state.borrow())
    }

    /// Layer currently owning `key`.
    pub fn owner_of(&self, key: &str) -> Option<LayerType> {
        let key = crate::style::canonical_key(key);
        self.cell.state.borrow().owners.get(&key).map(|o| o.layer)
    }

    /// Keys with an animation in flight.
    pub fn running_keys(&self) -> Vec<String> {
        self.cell.state.borrow().running.keys().cloned().collect()
    }

    pub fn layout_node(&self) -> Option<LayoutNodeId> {
        self.cell.state.borrow().layout_node
    }

    pub fn parent(&self) -> Option<MotionNode> {
        self.cell
            .state
            .borrow()
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|cell| MotionNode { cell })
    }

    pub fn children(&self) -> Vec<MotionNode> {
        live_children(&self.cell)
    }

    pub fn ptr_eq(&self, other: &MotionNode) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    /// Replace the node's props and reconcile. A change in
    /// `layout_dependencies` snapshots the layout first, so call this
    /// before the host applies the matching layout change.
    pub fn set_props(&self, props: MotionProps) -> Result<()> {
        let (dependencies_changed, layout_changed, style_updates) = {
            let mut state = self.cell.state.borrow_mut();
            if !state.mounted {
                return Err(MotionError::NodeUnmounted(self.id()));
            }
            let dependencies_changed =
                state.props.layout_dependencies != props.layout_dependencies;
            let layout_changed = state.props.layout != props.layout
                || state.props.layout_id != props.layout_id
                || state.props.layout_transition() != props.layout_transition();
            let style_updates: Vec<(MotionValue, Value)> = props
                .style
                .iter()
                .filter(|(key, value)| state.props.style.get(*key) != Some(*value))
                .filter(|(key, _)| !state.owners.contains_key(*key))
                .filter_map(|(key, value)| {
                    state.values.get(key).map(|e| (e.value.clone(), value.clone()))
                })
                .collect();
            state.props = props;
            (dependencies_changed, layout_changed, style_updates)
        };

        if dependencies_changed {
            trace!(node = %self.id(), "layout dependencies changed");
            self.cell.ctx.projection.schedule_update();
        }
        if layout_changed {
            self.sync_layout()?;
        }
        for (value, style) in style_updates {
            value.set(style);
        }
        self.seed_values();
        self.reconcile();
        Ok(())
    }

    /// Report a gesture flag from the host's gesture layer.
    pub fn set_gesture(&self, layer: LayerType, active: bool) -> Result<()> {
        let changed = {
            let mut state = self.cell.state.borrow_mut();
            if !state.mounted {
                return Err(MotionError::NodeUnmounted(self.id()));
            }
            state.gestures.set(layer, active)
        };
        if changed {
            trace!(node = %self.id(), %layer, active, "gesture changed");
            self.reconcile();
        }
        Ok(())
    }

    /// Replace every gesture flag at once.
    pub fn set_gestures(&self, gestures: GestureState) -> Result<()> {
        let changed = {
            let mut state = self.cell.state.borrow_mut();
            if !state.mounted {
                return Err(MotionError::NodeUnmounted(self.id()));
            }
            std::mem::replace(&mut state.gestures, gestures) != gestures
        };
        if changed {
            self.reconcile();
        }
        Ok(())
    }

    /// Attach nested exit work that must finish before this node's exit
    /// completes.
    pub fn add_exit_participant(&self, participant: Rc<dyn ExitParticipant>) {
        self.cell
            .state
            .borrow_mut()
            .exit
            .participants
            .push(participant);
    }

    /// Start exiting this node and its subtree.
    ///
    /// Returns a completion that settles `Finished` once every exit
    /// animation in the subtree (and of attached participants) has settled,
    /// or `None` when nothing has exit work, in which case the node can be
    /// removed right away. The completion is armed on the next microtask so
    /// work registered late in this turn is still waited for.
    pub fn begin_exit(&self) -> Option<Completion> {
        let cycle = {
            let mut state = self.cell.state.borrow_mut();
            if !state.mounted {
                return None;
            }
            state.exit.exiting = true;
            state.exit.cycle += 1;
            if let Some(previous) = state.exit.handoff.take() {
                previous.settle(Outcome::Cancelled);
            }
            state.exit.cycle
        };
        self.reconcile();

        let participant_work: Vec<Completion> = collect_participants(&self.cell)
            .iter()
            .filter_map(|p| p.begin_exit())
            .collect();
        if participant_work.is_empty() && exit_runs(&self.cell).is_empty() {
            debug!(node = %self.id(), "no exit animation");
            return None;
        }

        let handoff = Completion::new();
        self.cell.state.borrow_mut().exit.handoff = Some(handoff.clone());
        debug!(node = %self.id(), cycle, "exit armed");

        let weak = Rc::downgrade(&self.cell);
        let scheduler = self.cell.ctx.scheduler.clone();
        self.cell.ctx.scheduler.queue_microtask(move || {
            let Some(cell) = weak.upgrade() else {
                return;
            };
            if cell.state.borrow().exit.cycle != cycle {
                return;
            }
            let mut work = exit_runs(&cell);
            work.extend(participant_work);
            let weak = Rc::downgrade(&cell);
            Completion::all_settled(work).on_settled(move |_| {
                scheduler.queue_microtask(move || {
                    let Some(cell) = weak.upgrade() else {
                        return;
                    };
                    let handoff = {
                        let mut state = cell.state.borrow_mut();
                        if state.exit.cycle != cycle {
                            trace!(node = %cell.id, cycle, "stale exit completion ignored");
                            return;
                        }
                        state.exit.handoff.take()
                    };
                    if let Some(handoff) = handoff {
                        debug!(node = %cell.id, cycle, "exit complete");
                        handoff.settle(Outcome::Finished);
                    }
                });
            });
        });
        Some(handoff)
    }

    /// Abort an exit in progress; the node animates back to its other
    /// layers and any pending exit completion is cancelled.
    pub fn cancel_exit(&self) {
        let handoff = {
            let mut state = self.cell.state.borrow_mut();
            if !state.exit.exiting {
                return;
            }
            state.exit.exiting = false;
            state.exit.cycle += 1;
            state.exit.handoff.take()
        };
        debug!(node = %self.id(), "exit cancelled");
        if let Some(handoff) = handoff {
            handoff.settle(Outcome::Cancelled);
        }
        self.reconcile();
        for participant in collect_participants(&self.cell) {
            participant.cancel_exit();
        }
    }

    /// Stop everything and detach from the parent and the projection tree.
    /// Children are unmounted with their parent.
    pub fn unmount(&self) {
        for child in self.children() {
            child.unmount();
        }
        let (running, values, runs, contexts, layout_node, handoff, parent) = {
            let mut state = self.cell.state.borrow_mut();
            if !state.mounted {
                return;
            }
            state.mounted = false;
            let running = std::mem::take(&mut state.running);
            let values = std::mem::take(&mut state.values);
            let runs: Vec<LayerRun> = state.runs.iter_mut().filter_map(Option::take).collect();
            let contexts: Vec<_> = state
                .orchestration
                .iter_mut()
                .filter_map(Option::take)
                .collect();
            (
                running,
                values,
                runs,
                contexts,
                state.layout_node.take(),
                state.exit.handoff.take(),
                state.parent.take(),
            )
        };

        for (_, animation) in running {
            animation.controls.stop();
        }
        for (_, entry) in values {
            entry.subscription.unsubscribe();
        }
        for run in runs {
            run.cancel();
        }
        for ctx in contexts {
            ctx.reset(Orchestration::default(), Completion::resolved());
        }
        if let Some(handoff) = handoff {
            handoff.settle(Outcome::Cancelled);
        }
        if let Some(id) = layout_node
            && let Err(err) = self.cell.ctx.projection.unregister(id)
        {
            warn!(node = %self.id(), %err, "layout node already gone");
        }
        if let Some(parent) = parent.and_then(|p| p.upgrade()) {
            parent
                .state
                .borrow_mut()
                .children
                .retain(|c| c.upgrade().is_some_and(|c| !Rc::ptr_eq(&c, &self.cell)));
        }
        debug!(node = %self.id(), "motion node unmounted");
    }

    /// Re-resolve every layer, restart the keys whose owner or keyframes
    /// changed, then reconcile the children.
    pub fn reconcile(&self) {
        if !self.is_mounted() {
            return;
        }
        let layers = effective_layers(&self.cell);
        let scope = variant_scope(&self.cell);
        let parent_contexts = self.parent_contexts();
        let plan = self.plan(&layers, &scope, &parent_contexts);
        self.execute(plan);
        for child in self.children() {
            child.reconcile();
        }
    }

    fn parent_contexts(&self) -> [Option<Rc<OrchestrationContext>>; LAYERS] {
        match self.parent() {
            Some(parent) => {
                let state = parent.cell.state.borrow();
                std::array::from_fn(|i| {
                    state.runs[i]
                        .as_ref()
                        .and(state.orchestration[i].clone())
                })
            }
            None => Default::default(),
        }
    }

    fn plan(
        &self,
        layers: &[LayerInput; LAYERS],
        scope: &VariantScope,
        parent_contexts: &[Option<Rc<OrchestrationContext>>; LAYERS],
    ) -> ReconcilePlan {
        let mut guard = self.cell.state.borrow_mut();
        let state = &mut *guard;
        let settings = self.cell.ctx.settings.clone();
        let mut plan = ReconcilePlan::default();

        let mut targets: [Option<AnimationTarget>; LAYERS] = {
            let current = current_values(state);
            let velocity: BTreeMap<String, f64> = state
                .values
                .iter()
                .map(|(k, e)| (k.clone(), e.value.velocity()))
                .collect();
            let input = ResolveInput {
                custom: &state.props.custom,
                current: &current,
                velocity: &velocity,
            };
            std::array::from_fn(|i| {
                let layer = &layers[i];
                let definition = layer.definition.as_ref().filter(|_| layer.active)?;
                resolve(definition, scope, state.props.inherit, &input)
            })
        };

        for layer in LayerType::ALL {
            let i = layer.index();
            let keep = layers[i].active && (targets[i].is_some() || layer == LayerType::Base);
            if !keep {
                state.resolved[i] = None;
                if let Some(run) = state.runs[i].take() {
                    trace!(node = %self.cell.id, %layer, "layer run dropped");
                    plan.cancelled.push(run);
                }
            }
        }

        // Ownership: the highest active layer defining a key owns it; keys
        // nobody defines return to their base value.
        let mut keys: BTreeSet<String> = state.owners.keys().cloned().collect();
        for target in targets.iter().flatten() {
            keys.extend(target.values.keys().cloned());
        }
        let mut starts: [Vec<(String, Keyframes)>; LAYERS] = Default::default();
        for key in keys {
            let owner = LayerType::ALL.iter().rev().find_map(|layer| {
                targets[layer.index()]
                    .as_ref()
                    .and_then(|t| t.values.get(&key))
                    .map(|frames| (*layer, frames.clone()))
            });
            let (layer, frames) = match owner {
                Some(owner) => owner,
                None => match self.base_fallback(state, &targets, &key) {
                    Some(value) => (LayerType::Base, Keyframes::single(value)),
                    None => {
                        state.owners.remove(&key);
                        continue;
                    }
                },
            };
            let previous = state.owners.get(&key);
            let restart = previous
                .is_none_or(|p| p.layer != layer || !keyframes_equal(&p.keyframes, &frames));
            if !restart {
                continue;
            }
            let from_base = previous.is_none_or(|p| p.layer == LayerType::Base);
            if layer != LayerType::Base
                && from_base
                && let Some(entry) = state.values.get(&key)
            {
                state.base_cache.insert(key.clone(), entry.value.get());
            }
            starts[layer.index()].push((key, frames));
        }

        for layer in LayerType::ALL {
            let i = layer.index();
            let target = targets[i].take();
            let layer_starts = std::mem::take(&mut starts[i]);
            let changed = target.is_some() && state.resolved[i] != target;
            if !changed && layer_starts.is_empty() {
                continue;
            }

            state.next_run_id += 1;
            let run_id = state.next_run_id;
            if let Some(previous) = state.runs[i].take() {
                plan.cancelled.push(previous);
            }
            let target = target.unwrap_or_default();
            let done = Completion::new();

            // Parent side of orchestration.
            let mut after_children = None;
            let orchestration = target
                .transition
                .as_ref()
                .and_then(|t| t.orchestration.clone());
            match orchestration {
                Some(options) => {
                    let gate = if options.when == When::BeforeChildren {
                        done.clone()
                    } else {
                        Completion::resolved()
                    };
                    let after = options.when == When::AfterChildren;
                    let ctx = match &state.orchestration[i] {
                        Some(ctx) => {
                            ctx.reset(options, gate);
                            ctx.clone()
                        }
                        None => {
                            let ctx = OrchestrationContext::new(options, gate);
                            state.orchestration[i] = Some(ctx.clone());
                            ctx
                        }
                    };
                    ctx.set_expected(participating_children(&state.children, layer));
                    if after {
                        after_children = Some(ctx);
                    }
                }
                None => {
                    if let Some(ctx) = state.orchestration[i].take() {
                        ctx.reset(Orchestration::default(), Completion::resolved());
                    }
                }
            }

            // Child side: register with the parent's context for this layer.
            let mut wait = None;
            let mut child_delay = 0.0;
            let mut ticket = None;
            let mut stagger = None;
            if layers[i].from_parent
                && let Some(ctx) = &parent_contexts[i]
            {
                let registered = ctx.register_child();
                if ctx.delay_depends_on_total() {
                    stagger = Some((ctx.clone(), registered));
                } else {
                    child_delay = ctx.child_delay(registered);
                }
                let gate = ctx.gate();
                if !gate.is_settled() {
                    wait = Some(gate);
                }
                ticket = Some((ctx.clone(), registered));
            }

            let mut key_starts = Vec::with_capacity(layer_starts.len());
            for (key, frames) in layer_starts {
                let mut spec = spec_for(
                    target.transition.as_ref(),
                    state.props.transition.as_ref(),
                    &key,
                    settings.default_transition,
                );
                spec.delay_ms += child_delay;
                let value = self.ensure_value(state, &key, first_keyframe(&frames));
                state.owners.insert(
                    key.clone(),
                    KeyOwner {
                        layer,
                        keyframes: frames.clone(),
                        run_id,
                    },
                );
                key_starts.push(KeyStart {
                    key,
                    value,
                    keyframes: frames,
                    spec,
                });
            }

            debug!(
                node = %self.cell.id,
                %layer,
                run_id,
                keys = key_starts.len(),
                "layer run started"
            );
            state.runs[i] = Some(LayerRun {
                id: run_id,
                done,
                transition_end: target.transition_end.clone(),
                ticket,
            });
            if changed {
                state.resolved[i] = Some(target);
            }
            plan.events.push(MotionEvent::AnimationStart {
                node: self.cell.id,
                layer,
            });
            plan.launches.push(Launch {
                layer,
                run_id,
                starts: key_starts,
                wait,
                after_children,
                stagger,
            });
        }

        // Animations whose key lost every owner stay where they are.
        let orphaned: Vec<String> = state
            .running
            .keys()
            .filter(|k| !state.owners.contains_key(*k))
            .cloned()
            .collect();
        for key in orphaned {
            if let Some(animation) = state.running.remove(&key) {
                plan.stopped.push(animation.controls);
            }
        }
        plan
    }

    /// Rest value for a key no active layer defines: the `animate` target,
    /// then the initial target, then the value cached when a gesture took
    /// the key over, then whatever the element currently shows.
    fn base_fallback(
        &self,
        state: &mut NodeState,
        targets: &[Option<AnimationTarget>; LAYERS],
        key: &str,
    ) -> Option<Value> {
        let base = targets[LayerType::Base.index()]
            .as_ref()
            .and_then(|t| t.values.get(key))
            .and_then(last_keyframe)
            .cloned();
        let initial = || {
            state
                .initial_target
                .as_ref()
                .and_then(|t| t.values.get(key))
                .and_then(last_keyframe)
                .cloned()
        };
        if let Some(value) = base.or_else(initial) {
            return Some(value);
        }
        if let Some(value) = state.base_cache.get(key) {
            return Some(value.clone());
        }
        let read = state
            .props
            .style
            .get(key)
            .cloned()
            .or_else(|| read_current(self.cell.element.as_ref(), key))?;
        state.base_cache.insert(key.to_string(), read.clone());
        Some(read)
    }

    fn execute(&self, plan: ReconcilePlan) {
        for run in plan.cancelled {
            run.cancel();
        }
        for controls in plan.stopped {
            controls.stop();
        }
        {
            let mut events = self.cell.ctx.events.borrow_mut();
            for event in plan.events {
                events.push(event);
            }
        }
        for launch in plan.launches {
            schedule_launch(&self.cell, launch);
        }
    }

    fn ensure_value(&self, state: &mut NodeState, key: &str, fallback: Option<&Value>) -> MotionValue {
        if let Some(entry) = state.values.get(key) {
            return entry.value.clone();
        }
        let initial = state
            .initial_target
            .as_ref()
            .and_then(|t| t.values.get(key))
            .and_then(last_keyframe)
            .cloned()
            .or_else(|| state.props.style.get(key).cloned())
            .or_else(|| read_current(self.cell.element.as_ref(), key))
            .or_else(|| fallback.cloned())
            .unwrap_or(Value::Number(0.0));
        let value = MotionValue::new(initial);
        let weak = Rc::downgrade(&self.cell);
        let subscription = value.on_change(move |_| {
            if let Some(cell) = weak.upgrade() {
                request_render(&cell);
            }
        });
        state.values.insert(
            key.to_string(),
            ValueEntry {
                value: value.clone(),
                subscription,
            },
        );
        value
    }

    /// Create values for static styles and the initial state. With
    /// `initial` disabled, values start at the `animate` target and the
    /// base layer is recorded as already there.
    fn seed_values(&self) {
        let layers = effective_layers(&self.cell);
        let scope = variant_scope(&self.cell);
        let mut guard = self.cell.state.borrow_mut();
        let state = &mut *guard;

        let style: Vec<String> = state.props.style.keys().cloned().collect();
        for key in style {
            self.ensure_value(state, &key, None);
        }
        if state.seeded {
            return;
        }
        state.seeded = true;

        let empty = BTreeMap::new();
        let velocity = BTreeMap::new();
        let input = ResolveInput {
            custom: &state.props.custom,
            current: &empty,
            velocity: &velocity,
        };
        let base = layers[LayerType::Base.index()]
            .definition
            .as_ref()
            .and_then(|d| resolve(d, &scope, state.props.inherit, &input));
        match state.initial.clone() {
            Some(Initial::Disabled) => {
                let Some(base) = base.clone() else {
                    return;
                };
                for (key, frames) in &base.values {
                    let Some(last) = last_keyframe(frames).cloned() else {
                        continue;
                    };
                    let value = self.ensure_value(state, key, Some(&last));
                    value.set(last);
                    state.owners.insert(
                        key.clone(),
                        KeyOwner {
                            layer: LayerType::Base,
                            keyframes: frames.clone(),
                            run_id: 0,
                        },
                    );
                }
                for (key, end) in &base.transition_end {
                    let value = self.ensure_value(state, key, Some(end));
                    value.set(end.clone());
                }
                state.initial_target = Some(base.clone());
                state.resolved[LayerType::Base.index()] = Some(base);
            }
            Some(Initial::Definition(definition)) => {
                state.initial_target = resolve(&definition, &scope, state.props.inherit, &input);
                let keys: Vec<(String, Value)> = state
                    .initial_target
                    .iter()
                    .flat_map(|t| t.values.iter())
                    .filter_map(|(k, f)| Some((k.clone(), last_keyframe(f)?.clone())))
                    .collect();
                for (key, initial) in keys {
                    self.ensure_value(state, &key, Some(&initial));
                }
            }
            None => {}
        }
        if let Some(base) = &base {
            for (key, frames) in &base.values {
                self.ensure_value(state, key, first_keyframe(frames));
            }
        }
    }

    fn register_layout(&self) {
        let (enabled, options) = {
            let state = self.cell.state.borrow();
            (
                state.props.layout_enabled() && state.layout_node.is_none(),
                layout_options(&state.props),
            )
        };
        if !enabled {
            return;
        }
        let parent = nearest_layout_ancestor(&self.cell);
        let sink: Rc<dyn ProjectionSink> = Rc::new(NodeSink {
            cell: Rc::downgrade(&self.cell),
        });
        let id = self.cell.ctx.projection.register(
            self.cell.element.clone(),
            parent,
            options,
            sink,
            self.cell.id,
        );
        self.cell.state.borrow_mut().layout_node = Some(id);
    }

    fn sync_layout(&self) -> Result<()> {
        let (enabled, current, options) = {
            let state = self.cell.state.borrow();
            (
                state.props.layout_enabled(),
                state.layout_node,
                layout_options(&state.props),
            )
        };
        match (enabled, current) {
            (true, None) => self.register_layout(),
            (true, Some(id)) => self.cell.ctx.projection.set_options(id, options)?,
            (false, Some(id)) => {
                self.cell.state.borrow_mut().layout_node = None;
                self.cell.ctx.projection.unregister(id)?;
                self.cell.state.borrow_mut().projection = ProjectionOutput::default();
                request_render(&self.cell);
            }
            (false, None) => {}
        }
        Ok(())
    }

    /// Write the current values to the element. Transform shorthands are
    /// combined with the projection transform; radius and shadow are
    /// corrected while the projection scales the element.
    pub fn render(&self) {
        self.cell.render_pending.set(false);
        let (writes, mut writer) = {
            let mut state = self.cell.state.borrow_mut();
            if !state.mounted {
                return;
            }
            let correction = state.projection.correction;
            let mut motion = BTreeMap::new();
            let mut writes: Vec<(String, Option<String>)> = Vec::new();
            for (key, entry) in &state.values {
                let value = entry.value.get();
                if is_transform_key(key) {
                    motion.insert(key.clone(), value);
                    continue;
                }
                let css = css_value(key, &value);
                let css = match &correction {
                    Some(ctx) if is_scale_corrected(key) => correct(key, &css, ctx).unwrap_or(css),
                    _ => css,
                };
                writes.push((key.clone(), Some(css)));
            }
            let motion_transform = build_motion_transform(&motion);
            let transform = compose(
                state.projection.transform.as_deref(),
                motion_transform.as_deref(),
            );
            writes.push(("transform".to_string(), transform));
            (writes, std::mem::take(&mut state.writer))
        };

        let element = self.cell.element.as_ref();
        for (name, value) in &writes {
            writer.write(element, name, value.as_deref());
        }
        self.cell.state.borrow_mut().writer = writer;
    }
}

impl fmt::Debug for MotionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotionNode")
            .field("id", &self.cell.id)
            .finish()
    }
}

struct NodeSink {
    cell: Weak<NodeCell>,
}

impl ProjectionSink for NodeSink {
    fn apply_projection(&self, output: &ProjectionOutput) {
        if let Some(cell) = self.cell.upgrade() {
            cell.state.borrow_mut().projection = output.clone();
            request_render(&cell);
        }
    }
}

fn request_render(cell: &Rc<NodeCell>) {
    if cell.render_pending.replace(true) {
        return;
    }
    let weak = Rc::downgrade(cell);
    cell.ctx.scheduler.request_frame(move || {
        if let Some(cell) = weak.upgrade() {
            MotionNode { cell }.render();
        }
    });
}

/// Start a launch now, or once its gates open. Continuations only hold
/// the node weakly and hop through a microtask.
fn schedule_launch(cell: &Rc<NodeCell>, mut launch: Launch) {
    if let Some(gate) = launch.wait.take() {
        let weak = Rc::downgrade(cell);
        let scheduler = cell.ctx.scheduler.clone();
        gate.on_settled(move |_| {
            scheduler.queue_microtask(move || {
                if let Some(cell) = weak.upgrade() {
                    schedule_launch(&cell, launch);
                }
            });
        });
        return;
    }
    if let Some(ctx) = launch.after_children.take() {
        let weak = Rc::downgrade(cell);
        let scheduler = cell.ctx.scheduler.clone();
        // Let children reconciled in this turn register first.
        cell.ctx.scheduler.queue_microtask(move || {
            ctx.children_complete().on_settled(move |_| {
                scheduler.queue_microtask(move || {
                    if let Some(cell) = weak.upgrade() {
                        schedule_launch(&cell, launch);
                    }
                });
            });
        });
        return;
    }
    if let Some((ctx, ticket)) = launch.stagger.take() {
        let weak = Rc::downgrade(cell);
        // Siblings mounted in this turn register before the total is read.
        cell.ctx.scheduler.queue_microtask(move || {
            let mut launch = launch;
            let delay = ctx.child_delay(ticket);
            for start in &mut launch.starts {
                start.spec.delay_ms += delay;
            }
            if let Some(cell) = weak.upgrade() {
                schedule_launch(&cell, launch);
            }
        });
        return;
    }
    launch_now(cell, launch);
}

fn launch_now(cell: &Rc<NodeCell>, launch: Launch) {
    let Launch {
        layer,
        run_id,
        starts,
        ..
    } = launch;

    let (stopped, starts) = {
        let mut state = cell.state.borrow_mut();
        let current = state.mounted
            && state.runs[layer.index()]
                .as_ref()
                .is_some_and(|run| run.id == run_id);
        if !current {
            trace!(node = %cell.id, %layer, run_id, "superseded launch skipped");
            return;
        }
        let starts: Vec<KeyStart> = starts
            .into_iter()
            .filter(|start| {
                state
                    .owners
                    .get(&start.key)
                    .is_some_and(|o| o.run_id == run_id)
            })
            .collect();
        let stopped: Vec<Controls> = starts
            .iter()
            .filter_map(|start| state.running.remove(&start.key))
            .map(|animation| animation.controls)
            .collect();
        (stopped, starts)
    };

    for controls in stopped {
        controls.stop();
    }

    let mut finishes = Vec::with_capacity(starts.len());
    for start in starts {
        let KeyStart {
            key,
            value,
            keyframes,
            spec,
        } = start;
        let controls = cell.ctx.driver.animate(AnimationRequest {
            key: key.clone(),
            value,
            keyframes,
            spec,
        });
        finishes.push(controls.finished.clone());
        if !controls.finished.is_settled() {
            cell.state
                .borrow_mut()
                .running
                .insert(key, RunningAnimation { run_id, controls });
        }
    }

    let weak = Rc::downgrade(cell);
    let scheduler = cell.ctx.scheduler.clone();
    Completion::all_settled(finishes).on_settled(move |_| {
        scheduler.queue_microtask(move || {
            if let Some(cell) = weak.upgrade() {
                finish_run(&cell, layer, run_id);
            }
        });
    });
}

/// Every key of a run settled: apply `transitionEnd` for the keys the
/// layer still owns, report completion, and release orchestration.
fn finish_run(cell: &Rc<NodeCell>, layer: LayerType, run_id: u64) {
    let node = MotionNode { cell: cell.clone() };
    let (run, ends) = {
        let mut guard = cell.state.borrow_mut();
        let state = &mut *guard;
        let current = state.runs[layer.index()]
            .as_ref()
            .is_some_and(|run| run.id == run_id);
        if !current {
            return;
        }
        let Some(run) = state.runs[layer.index()].take() else {
            return;
        };
        state
            .running
            .retain(|_, animation| animation.run_id != run_id || !animation.controls.finished.is_settled());
        let owned: Vec<(String, Value)> = run
            .transition_end
            .iter()
            .filter(|(key, _)| state.owners.get(*key).is_none_or(|o| o.layer == layer))
            .map(|(key, end)| (key.clone(), end.clone()))
            .collect();
        let ends: Vec<(MotionValue, Value)> = owned
            .into_iter()
            .map(|(key, end)| (node.ensure_value(state, &key, Some(&end)), end))
            .collect();
        (run, ends)
    };

    for (value, end) in ends {
        value.set(end);
    }
    debug!(node = %cell.id, %layer, run_id, "layer run complete");
    cell.ctx.emit(MotionEvent::AnimationComplete {
        node: cell.id,
        layer,
    });
    if let Some((ctx, ticket)) = &run.ticket {
        ctx.child_completed(*ticket);
    }
    run.done.settle(Outcome::Finished);
}

fn live_children(cell: &NodeCell) -> Vec<MotionNode> {
    cell.state
        .borrow()
        .children
        .iter()
        .filter_map(Weak::upgrade)
        .map(|cell| MotionNode { cell })
        .collect()
}

fn parent_cell(cell: &NodeCell) -> Option<Rc<NodeCell>> {
    cell.state.borrow().parent.as_ref().and_then(Weak::upgrade)
}

/// Layer definitions and activity after inheritance from the ancestors.
fn effective_layers(cell: &NodeCell) -> [LayerInput; LAYERS] {
    let parent_layers = parent_cell(cell).map(|p| effective_layers(&p));
    let state = cell.state.borrow();
    std::array::from_fn(|i| {
        let layer = LayerType::ALL[i];
        let parent = parent_layers.as_ref().map(|p| &p[i]);
        let own = state.props.definition(layer).cloned();
        let inherited = match (&own, parent) {
            (None, Some(parent)) if state.props.inherit => parent
                .definition
                .clone()
                .filter(Definition::is_label),
            _ => None,
        };
        let from_parent = inherited.is_some();
        let parent_active = parent.is_some_and(|p| p.active);
        let active = match layer {
            LayerType::Base => true,
            LayerType::Exit => state.exit.exiting || parent_active,
            gesture => state.gestures.is_active(gesture) || (state.props.inherit && parent_active),
        };
        LayerInput {
            definition: own.or(inherited),
            active,
            from_parent,
        }
    })
}

fn variant_scope(cell: &NodeCell) -> Rc<VariantScope> {
    let variants = cell.state.borrow().props.variants.clone();
    match parent_cell(cell) {
        Some(parent) => VariantScope::child(&variant_scope(&parent), variants),
        None => VariantScope::root(variants),
    }
}

fn nearest_layout_ancestor(cell: &NodeCell) -> Option<LayoutNodeId> {
    let mut cursor = parent_cell(cell);
    while let Some(current) = cursor {
        if let Some(id) = current.state.borrow().layout_node {
            return Some(id);
        }
        cursor = parent_cell(&current);
    }
    None
}

/// Completions of the exit runs in a subtree.
fn exit_runs(cell: &NodeCell) -> Vec<Completion> {
    let mut work: Vec<Completion> = cell.state.borrow().runs[LayerType::Exit.index()]
        .iter()
        .map(|run| run.done.clone())
        .collect();
    for child in live_children(cell) {
        work.extend(exit_runs(&child.cell));
    }
    work
}

fn collect_participants(cell: &NodeCell) -> Vec<Rc<dyn ExitParticipant>> {
    let mut participants = cell.state.borrow().exit.participants.clone();
    for child in live_children(cell) {
        participants.extend(collect_participants(&child.cell));
    }
    participants
}

/// Children that follow this node's definition for `layer`.
fn participating_children(children: &[Weak<NodeCell>], layer: LayerType) -> usize {
    children
        .iter()
        .filter_map(Weak::upgrade)
        .filter(|child| {
            child.state.try_borrow().is_ok_and(|state| {
                state.mounted && state.props.inherit && state.props.definition(layer).is_none()
            })
        })
        .count()
}

fn current_values(state: &NodeState) -> BTreeMap<String, Value> {
    state
        .values
        .iter()
        .map(|(k, e)| (k.clone(), e.value.get()))
        .collect()
}

fn layout_options(props: &MotionProps) -> LayoutOptions {
    LayoutOptions {
        mode: props.layout,
        layout_id: props.layout_id.clone(),
        transition: props.layout_transition(),
    }
}

/// Spec for `key`: the target's transition, then the node's, then the
/// configured default.
fn spec_for(
    target: Option<&Transition>,
    node: Option<&Transition>,
    key: &str,
    default: TransitionSpec,
) -> TransitionSpec {
    let fallback = node.map_or(default, |t| t.spec_for(key, default));
    target.map_or(fallback, |t| t.spec_for(key, fallback))
}

/// What the element shows for `key` before anything animated it.
fn read_current(element: &dyn ElementHandle, key: &str) -> Option<Value> {
    if is_transform_key(key) {
        return Some(Value::Number(transform_identity(key)));
    }
    let raw = element.read_style(key)?;
    Some(match split_unit(&raw) {
        Some((n, "")) => Value::Number(n),
        _ => Value::Text(raw),
    })
}
