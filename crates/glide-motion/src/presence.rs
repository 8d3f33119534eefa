//! Deferred removal of exiting children.
//!
//! A [`PresenceGroup`] tracks keyed children the host renders. When a key
//! disappears from the rendered set its node starts exiting and stays
//! mounted until the exit settles, a safety timeout fires, or right away
//! if it has no exit animation at all.
//!
//! Removal ordering follows [`PresenceMode`]:
//! - `Sync`: entering and exiting children coexist
//! - `Wait`: new children are held back until every exit has finished
//! - `PopLayout`: exiting children are taken out of flow with absolute
//!   positioning so their siblings reflow at once

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

use crate::completion::{Completion, Outcome};
use crate::context::MotionContext;
use crate::error::{MotionError, Result};
use crate::events::MotionEvent;
use crate::geometry::LayoutBox;
use crate::host::ElementHandle;
use crate::reconciler::{ExitParticipant, MotionNode};
use crate::scheduler::TimerId;
use crate::style::format_number;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceMode {
    #[default]
    Sync,
    Wait,
    PopLayout,
}

/// Root styles overridden while popped children exit.
const ROOT_STYLES: [&str; 3] = ["position", "min-width", "min-height"];

/// Child styles written when an exiting child is popped out of flow.
const POPPED_STYLES: [&str; 5] = ["position", "top", "left", "width", "height"];

struct RootEntry {
    element: Rc<dyn ElementHandle>,
    count: usize,
    saved: Vec<(&'static str, Option<String>)>,
}

/// Per-root bookkeeping for popLayout exits, shared by every group of a
/// runtime.
///
/// The first concurrent exit under a root saves the root's position and
/// minimum size and pins them; the last one to finish restores them.
/// Releasing a root with no outstanding exits does nothing, so a root is
/// never restored twice.
#[derive(Clone, Default)]
pub struct PopLayoutRoots {
    entries: Rc<RefCell<HashMap<usize, RootEntry>>>,
}

fn px(n: f64) -> String {
    format!("{}px", format_number(n))
}

fn root_key(root: &Rc<dyn ElementHandle>) -> usize {
    Rc::as_ptr(root) as *const () as usize
}

impl PopLayoutRoots {
    pub fn acquire(&self, root: &Rc<dyn ElementHandle>) {
        let key = root_key(root);
        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.get_mut(&key) {
            entry.count += 1;
            trace!(count = entry.count, "pop layout root shared");
            return;
        }
        let saved: Vec<_> = ROOT_STYLES
            .iter()
            .map(|name| (*name, root.read_style(name)))
            .collect();
        let size = root.measure();
        let position = saved[0].1.as_deref().unwrap_or("static");
        if position == "static" {
            root.set_style("position", Some("relative"));
        }
        root.set_style("min-width", Some(px(size.width()).as_str()));
        root.set_style("min-height", Some(px(size.height()).as_str()));
        debug!("pop layout root pinned");
        entries.insert(
            key,
            RootEntry {
                element: root.clone(),
                count: 1,
                saved,
            },
        );
    }

    /// Returns true when this release restored the root.
    pub fn release(&self, root: &Rc<dyn ElementHandle>) -> bool {
        let key = root_key(root);
        let restored = {
            let mut entries = self.entries.borrow_mut();
            let Some(entry) = entries.get_mut(&key) else {
                return false;
            };
            entry.count = entry.count.saturating_sub(1);
            if entry.count > 0 {
                return false;
            }
            entries.remove(&key)
        };
        match restored {
            Some(entry) => {
                for (name, value) in &entry.saved {
                    entry.element.set_style(name, value.as_deref());
                }
                debug!("pop layout root restored");
                true
            }
            None => false,
        }
    }

    /// Exits currently holding `root`.
    pub fn count(&self, root: &Rc<dyn ElementHandle>) -> usize {
        self.entries
            .borrow()
            .get(&root_key(root))
            .map_or(0, |e| e.count)
    }
}

/// An exiting child taken out of flow, with the inline styles it had
/// before.
struct PoppedChild {
    element: Rc<dyn ElementHandle>,
    saved: Vec<(&'static str, Option<String>)>,
    root: Option<Rc<dyn ElementHandle>>,
}

impl PoppedChild {
    fn restore(&self) {
        for (name, value) in &self.saved {
            self.element.set_style(name, value.as_deref());
        }
    }
}

struct PendingExit {
    token: u64,
    timer: Option<TimerId>,
    popped: Option<PoppedChild>,
}

type RemoveCallback = Rc<dyn Fn(&str)>;

#[derive(Default)]
struct PresenceState {
    nodes: HashMap<String, MotionNode>,
    rendered: Vec<String>,
    pending: HashMap<String, PendingExit>,
    queued: Option<Vec<String>>,
    propagate: bool,
    pop_root: Option<Rc<dyn ElementHandle>>,
    on_remove: Vec<RemoveCallback>,
    next_token: u64,
}

struct PresenceInner {
    ctx: MotionContext,
    mode: PresenceMode,
    state: RefCell<PresenceState>,
}

/// Keyed children whose removal waits for their exit animations.
#[derive(Clone)]
pub struct PresenceGroup {
    inner: Rc<PresenceInner>,
}

impl PresenceGroup {
    pub(crate) fn new(ctx: MotionContext, mode: PresenceMode) -> Self {
        Self {
            inner: Rc::new(PresenceInner {
                ctx,
                mode,
                state: RefCell::new(PresenceState::default()),
            }),
        }
    }

    fn upgrade(weak: &Weak<PresenceInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn mode(&self) -> PresenceMode {
        self.inner.mode
    }

    /// Let an exiting ancestor run this group's exits before the subtree
    /// is detached.
    pub fn with_propagate(self, propagate: bool) -> Self {
        self.inner.state.borrow_mut().propagate = propagate;
        self
    }

    /// Element popped children are positioned against.
    pub fn set_pop_layout_root(&self, root: Rc<dyn ElementHandle>) {
        self.inner.state.borrow_mut().pop_root = Some(root);
    }

    /// Called with the key of every child once it is really removed.
    pub fn on_remove(&self, callback: impl Fn(&str) + 'static) {
        self.inner
            .state
            .borrow_mut()
            .on_remove
            .push(Rc::new(callback));
    }

    /// Hand this group's exits to `owner`, so they run when `owner` exits.
    /// Only has an effect with `with_propagate(true)`.
    pub fn attach_to(&self, owner: &MotionNode) {
        owner.add_exit_participant(Rc::new(self.clone()));
    }

    /// Associate a mounted node with `key`.
    pub fn register_node(&self, key: &str, node: MotionNode) -> Result<()> {
        let mut state = self.inner.state.borrow_mut();
        if state
            .nodes
            .get(key)
            .is_some_and(|existing| existing.is_mounted() && !existing.ptr_eq(&node))
        {
            return Err(MotionError::DuplicatePresenceKey(key.to_string()));
        }
        state.nodes.insert(key.to_string(), node);
        Ok(())
    }

    pub fn node(&self, key: &str) -> Option<MotionNode> {
        self.inner.state.borrow().nodes.get(key).cloned()
    }

    /// Keys the host should show as present, in render order. Exiting
    /// children are not included; see [`PresenceGroup::exiting`].
    pub fn rendered(&self) -> Vec<String> {
        self.inner.state.borrow().rendered.clone()
    }

    /// Keys still mounted while they exit.
    pub fn exiting(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.state.borrow().pending.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn pending_exit_count(&self) -> usize {
        self.inner.state.borrow().pending.len()
    }

    /// Entrants held back in `Wait` mode.
    pub fn queued(&self) -> Option<Vec<String>> {
        self.inner.state.borrow().queued.clone()
    }

    /// Apply the host's new child list.
    pub fn render<S: AsRef<str>>(&self, keys: impl IntoIterator<Item = S>) {
        let next: Vec<String> = keys.into_iter().map(|k| k.as_ref().to_string()).collect();
        let (removed, returning) = {
            let state = self.inner.state.borrow();
            let removed: Vec<String> = state
                .rendered
                .iter()
                .filter(|k| !next.contains(*k) && !state.pending.contains_key(*k))
                .cloned()
                .collect();
            let returning: Vec<String> = next
                .iter()
                .filter(|k| state.pending.contains_key(*k))
                .cloned()
                .collect();
            (removed, returning)
        };

        for key in &returning {
            self.cancel_child_exit(key);
        }
        for key in &removed {
            self.start_exit(key);
        }

        let mut state = self.inner.state.borrow_mut();
        if self.inner.mode == PresenceMode::Wait && !state.pending.is_empty() {
            let staying: Vec<String> = state
                .rendered
                .iter()
                .filter(|k| next.contains(*k))
                .cloned()
                .collect();
            state.queued = if staying.len() < next.len() {
                trace!(queued = next.len(), "entrants held until exits finish");
                Some(next)
            } else {
                None
            };
            state.rendered = staying;
        } else {
            state.queued = None;
            state.rendered = next;
        }
    }

    fn cancel_child_exit(&self, key: &str) {
        let (pending, node) = {
            let mut state = self.inner.state.borrow_mut();
            (state.pending.remove(key), state.nodes.get(key).cloned())
        };
        let Some(pending) = pending else {
            return;
        };
        debug!(key, "exit cancelled by re-render");
        if let Some(timer) = pending.timer {
            self.inner.ctx.scheduler.clear_timeout(timer);
        }
        if let Some(popped) = &pending.popped {
            popped.restore();
            if let Some(root) = &popped.root {
                self.inner.ctx.pop_roots.release(root);
            }
        }
        if let Some(node) = node {
            node.cancel_exit();
        }
    }

    fn start_exit(&self, key: &str) {
        let node = self.inner.state.borrow().nodes.get(key).cloned();
        let Some(node) = node else {
            self.remove_now(key, false);
            return;
        };
        if self.inner.mode == PresenceMode::PopLayout {
            self.inner.ctx.projection.schedule_update();
        }
        let Some(completion) = node.begin_exit() else {
            debug!(key, "no exit animation, removing immediately");
            self.remove_now(key, false);
            return;
        };

        let popped = (self.inner.mode == PresenceMode::PopLayout).then(|| self.pop(&node));
        let token = {
            let mut state = self.inner.state.borrow_mut();
            state.next_token += 1;
            state.next_token
        };
        let weak = Rc::downgrade(&self.inner);
        let owned_key = key.to_string();
        let timer = self.inner.ctx.scheduler.set_timeout(
            self.inner.ctx.settings.exit_timeout_ms,
            move || {
                if let Some(group) = Self::upgrade(&weak) {
                    group.finish_exit(&owned_key, token, true);
                }
            },
        );
        self.inner.state.borrow_mut().pending.insert(
            key.to_string(),
            PendingExit {
                token,
                timer: Some(timer),
                popped,
            },
        );
        debug!(key, token, "exit pending");

        let weak = Rc::downgrade(&self.inner);
        let scheduler = self.inner.ctx.scheduler.clone();
        let owned_key = key.to_string();
        completion.on_settled(move |outcome| {
            if outcome != Outcome::Finished {
                return;
            }
            scheduler.queue_microtask(move || {
                if let Some(group) = Self::upgrade(&weak) {
                    group.finish_exit(&owned_key, token, false);
                }
            });
        });
    }

    /// Pin an exiting child in place with absolute positioning.
    fn pop(&self, node: &MotionNode) -> PoppedChild {
        let root = self.inner.state.borrow().pop_root.clone();
        let element = node.element();
        let saved = POPPED_STYLES
            .iter()
            .map(|name| (*name, element.read_style(name)))
            .collect();
        let layout = element.measure();
        let origin = root.as_ref().map_or(LayoutBox::default(), |r| r.measure());
        let (left, top) = layout.offset_from(&origin);
        element.set_style("position", Some("absolute"));
        element.set_style("top", Some(px(top).as_str()));
        element.set_style("left", Some(px(left).as_str()));
        element.set_style("width", Some(px(layout.width()).as_str()));
        element.set_style("height", Some(px(layout.height()).as_str()));
        trace!(node = %node.id(), left, top, "exiting child popped");
        if let Some(root) = &root {
            self.inner.ctx.pop_roots.acquire(root);
        }
        PoppedChild {
            element,
            saved,
            root,
        }
    }

    /// Release a pending exit. Stale tokens (an exit that was cancelled
    /// and restarted) are ignored.
    fn finish_exit(&self, key: &str, token: u64, forced: bool) {
        let pending = {
            let mut state = self.inner.state.borrow_mut();
            if !state.pending.get(key).is_some_and(|p| p.token == token) {
                return;
            }
            state.pending.remove(key)
        };
        let Some(pending) = pending else {
            return;
        };
        if forced {
            warn!(
                key,
                timeout_ms = self.inner.ctx.settings.exit_timeout_ms,
                "exit forced by safety timeout"
            );
        } else if let Some(timer) = pending.timer {
            self.inner.ctx.scheduler.clear_timeout(timer);
        }
        if let Some(root) = pending.popped.as_ref().and_then(|p| p.root.as_ref()) {
            self.inner.ctx.pop_roots.release(root);
        }
        self.remove_now(key, forced);
    }

    fn remove_now(&self, key: &str, forced: bool) {
        // Siblings animate into the space the child leaves behind.
        self.inner.ctx.projection.schedule_update();
        let (node, callbacks, flushed) = {
            let mut state = self.inner.state.borrow_mut();
            let node = state.nodes.remove(key);
            let flushed = if state.pending.is_empty() {
                state.queued.take()
            } else {
                None
            };
            if let Some(next) = &flushed {
                state.rendered = next.clone();
            }
            (node, state.on_remove.clone(), flushed)
        };
        if let Some(node) = node {
            node.unmount();
        }
        debug!(key, forced, "presence child removed");
        self.inner.ctx.emit(MotionEvent::ExitComplete {
            key: key.to_string(),
            forced,
        });
        for callback in callbacks {
            callback(key);
        }
        if let Some(next) = flushed {
            debug!(entrants = next.len(), "queued entrants released");
        }
    }
}

impl ExitParticipant for PresenceGroup {
    fn begin_exit(&self) -> Option<Completion> {
        let nodes: Vec<MotionNode> = {
            let state = self.inner.state.borrow();
            if !state.propagate {
                return None;
            }
            state
                .rendered
                .iter()
                .filter_map(|k| state.nodes.get(k).cloned())
                .collect()
        };
        let work: Vec<Completion> = nodes.iter().filter_map(MotionNode::begin_exit).collect();
        if work.is_empty() {
            None
        } else {
            Some(Completion::all_settled(work))
        }
    }

    fn cancel_exit(&self) {
        let nodes: Vec<MotionNode> = {
            let state = self.inner.state.borrow();
            if !state.propagate {
                return;
            }
            state.nodes.values().cloned().collect()
        };
        for node in nodes {
            node.cancel_exit();
        }
    }
}
