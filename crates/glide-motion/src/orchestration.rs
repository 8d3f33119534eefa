//! Parent/child animation sequencing.
//!
//! A parent whose active target carries orchestration options owns one
//! `OrchestrationContext` per layer. Children that inherit the parent's
//! variant for that layer register with it when their own run starts and
//! report back when it settles. The context provides:
//! - a stable registration index per child, used for stagger offsets
//! - a gate children wait on before starting (`beforeChildren`)
//! - a "children complete" signal the parent waits on (`afterChildren`)
//!
//! Registration and completion counts are tracked separately, so children
//! registering after the parent started waiting are still waited for, and
//! a parent with no children is released immediately.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::trace;

use crate::completion::{Completion, Outcome};
use crate::transition::{Orchestration, When};

/// A child's registration with one generation of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildTicket {
    pub index: usize,
    generation: u64,
}

#[derive(Debug)]
pub struct OrchestrationContext {
    options: RefCell<Orchestration>,
    generation: Cell<u64>,
    registered: Cell<usize>,
    completed: Cell<usize>,
    expected: Cell<usize>,
    gate: RefCell<Completion>,
    waiters: RefCell<Vec<Completion>>,
}

impl OrchestrationContext {
    /// `gate` is what children wait on before starting.
    pub fn new(options: Orchestration, gate: Completion) -> Rc<Self> {
        Rc::new(Self {
            options: RefCell::new(options),
            generation: Cell::new(0),
            registered: Cell::new(0),
            completed: Cell::new(0),
            expected: Cell::new(0),
            gate: RefCell::new(gate),
            waiters: RefCell::new(Vec::new()),
        })
    }

    /// Start over with new options: counts go back to zero, outstanding
    /// tickets become stale, and anyone still waiting is released.
    pub fn reset(&self, options: Orchestration, gate: Completion) {
        *self.options.borrow_mut() = options;
        *self.gate.borrow_mut() = gate;
        self.generation.set(self.generation.get() + 1);
        self.registered.set(0);
        self.completed.set(0);
        self.expected.set(0);
        let waiters = std::mem::take(&mut *self.waiters.borrow_mut());
        for waiter in waiters {
            waiter.settle(Outcome::Cancelled);
        }
    }

    pub fn options(&self) -> Orchestration {
        self.options.borrow().clone()
    }

    pub fn when(&self) -> When {
        self.options.borrow().when
    }

    /// Number of children the parent expects to take part, used as the
    /// total for stagger calculations.
    pub fn set_expected(&self, count: usize) {
        self.expected.set(count);
    }

    pub fn register_child(&self) -> ChildTicket {
        let index = self.registered.get();
        self.registered.set(index + 1);
        trace!(index, "child registered for orchestration");
        ChildTicket {
            index,
            generation: self.generation.get(),
        }
    }

    /// Record that a child's run settled. Stale tickets are ignored.
    pub fn child_completed(&self, ticket: ChildTicket) {
        if ticket.generation != self.generation.get() {
            return;
        }
        let completed = (self.completed.get() + 1).min(self.registered.get());
        self.completed.set(completed);
        if completed >= self.registered.get() {
            let waiters = std::mem::take(&mut *self.waiters.borrow_mut());
            for waiter in waiters {
                waiter.settle(Outcome::Finished);
            }
        }
    }

    /// Settles once every registered child has completed; already settled
    /// when that is true now (including when no child registered).
    pub fn children_complete(&self) -> Completion {
        if self.completed.get() >= self.registered.get() {
            return Completion::resolved();
        }
        let waiter = Completion::new();
        self.waiters.borrow_mut().push(waiter.clone());
        waiter
    }

    /// Whether a child's delay depends on how many siblings take part, so
    /// it can only be computed once registration has settled.
    pub fn delay_depends_on_total(&self) -> bool {
        self.options.borrow().delay_depends_on_total()
    }

    /// Start delay for the child holding `ticket`.
    pub fn child_delay(&self, ticket: ChildTicket) -> f64 {
        let total = self.expected.get().max(self.registered.get());
        self.options.borrow().child_delay(ticket.index, total)
    }

    pub fn gate(&self) -> Completion {
        self.gate.borrow().clone()
    }

    pub fn registered_count(&self) -> usize {
        self.registered.get()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.get()
    }
}
