//! Cooperative single-threaded scheduler.
//!
//! Models the three suspension points of a UI host loop:
//! - microtasks, drained until empty after every macro step
//! - frame tasks, run once per animation frame (batched layout work)
//! - timers, fired in due order as the clock advances
//!
//! `Scheduler` is a cheap clonable handle; every clone drives the same
//! queues. Tasks run with no internal borrow held, so a task may schedule
//! more work of any kind.

use slotmap::{SlotMap, new_key_type};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::{trace, warn};

new_key_type! {
    /// Handle for a pending timer.
    pub struct TimerId;
}

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

struct Timer {
    due: f64,
    seq: u64,
    task: Task,
}

struct SchedulerState {
    now: f64,
    microtasks: VecDeque<Task>,
    frame_tasks: VecDeque<Task>,
    timers: SlotMap<TimerId, Timer>,
    next_seq: u64,
    max_frame_passes: u32,
}

#[derive(Clone)]
pub struct Scheduler {
    state: Rc<RefCell<SchedulerState>>,
}

impl Scheduler {
    /// `max_frame_passes` bounds how many times frame work requested during
    /// a frame is picked up again within that same frame.
    pub fn new(max_frame_passes: u32) -> Self {
        Self {
            state: Rc::new(RefCell::new(SchedulerState {
                now: 0.0,
                microtasks: VecDeque::new(),
                frame_tasks: VecDeque::new(),
                timers: SlotMap::with_key(),
                next_seq: 0,
                max_frame_passes: max_frame_passes.max(1),
            })),
        }
    }

    /// Current clock time in milliseconds.
    pub fn now(&self) -> f64 {
        self.state.borrow().now
    }

    pub fn queue_microtask(&self, task: impl FnOnce() + 'static) {
        self.state.borrow_mut().microtasks.push_back(Box::new(task));
    }

    /// Run microtasks until the queue is empty. Returns how many ran.
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.state.borrow_mut().microtasks.pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    pub fn request_frame(&self, task: impl FnOnce() + 'static) {
        self.state.borrow_mut().frame_tasks.push_back(Box::new(task));
    }

    pub fn has_pending_frame(&self) -> bool {
        !self.state.borrow().frame_tasks.is_empty()
    }

    /// Run one animation frame. Microtasks are drained after each task.
    /// Work requested while the frame runs is picked up in further passes,
    /// up to the configured limit; anything left waits for the next frame.
    pub fn run_frame(&self) -> usize {
        let max_passes = self.state.borrow().max_frame_passes;
        let mut ran = 0;
        for pass in 0..max_passes {
            let batch: Vec<Task> = self.state.borrow_mut().frame_tasks.drain(..).collect();
            if batch.is_empty() {
                return ran;
            }
            trace!(pass, tasks = batch.len(), "frame pass");
            for task in batch {
                task();
                ran += 1;
                self.run_microtasks();
            }
        }
        if self.has_pending_frame() {
            warn!(max_passes, "frame work still pending after pass limit, deferring to next frame");
        }
        ran
    }

    /// Schedule `task` to run once `delay_ms` has elapsed on the clock.
    pub fn set_timeout(&self, delay_ms: f64, task: impl FnOnce() + 'static) -> TimerId {
        let mut state = self.state.borrow_mut();
        let due = state.now + delay_ms.max(0.0);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.timers.insert(Timer {
            due,
            seq,
            task: Box::new(task),
        })
    }

    /// Cancel a timer. Returns `false` if it already fired or was cleared.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        self.state.borrow_mut().timers.remove(id).is_some()
    }

    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Move the clock forward, firing due timers in order of due time (ties
    /// in scheduling order). Microtasks are drained after each timer.
    pub fn advance(&self, delta_ms: f64) {
        let target = self.now() + delta_ms.max(0.0);
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let due = state
                    .timers
                    .iter()
                    .filter(|(_, timer)| timer.due <= target)
                    .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.seq.cmp(&b.seq)))
                    .map(|(id, _)| id);
                match due.and_then(|id| state.timers.remove(id)) {
                    Some(timer) => {
                        state.now = state.now.max(timer.due);
                        Some(timer.task)
                    }
                    None => None,
                }
            };
            match next {
                Some(task) => {
                    task();
                    self.run_microtasks();
                }
                None => break,
            }
        }
        self.state.borrow_mut().now = target;
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn log() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn test_microtasks_drain_nested() {
        let scheduler = Scheduler::default();
        let seen = log();

        let s = scheduler.clone();
        let l = seen.clone();
        scheduler.queue_microtask(move || {
            l.borrow_mut().push("outer");
            let l2 = l.clone();
            s.queue_microtask(move || l2.borrow_mut().push("inner"));
        });

        assert_eq!(scheduler.run_microtasks(), 2);
        assert_eq!(*seen.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_timers_fire_in_due_order() {
        let scheduler = Scheduler::default();
        let seen = log();

        let l = seen.clone();
        scheduler.set_timeout(30.0, move || l.borrow_mut().push("late"));
        let l = seen.clone();
        scheduler.set_timeout(10.0, move || l.borrow_mut().push("early"));
        let l = seen.clone();
        let cancelled = scheduler.set_timeout(20.0, move || l.borrow_mut().push("cancelled"));
        assert!(scheduler.clear_timeout(cancelled));

        scheduler.advance(15.0);
        assert_eq!(*seen.borrow(), vec!["early"]);
        assert_eq!(scheduler.now(), 15.0);

        scheduler.advance(100.0);
        assert_eq!(*seen.borrow(), vec!["early", "late"]);
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[test]
    fn test_frame_runs_requested_work_within_pass_limit() {
        let scheduler = Scheduler::new(2);
        let seen = log();

        let s = scheduler.clone();
        let l = seen.clone();
        scheduler.request_frame(move || {
            l.borrow_mut().push("first");
            let s2 = s.clone();
            let l2 = l.clone();
            s.request_frame(move || {
                l2.borrow_mut().push("second");
                let l3 = l2.clone();
                s2.request_frame(move || l3.borrow_mut().push("third"));
            });
        });

        assert_eq!(scheduler.run_frame(), 2);
        assert_eq!(*seen.borrow(), vec!["first", "second"]);
        assert!(scheduler.has_pending_frame());

        scheduler.run_frame();
        assert_eq!(*seen.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_timer_task_may_schedule_timer() {
        let scheduler = Scheduler::default();
        let seen = log();

        let s = scheduler.clone();
        let l = seen.clone();
        scheduler.set_timeout(5.0, move || {
            let l2 = l.clone();
            s.set_timeout(5.0, move || l2.borrow_mut().push("chained"));
        });

        scheduler.advance(20.0);
        assert_eq!(*seen.borrow(), vec!["chained"]);
    }
}
