//! One-shot completion signals with "settled regardless of outcome" aggregation.
//!
//! A `Completion` is shared between whoever finishes some work (an animation
//! driver, the presence coordinator) and whoever waits for it. Waiting is done
//! with `on_settled` continuations, or by awaiting the completion as a
//! `Future` when the host has an executor.
//!
//! `Completion::all_settled` is the aggregation primitive used for layer
//! completion, orchestration and exit handoff: it settles once every input
//! has settled, whether the input finished or was cancelled.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// How a piece of work ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Ran to the end.
    Finished,
    /// Stopped before the end (interrupted, superseded, or torn down).
    Cancelled,
}

type Continuation = Box<dyn FnOnce(Outcome)>;

#[derive(Default)]
struct CompletionState {
    outcome: Option<Outcome>,
    continuations: Vec<Continuation>,
    wakers: Vec<Waker>,
}

/// Shared one-shot completion signal.
#[derive(Clone, Default)]
pub struct Completion {
    state: Rc<RefCell<CompletionState>>,
}

impl Completion {
    /// A pending completion.
    pub fn new() -> Self {
        Self::default()
    }

    /// A completion that is already finished.
    pub fn resolved() -> Self {
        let completion = Self::new();
        completion.settle(Outcome::Finished);
        completion
    }

    /// Settle with `outcome`. Only the first call has any effect.
    ///
    /// Continuations run synchronously, after the internal state has been
    /// released, so they may freely inspect or chain on this completion.
    pub fn settle(&self, outcome: Outcome) -> bool {
        let (continuations, wakers) = {
            let mut state = self.state.borrow_mut();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome);
            (
                std::mem::take(&mut state.continuations),
                std::mem::take(&mut state.wakers),
            )
        };
        for continuation in continuations {
            continuation(outcome);
        }
        for waker in wakers {
            waker.wake();
        }
        true
    }

    pub fn is_settled(&self) -> bool {
        self.state.borrow().outcome.is_some()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.state.borrow().outcome
    }

    /// Run `continuation` once settled (immediately if already settled).
    pub fn on_settled(&self, continuation: impl FnOnce(Outcome) + 'static) {
        let outcome = {
            let mut state = self.state.borrow_mut();
            match state.outcome {
                Some(outcome) => outcome,
                None => {
                    state.continuations.push(Box::new(continuation));
                    return;
                }
            }
        };
        continuation(outcome);
    }

    /// Settle `Finished` once every input has settled, with any outcome.
    /// An empty input yields an already-finished completion.
    pub fn all_settled(completions: impl IntoIterator<Item = Completion>) -> Completion {
        let pending: Vec<Completion> = completions
            .into_iter()
            .filter(|c| !c.is_settled())
            .collect();
        if pending.is_empty() {
            return Completion::resolved();
        }

        let aggregate = Completion::new();
        let remaining = Rc::new(RefCell::new(pending.len()));
        for completion in pending {
            let aggregate = aggregate.clone();
            let remaining = remaining.clone();
            completion.on_settled(move |_| {
                let done = {
                    let mut left = remaining.borrow_mut();
                    *left -= 1;
                    *left == 0
                };
                if done {
                    aggregate.settle(Outcome::Finished);
                }
            });
        }
        aggregate
    }

    /// True if both handles share the same state.
    pub fn ptr_eq(&self, other: &Completion) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl Future for Completion {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        let mut state = self.state.borrow_mut();
        match state.outcome {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    state.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("outcome", &self.outcome())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_first_settle_wins() {
        let completion = Completion::new();
        assert!(completion.settle(Outcome::Cancelled));
        assert!(!completion.settle(Outcome::Finished));
        assert_eq!(completion.outcome(), Some(Outcome::Cancelled));
    }

    #[test]
    fn test_on_settled_runs_late_subscribers_immediately() {
        let completion = Completion::resolved();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        completion.on_settled(move |outcome| {
            assert_eq!(outcome, Outcome::Finished);
            flag.set(true);
        });
        assert!(ran.get());
    }

    #[test]
    fn test_all_settled_ignores_cancellation() {
        let a = Completion::new();
        let b = Completion::new();
        let c = Completion::new();
        let all = Completion::all_settled([a.clone(), b.clone(), c.clone()]);

        a.settle(Outcome::Finished);
        b.settle(Outcome::Cancelled);
        assert!(!all.is_settled());

        c.settle(Outcome::Cancelled);
        assert_eq!(all.outcome(), Some(Outcome::Finished));
    }

    #[test]
    fn test_all_settled_empty_is_immediate() {
        let all = Completion::all_settled(Vec::new());
        assert!(all.is_settled());
    }

    #[test]
    fn test_continuation_may_chain_on_same_completion() {
        let completion = Completion::new();
        let inner = completion.clone();
        let count = Rc::new(Cell::new(0));
        let outer_count = count.clone();
        completion.on_settled(move |_| {
            let c = outer_count.clone();
            inner.on_settled(move |_| c.set(c.get() + 1));
        });
        completion.settle(Outcome::Finished);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_poll_as_future() {
        let completion = Completion::new();
        let mut fut = completion.clone();
        let waker = Waker::noop();
        let mut cx = Context::from_waker(waker);

        assert_eq!(Pin::new(&mut fut).poll(&mut cx), Poll::Pending);
        completion.settle(Outcome::Finished);
        assert_eq!(Pin::new(&mut fut).poll(&mut cx), Poll::Ready(Outcome::Finished));
    }
}
