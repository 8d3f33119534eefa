//! Animation drivers.
//!
//! The reconciler never interpolates values itself. It hands a property
//! key, its `MotionValue`, resolved keyframes and a `TransitionSpec` to an
//! [`AnimationDriver`] and gets back [`Controls`]: a `finished` completion
//! and a way to stop the animation.
//!
//! [`TweenDriver`] is the built-in frame-ticked implementation. Hosts with
//! their own playback engine implement the trait instead.

use slotmap::{SlotMap, new_key_type};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

use crate::completion::{Completion, Outcome};
use crate::interpolate::{Interpolate, velocity_between};
use crate::transition::TransitionSpec;
use crate::value::{Keyframes, MotionValue, Value};

/// What to animate and how.
pub struct AnimationRequest {
    /// Canonical property key (for logging and host engines that care).
    pub key: String,
    /// Container the animation writes into.
    pub value: MotionValue,
    /// One keyframe animates from the current value; several are played
    /// evenly spaced in order.
    pub keyframes: Keyframes,
    pub spec: TransitionSpec,
}

/// Handle to a running animation.
pub struct Controls {
    pub finished: Completion,
    stop: Option<Box<dyn FnOnce()>>,
}

impl Controls {
    pub fn new(finished: Completion, stop: impl FnOnce() + 'static) -> Self {
        Self {
            finished,
            stop: Some(Box::new(stop)),
        }
    }

    /// Controls for work that is already done.
    pub fn completed() -> Self {
        Self {
            finished: Completion::resolved(),
            stop: None,
        }
    }

    /// Stop the animation where it is. `finished` is settled afterwards,
    /// `Cancelled` unless it had already finished.
    pub fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
        self.finished.settle(Outcome::Cancelled);
    }
}

impl fmt::Debug for Controls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controls")
            .field("finished", &self.finished)
            .finish()
    }
}

/// Low-level playback engine.
pub trait AnimationDriver {
    /// Start animating. Implementations write into `request.value` as the
    /// animation progresses and settle `finished` when done.
    fn animate(&self, request: AnimationRequest) -> Controls;

    /// Advance by one frame. Engines driven by an external clock ignore this.
    fn tick(&self, _delta_ms: f64) {}

    /// Number of animations still in flight.
    fn active(&self) -> usize {
        0
    }
}

new_key_type! {
    struct TweenId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TweenState {
    /// Waiting out the delay.
    Pending,
    Running,
}

struct ActiveTween {
    key: String,
    value: MotionValue,
    frames: Vec<Value>,
    spec: TransitionSpec,
    elapsed_ms: f64,
    state: TweenState,
    finished: Completion,
}

impl ActiveTween {
    fn progress(&self) -> f64 {
        let active = (self.elapsed_ms - self.spec.delay_ms).max(0.0);
        if self.spec.duration_ms > 0.0 {
            (active / self.spec.duration_ms).clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    /// Value at the current time. Eased progress is spread across the
    /// keyframe segments.
    fn sample(&self) -> Value {
        let eased = self.spec.easing.evaluate(self.progress());
        sample_frames(&self.frames, eased)
    }

    /// Advance time. Returns `true` while the tween still has work to do.
    fn update(&mut self, delta_ms: f64) -> bool {
        self.elapsed_ms += delta_ms;
        if self.state == TweenState::Pending && self.elapsed_ms >= self.spec.delay_ms {
            self.state = TweenState::Running;
        }
        self.state == TweenState::Pending
            || self.elapsed_ms - self.spec.delay_ms < self.spec.duration_ms
    }
}

fn sample_frames(frames: &[Value], eased: f64) -> Value {
    match frames {
        [] => Value::Number(0.0),
        [only] => only.clone(),
        _ => {
            let segments = (frames.len() - 1) as f64;
            let position = eased * segments;
            let index = (position.floor().max(0.0) as usize).min(frames.len() - 2);
            let local = position - index as f64;
            frames[index].interpolate(&frames[index + 1], local)
        }
    }
}

type TweenMap = SlotMap<TweenId, ActiveTween>;

/// Frame-ticked tween engine using CSS easing curves.
#[derive(Clone, Default)]
pub struct TweenDriver {
    tweens: Rc<RefCell<TweenMap>>,
}

impl TweenDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnimationDriver for TweenDriver {
    fn animate(&self, request: AnimationRequest) -> Controls {
        let AnimationRequest {
            key,
            value,
            keyframes,
            spec,
        } = request;

        let mut frames: Vec<Value> = keyframes.iter().cloned().collect();
        let Some(last) = frames.last().cloned() else {
            return Controls::completed();
        };
        if frames.len() == 1 {
            frames.insert(0, value.get());
        }

        if spec.duration_ms <= 0.0 && spec.delay_ms <= 0.0 {
            debug!(key = %key, "instant transition");
            value.update(last, 0.0);
            return Controls::completed();
        }

        debug!(
            key = %key,
            duration_ms = spec.duration_ms,
            delay_ms = spec.delay_ms,
            frames = frames.len(),
            "tween started"
        );
        let finished = Completion::new();
        let id = self.tweens.borrow_mut().insert(ActiveTween {
            key,
            value,
            frames,
            spec,
            elapsed_ms: 0.0,
            state: if spec.delay_ms > 0.0 {
                TweenState::Pending
            } else {
                TweenState::Running
            },
            finished: finished.clone(),
        });

        let tweens: Weak<RefCell<TweenMap>> = Rc::downgrade(&self.tweens);
        Controls::new(finished, move || {
            let removed = tweens.upgrade().and_then(|tweens| {
                let mut map = tweens.borrow_mut();
                map.remove(id)
            });
            if let Some(tween) = removed {
                trace!(key = %tween.key, "tween stopped");
                tween.finished.settle(Outcome::Cancelled);
            }
        })
    }

    fn tick(&self, delta_ms: f64) {
        let mut writes = Vec::new();
        let mut finished = Vec::new();
        {
            let mut tweens = self.tweens.borrow_mut();
            let mut done = Vec::new();
            for (id, tween) in tweens.iter_mut() {
                let running = tween.update(delta_ms);
                if tween.state == TweenState::Pending {
                    continue;
                }
                let next = tween.sample();
                let velocity = if running {
                    velocity_between(&tween.value.get(), &next, delta_ms)
                } else {
                    0.0
                };
                writes.push((tween.value.clone(), next, velocity));
                if !running {
                    done.push(id);
                }
            }
            for id in done {
                if let Some(tween) = tweens.remove(id) {
                    trace!(key = %tween.key, "tween finished");
                    finished.push(tween.finished);
                }
            }
        }

        // Values land before completions fire so continuations observe the
        // final keyframe.
        for (value, next, velocity) in writes {
            value.update(next, velocity);
        }
        for completion in finished {
            completion.settle(Outcome::Finished);
        }
    }

    fn active(&self) -> usize {
        self.tweens.borrow().len()
    }
}
