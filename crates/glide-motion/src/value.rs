//! Values, keyframes, and subscribable motion values.
//!
//! This module defines:
//! - `Value`: an animatable property value (number or CSS string)
//! - `Keyframes`: the ordered values an animation passes through
//! - `MotionValue`: a shared, subscribable container for one property's
//!   current value and velocity
//! - `Subscribers`: the `on_change(callback) -> Subscription` primitive used
//!   wherever a push-based notification is needed

use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// An animatable property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Plain number (unit is implied by the property, see `style::css_value`).
    Number(f64),
    /// Any CSS string (`"10px"`, `"red"`, `"0 2px 4px black"`).
    Text(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    /// Convert a JSON value, dropping anything that is not a string or number.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Ordered keyframes for one property. A single entry means "animate from
/// the current value to this one".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keyframes(pub SmallVec<[Value; 2]>);

impl Keyframes {
    pub fn single(value: impl Into<Value>) -> Self {
        let mut frames = SmallVec::new();
        frames.push(value.into());
        Self(frames)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<&Value> {
        first_keyframe(self)
    }

    pub fn last(&self) -> Option<&Value> {
        last_keyframe(self)
    }

    /// Parse keyframes from JSON. Arrays keep their valid entries; anything
    /// that leaves no valid entry yields `None`.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        let frames: SmallVec<[Value; 2]> = match json {
            serde_json::Value::Array(items) => items.iter().filter_map(Value::from_json).collect(),
            other => Value::from_json(other).into_iter().collect(),
        };
        if frames.is_empty() { None } else { Some(Self(frames)) }
    }
}

macro_rules! keyframes_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Keyframes {
            fn from(v: $ty) -> Self {
                Self::single(v)
            }
        })*
    };
}

keyframes_from!(Value, f64, i32, &str, String);

impl<V: Into<Value>> FromIterator<V> for Keyframes {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// First keyframe of a sequence.
pub fn first_keyframe(frames: &Keyframes) -> Option<&Value> {
    frames.0.first()
}

/// Final keyframe of a sequence (the value the property rests at).
pub fn last_keyframe(frames: &Keyframes) -> Option<&Value> {
    frames.0.last()
}

/// Elementwise equality including length.
pub fn keyframes_equal(a: &Keyframes, b: &Keyframes) -> bool {
    a.0.len() == b.0.len() && a.0.iter().zip(b.0.iter()).all(|(x, y)| x == y)
}

new_key_type! {
    struct SubscriberId;
}

type Callback<T> = Rc<dyn Fn(&T)>;

/// A list of change callbacks with unsubscribe handles.
pub struct Subscribers<T> {
    callbacks: Rc<RefCell<SlotMap<SubscriberId, Callback<T>>>>,
}

impl<T: 'static> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            callbacks: Rc::new(RefCell::new(SlotMap::with_key())),
        }
    }

    /// Register a callback. Keep the returned handle to unsubscribe later.
    pub fn on_change(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let id = self.callbacks.borrow_mut().insert(Rc::new(callback));
        let weak: Weak<RefCell<SlotMap<SubscriberId, Callback<T>>>> =
            Rc::downgrade(&self.callbacks);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(callbacks) = weak.upgrade() {
                    callbacks.borrow_mut().remove(id);
                }
            })),
        }
    }

    /// Invoke every callback. The list is not borrowed while callbacks run,
    /// so callbacks may subscribe or unsubscribe.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = self.callbacks.borrow().values().cloned().collect();
        for callback in snapshot {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `on_change`.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

struct MotionValueInner {
    current: Value,
    velocity: f64,
}

/// Shared container for one property's current value and velocity.
///
/// Cloning a `MotionValue` yields another handle to the same container.
#[derive(Clone)]
pub struct MotionValue {
    inner: Rc<RefCell<MotionValueInner>>,
    subscribers: Rc<Subscribers<Value>>,
}

impl MotionValue {
    pub fn new(initial: impl Into<Value>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MotionValueInner {
                current: initial.into(),
                velocity: 0.0,
            })),
            subscribers: Rc::new(Subscribers::new()),
        }
    }

    pub fn get(&self) -> Value {
        self.inner.borrow().current.clone()
    }

    pub fn velocity(&self) -> f64 {
        self.inner.borrow().velocity
    }

    /// Jump to a value, resetting velocity.
    pub fn set(&self, value: impl Into<Value>) {
        self.update(value.into(), 0.0);
    }

    /// Set value and velocity together (used by animation drivers).
    /// Subscribers are only notified when the value actually changes.
    pub fn update(&self, value: Value, velocity: f64) {
        let changed = {
            let mut inner = self.inner.borrow_mut();
            inner.velocity = velocity;
            if inner.current == value {
                false
            } else {
                inner.current = value.clone();
                true
            }
        };
        if changed {
            self.subscribers.notify(&value);
        }
    }

    pub fn on_change(&self, callback: impl Fn(&Value) + 'static) -> Subscription {
        self.subscribers.on_change(callback)
    }

    /// True if both handles point at the same container.
    pub fn ptr_eq(&self, other: &MotionValue) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for MotionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("MotionValue")
            .field("current", &inner.current)
            .field("velocity", &inner.velocity)
            .finish()
    }
}
