//! Interpolation between animatable values.
//!
//! Numbers mix linearly. Strings carrying numbers mix token by token when
//! both sides share the same shape (`"10px"` to `"20px"`, or
//! `"0px 2px 4px black"` to `"0px 8px 16px black"`). Anything else
//! switches discretely when the animation reaches its end.

use crate::geometry::mix;
use crate::style::{format_number, numeric, split_unit};
use crate::value::Value;

/// Types that can be mixed between two values.
pub trait Interpolate: Sized {
    /// `t = 0` yields `self`, `t = 1` yields `to`.
    fn interpolate(&self, to: &Self, t: f64) -> Self;
}

impl Interpolate for f64 {
    fn interpolate(&self, to: &Self, t: f64) -> Self {
        mix(*self, *to, t)
    }
}

impl Interpolate for Value {
    fn interpolate(&self, to: &Self, t: f64) -> Self {
        match (self, to) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a.interpolate(b, t)),
            (Value::Number(a), Value::Text(b)) => match split_unit(b) {
                Some((end, unit)) => Value::Text(with_unit(mix(*a, end, t), unit)),
                None => discrete(self, to, t),
            },
            (Value::Text(a), Value::Number(b)) => match split_unit(a) {
                Some((start, unit)) if t < 1.0 => Value::Text(with_unit(mix(start, *b, t), unit)),
                _ => discrete(self, to, t),
            },
            (Value::Text(a), Value::Text(b)) => match mix_text(a, b, t) {
                Some(text) => Value::Text(text),
                None => discrete(self, to, t),
            },
        }
    }
}

fn discrete(from: &Value, to: &Value, t: f64) -> Value {
    if t >= 1.0 { to.clone() } else { from.clone() }
}

fn with_unit(n: f64, unit: &str) -> String {
    format!("{}{}", format_number(n), unit)
}

/// Mix two strings of whitespace separated tokens. Numeric tokens must
/// agree on unit (or one side be unitless); other tokens must be equal.
fn mix_text(from: &str, to: &str, t: f64) -> Option<String> {
    let a: Vec<&str> = from.split_whitespace().collect();
    let b: Vec<&str> = to.split_whitespace().collect();
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut out = Vec::with_capacity(a.len());
    for (x, y) in a.iter().zip(b.iter()) {
        match (split_unit(x), split_unit(y)) {
            (Some((n0, u0)), Some((n1, u1))) => {
                let unit = match (u0, u1) {
                    (u0, u1) if u0 == u1 => u0,
                    ("", u1) => u1,
                    (u0, "") => u0,
                    _ => return None,
                };
                out.push(with_unit(mix(n0, n1, t), unit));
            }
            (None, None) if x == y => out.push((*x).to_string()),
            _ => return None,
        }
    }
    Some(out.join(" "))
}

/// Velocity (units per second) between two samples `dt_ms` apart.
pub fn velocity_between(previous: &Value, current: &Value, dt_ms: f64) -> f64 {
    if dt_ms <= 0.0 {
        return 0.0;
    }
    match (numeric(previous), numeric(current)) {
        (Some(a), Some(b)) => (b - a) / dt_ms * 1000.0,
        _ => 0.0,
    }
}
