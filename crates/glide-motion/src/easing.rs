//! Easing curves used by the tween driver.
//!
//! Supports the CSS timing functions (`linear`, `ease`, `ease-in`,
//! `ease-out`, `ease-in-out`, `cubic-bezier(..)`, `steps(..)`) and parses
//! them from the names used in configuration files and JSON targets.
//!
//! # Usage
//!
//! ```
//! use glide_motion::easing::EasingFunction;
//!
//! let ease = EasingFunction::from_name("ease-out").unwrap_or_default();
//! let eased = ease.evaluate(0.5);
//! assert!(eased > 0.5);
//! ```

use serde::{Deserialize, Serialize};

/// Where the jump happens in a `steps()` curve.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPosition {
    Start,
    #[default]
    End,
}

/// A CSS easing curve mapping linear progress to eased progress.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EasingFunction {
    Linear,
    Ease,
    EaseIn,
    #[default]
    EaseOut,
    EaseInOut,
    /// Control points `(x1, y1)` and `(x2, y2)`; x values lie in `[0, 1]`.
    CubicBezier { x1: f64, y1: f64, x2: f64, y2: f64 },
    Steps { count: u32, position: StepPosition },
}

impl EasingFunction {
    /// Eased progress at `t` (clamped to `[0, 1]`).
    pub fn evaluate(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match *self {
            Self::Linear => t,
            Self::Ease => bezier(0.25, 0.1, 0.25, 1.0, t),
            Self::EaseIn => bezier(0.42, 0.0, 1.0, 1.0, t),
            Self::EaseOut => bezier(0.0, 0.0, 0.58, 1.0, t),
            Self::EaseInOut => bezier(0.42, 0.0, 0.58, 1.0, t),
            Self::CubicBezier { x1, y1, x2, y2 } => bezier(x1, y1, x2, y2, t),
            Self::Steps { count, position } => steps(count, position, t),
        }
    }

    /// Custom bezier curve. Returns `None` when an x control point is
    /// outside `[0, 1]`, which would make the curve non-monotonic in time.
    pub fn cubic_bezier(x1: f64, y1: f64, x2: f64, y2: f64) -> Option<Self> {
        let valid = (0.0..=1.0).contains(&x1) && (0.0..=1.0).contains(&x2);
        valid.then_some(Self::CubicBezier { x1, y1, x2, y2 })
    }

    /// Stepped curve with at least one interval.
    pub fn steps(count: u32, position: StepPosition) -> Option<Self> {
        (count >= 1).then_some(Self::Steps { count, position })
    }

    /// Parse a curve name. Accepts kebab, snake and camel case keyword
    /// forms as well as `cubic-bezier(a, b, c, d)` and `steps(n[, start|end])`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if let Some(args) = function_args(name, "cubic-bezier") {
            let points: Vec<f64> = args
                .split(',')
                .map(|p| p.trim().parse::<f64>())
                .collect::<Result<_, _>>()
                .ok()?;
            return match points.as_slice() {
                [x1, y1, x2, y2] => Self::cubic_bezier(*x1, *y1, *x2, *y2),
                _ => None,
            };
        }
        if let Some(args) = function_args(name, "steps") {
            let mut parts = args.split(',').map(str::trim);
            let count = parts.next()?.parse::<u32>().ok()?;
            let position = match parts.next() {
                None | Some("end") | Some("jump-end") => StepPosition::End,
                Some("start") | Some("jump-start") => StepPosition::Start,
                Some(_) => return None,
            };
            return Self::steps(count, position);
        }

        let keyword: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        match keyword.as_str() {
            "linear" => Some(Self::Linear),
            "ease" => Some(Self::Ease),
            "easein" => Some(Self::EaseIn),
            "easeout" => Some(Self::EaseOut),
            "easeinout" => Some(Self::EaseInOut),
            _ => None,
        }
    }
}

fn function_args<'a>(text: &'a str, function: &str) -> Option<&'a str> {
    text.strip_prefix(function)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
}

/// Solve the curve for x = `progress` with Newton-Raphson, falling back to
/// bisection when the slope flattens, then evaluate y.
fn bezier(x1: f64, y1: f64, x2: f64, y2: f64, progress: f64) -> f64 {
    if progress <= 0.0 {
        return 0.0;
    }
    if progress >= 1.0 {
        return 1.0;
    }

    let mut t = progress;
    let mut converged = false;
    for _ in 0..8 {
        let err = cubic(x1, x2, t) - progress;
        if err.abs() < 1e-7 {
            converged = true;
            break;
        }
        let slope = cubic_slope(x1, x2, t);
        if slope.abs() < 1e-7 {
            break;
        }
        t = (t - err / slope).clamp(0.0, 1.0);
    }

    if !converged {
        let (mut lo, mut hi) = (0.0, 1.0);
        t = progress;
        for _ in 0..32 {
            let x = cubic(x1, x2, t);
            if (x - progress).abs() < 1e-7 {
                break;
            }
            if x < progress {
                lo = t;
            } else {
                hi = t;
            }
            t = (lo + hi) / 2.0;
        }
    }

    cubic(y1, y2, t)
}

/// One coordinate of a unit bezier with endpoints 0 and 1.
#[inline]
fn cubic(p1: f64, p2: f64, t: f64) -> f64 {
    let mt = 1.0 - t;
    3.0 * mt * mt * t * p1 + 3.0 * mt * t * t * p2 + t * t * t
}

#[inline]
fn cubic_slope(p1: f64, p2: f64, t: f64) -> f64 {
    let mt = 1.0 - t;
    3.0 * mt * mt * p1 + 6.0 * mt * t * (p2 - p1) + 3.0 * t * t * (1.0 - p2)
}

fn steps(count: u32, position: StepPosition, t: f64) -> f64 {
    let n = count.max(1) as f64;
    match position {
        StepPosition::Start => (t * n).ceil() / n,
        StepPosition::End => (t * n).floor() / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_keyword_curves_hit_endpoints() {
        for curve in [
            EasingFunction::Linear,
            EasingFunction::Ease,
            EasingFunction::EaseIn,
            EasingFunction::EaseOut,
            EasingFunction::EaseInOut,
        ] {
            assert!(approx_eq(curve.evaluate(0.0), 0.0), "{:?}", curve);
            assert!(approx_eq(curve.evaluate(1.0), 1.0), "{:?}", curve);
        }
    }

    #[test]
    fn test_ease_in_out_is_symmetric() {
        let curve = EasingFunction::EaseInOut;
        assert!(approx_eq(curve.evaluate(0.5), 0.5));
        assert!(approx_eq(curve.evaluate(0.2) + curve.evaluate(0.8), 1.0));
    }

    #[test]
    fn test_ease_out_front_loads() {
        let curve = EasingFunction::EaseOut;
        assert!(curve.evaluate(0.25) > 0.25);
        assert!(curve.evaluate(0.5) > 0.5);
    }

    #[test]
    fn test_steps_end_and_start() {
        let end = EasingFunction::steps(4, StepPosition::End).unwrap();
        assert!(approx_eq(end.evaluate(0.24), 0.0));
        assert!(approx_eq(end.evaluate(0.5), 0.5));

        let start = EasingFunction::steps(4, StepPosition::Start).unwrap();
        assert!(approx_eq(start.evaluate(0.01), 0.25));
        assert!(approx_eq(start.evaluate(1.0), 1.0));
    }

    #[test]
    fn test_invalid_constructors_return_none() {
        assert!(EasingFunction::cubic_bezier(-0.1, 0.0, 0.5, 1.0).is_none());
        assert!(EasingFunction::steps(0, StepPosition::End).is_none());
    }

    #[test]
    fn test_from_name() {
        assert_eq!(EasingFunction::from_name("ease_out"), Some(EasingFunction::EaseOut));
        assert_eq!(EasingFunction::from_name("easeInOut"), Some(EasingFunction::EaseInOut));
        assert_eq!(EasingFunction::from_name("ease-in"), Some(EasingFunction::EaseIn));
        assert_eq!(
            EasingFunction::from_name("cubic-bezier(0.4, 0, 0.2, 1)"),
            Some(EasingFunction::CubicBezier { x1: 0.4, y1: 0.0, x2: 0.2, y2: 1.0 })
        );
        assert_eq!(
            EasingFunction::from_name("steps(3, start)"),
            Some(EasingFunction::Steps { count: 3, position: StepPosition::Start })
        );
        assert_eq!(EasingFunction::from_name("bounce"), None);
    }

    #[test]
    fn test_linear_bezier_matches_linear() {
        let curve = EasingFunction::cubic_bezier(0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(approx_eq(curve.evaluate(0.3), 0.3));
    }
}
