//! Transition configuration.
//!
//! This module provides:
//! - `TransitionSpec`: timing for one property animation (duration, delay, easing)
//! - `Transition`: a default spec, per-property overrides, and orchestration options
//! - `Orchestration`: how a parent sequences its children (`when`,
//!   `delayChildren`, `staggerChildren`, `staggerDirection`)
//!
//! Durations and delays are in milliseconds throughout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use glide_config::{AnimationConfig, LayoutConfig};

use crate::easing::EasingFunction;
use crate::style::canonical_key;

/// Timing for a single property animation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionSpec {
    pub duration_ms: f64,
    pub delay_ms: f64,
    pub easing: EasingFunction,
}

impl Default for TransitionSpec {
    fn default() -> Self {
        Self {
            duration_ms: 300.0,
            delay_ms: 0.0,
            easing: EasingFunction::EaseOut,
        }
    }
}

impl TransitionSpec {
    pub fn new(duration_ms: f64) -> Self {
        Self {
            duration_ms,
            ..Self::default()
        }
    }

    /// Zero-duration spec: the value jumps to its final keyframe.
    pub fn instant() -> Self {
        Self::new(0.0)
    }

    pub fn with_delay(mut self, delay_ms: f64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_easing(mut self, easing: EasingFunction) -> Self {
        self.easing = easing;
        self
    }

    /// Default spec for value animations from configuration. Unknown easing
    /// names fall back to the default curve.
    pub fn from_animation_config(config: &AnimationConfig) -> Self {
        Self {
            duration_ms: config.duration_ms as f64,
            delay_ms: config.delay_ms as f64,
            easing: EasingFunction::from_name(&config.easing).unwrap_or_default(),
        }
    }

    /// Default spec for layout animations from configuration.
    pub fn from_layout_config(config: &LayoutConfig) -> Self {
        Self {
            duration_ms: config.duration_ms as f64,
            delay_ms: 0.0,
            easing: EasingFunction::from_name(&config.easing).unwrap_or_default(),
        }
    }

    /// Parse `{ "duration": 200, "delay": 50, "ease": "ease-in" }`, filling
    /// missing fields from `base`.
    fn from_json(json: &serde_json::Map<String, serde_json::Value>, base: TransitionSpec) -> Self {
        let mut spec = base;
        if let Some(duration) = json.get("duration").and_then(|v| v.as_f64()) {
            spec.duration_ms = duration.max(0.0);
        }
        if let Some(delay) = json.get("delay").and_then(|v| v.as_f64()) {
            spec.delay_ms = delay;
        }
        let easing = json.get("ease").or_else(|| json.get("easing"));
        if let Some(easing) = easing.and_then(|v| v.as_str()).and_then(EasingFunction::from_name) {
            spec.easing = easing;
        }
        spec
    }
}

/// When a parent animates relative to its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum When {
    /// Parent and children start together (children still honor stagger).
    #[default]
    Together,
    /// Children wait for the parent's animation to settle.
    BeforeChildren,
    /// The parent reports completion only after every child has.
    AfterChildren,
}

/// Order in which stagger offsets are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaggerDirection {
    #[default]
    Forward,
    Reverse,
}

/// Base delay applied to every child.
#[derive(Clone)]
pub enum DelayChildren {
    Fixed(f64),
    /// Computed from `(index, total_children)`.
    Custom(Rc<dyn Fn(usize, usize) -> f64>),
}

impl DelayChildren {
    pub fn custom(f: impl Fn(usize, usize) -> f64 + 'static) -> Self {
        Self::Custom(Rc::new(f))
    }

    fn delay(&self, index: usize, total: usize) -> f64 {
        match self {
            Self::Fixed(ms) => *ms,
            Self::Custom(f) => f(index, total),
        }
    }
}

impl Default for DelayChildren {
    fn default() -> Self {
        Self::Fixed(0.0)
    }
}

impl PartialEq for DelayChildren {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Fixed(a), Self::Fixed(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for DelayChildren {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(ms) => f.debug_tuple("Fixed").field(ms).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Parent/child sequencing options.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Orchestration {
    pub when: When,
    pub delay_children: DelayChildren,
    pub stagger_children_ms: f64,
    pub stagger_direction: StaggerDirection,
}

impl Orchestration {
    /// Start delay for the child registered at `index` out of `total`.
    pub fn child_delay(&self, index: usize, total: usize) -> f64 {
        let position = match self.stagger_direction {
            StaggerDirection::Forward => index,
            StaggerDirection::Reverse => total.saturating_sub(1).saturating_sub(index),
        };
        self.delay_children.delay(position, total) + position as f64 * self.stagger_children_ms
    }

    /// True when `child_delay` reads `total`: a reverse stagger or a custom
    /// delay function.
    pub fn delay_depends_on_total(&self) -> bool {
        let reversed = self.stagger_direction == StaggerDirection::Reverse && self.stagger_children_ms != 0.0;
        reversed || matches!(self.delay_children, DelayChildren::Custom(_))
    }
}

/// Transition attached to an animation target or a node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transition {
    /// Spec for every property without an override.
    pub default: Option<TransitionSpec>,
    /// Per-property overrides keyed by canonical property name.
    pub properties: BTreeMap<String, TransitionSpec>,
    pub orchestration: Option<Orchestration>,
}

impl Transition {
    pub fn new(spec: TransitionSpec) -> Self {
        Self {
            default: Some(spec),
            ..Self::default()
        }
    }

    pub fn with_property(mut self, key: &str, spec: TransitionSpec) -> Self {
        self.properties.insert(canonical_key(key), spec);
        self
    }

    pub fn with_orchestration(mut self, orchestration: Orchestration) -> Self {
        self.orchestration = Some(orchestration);
        self
    }

    /// Spec for `key`: its override, else this transition's default, else
    /// `fallback`.
    pub fn spec_for(&self, key: &str, fallback: TransitionSpec) -> TransitionSpec {
        self.properties
            .get(key)
            .copied()
            .or(self.default)
            .unwrap_or(fallback)
    }

    /// Parse a transition object. Timing fields apply to every property;
    /// nested objects are per-property overrides; orchestration keys
    /// (`when`, `delayChildren`, `staggerChildren`, `staggerDirection`) are
    /// collected into `orchestration`.
    pub fn from_json(json: &serde_json::Value, fallback: TransitionSpec) -> Option<Self> {
        let map = json.as_object()?;
        let mut transition = Transition::default();

        let has_timing = ["duration", "delay", "ease", "easing"]
            .iter()
            .any(|k| map.contains_key(*k));
        let default = TransitionSpec::from_json(map, fallback);
        if has_timing {
            transition.default = Some(default);
        }

        let mut orchestration = Orchestration::default();
        let mut has_orchestration = false;
        for (key, value) in map {
            match key.as_str() {
                "duration" | "delay" | "ease" | "easing" => {}
                "when" => {
                    has_orchestration = true;
                    orchestration.when = match value.as_str() {
                        Some("beforeChildren") => When::BeforeChildren,
                        Some("afterChildren") => When::AfterChildren,
                        _ => When::Together,
                    };
                }
                "delayChildren" => {
                    has_orchestration = true;
                    orchestration.delay_children =
                        DelayChildren::Fixed(value.as_f64().unwrap_or(0.0));
                }
                "staggerChildren" => {
                    has_orchestration = true;
                    orchestration.stagger_children_ms = value.as_f64().unwrap_or(0.0);
                }
                "staggerDirection" => {
                    has_orchestration = true;
                    orchestration.stagger_direction = match value.as_f64() {
                        Some(d) if d < 0.0 => StaggerDirection::Reverse,
                        _ => StaggerDirection::Forward,
                    };
                }
                property => {
                    if let Some(nested) = value.as_object() {
                        transition
                            .properties
                            .insert(canonical_key(property), TransitionSpec::from_json(nested, default));
                    }
                }
            }
        }
        if has_orchestration {
            transition.orchestration = Some(orchestration);
        }
        Some(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_spec_for_prefers_property_override() {
        let transition = Transition::new(TransitionSpec::new(200.0))
            .with_property("backgroundColor", TransitionSpec::new(50.0));

        let fallback = TransitionSpec::new(999.0);
        assert_eq!(transition.spec_for("background-color", fallback).duration_ms, 50.0);
        assert_eq!(transition.spec_for("opacity", fallback).duration_ms, 200.0);
        assert_eq!(Transition::default().spec_for("opacity", fallback).duration_ms, 999.0);
    }

    #[test]
    fn test_child_delay_forward_and_reverse() {
        let forward = Orchestration {
            delay_children: DelayChildren::Fixed(100.0),
            stagger_children_ms: 50.0,
            ..Orchestration::default()
        };
        assert_eq!(forward.child_delay(0, 3), 100.0);
        assert_eq!(forward.child_delay(2, 3), 200.0);

        let reverse = Orchestration {
            stagger_direction: StaggerDirection::Reverse,
            ..forward
        };
        assert_eq!(reverse.child_delay(0, 3), 200.0);
        assert_eq!(reverse.child_delay(2, 3), 100.0);
    }

    #[test]
    fn test_custom_delay_children() {
        let orchestration = Orchestration {
            delay_children: DelayChildren::custom(|index, total| (total - index) as f64 * 10.0),
            ..Orchestration::default()
        };
        assert_eq!(orchestration.child_delay(1, 4), 30.0);
    }

    #[test]
    fn test_from_json() {
        let transition = Transition::from_json(
            &json!({
                "duration": 400,
                "ease": "linear",
                "opacity": { "duration": 100 },
                "when": "afterChildren",
                "staggerChildren": 25,
                "staggerDirection": -1
            }),
            TransitionSpec::default(),
        )
        .unwrap();

        let default = transition.default.unwrap();
        assert_eq!(default.duration_ms, 400.0);
        assert_eq!(default.easing, EasingFunction::Linear);

        let opacity = transition.properties["opacity"];
        assert_eq!(opacity.duration_ms, 100.0);
        assert_eq!(opacity.easing, EasingFunction::Linear);

        let orchestration = transition.orchestration.unwrap();
        assert_eq!(orchestration.when, When::AfterChildren);
        assert_eq!(orchestration.stagger_children_ms, 25.0);
        assert_eq!(orchestration.stagger_direction, StaggerDirection::Reverse);
    }

    #[test]
    fn test_spec_from_config() {
        let config = glide_config::GlideConfig::default();
        let spec = TransitionSpec::from_animation_config(&config.animation);
        assert_eq!(spec.duration_ms, 300.0);
        assert_eq!(spec.easing, EasingFunction::EaseOut);
    }
}
