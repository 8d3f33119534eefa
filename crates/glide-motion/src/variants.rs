//! Variant resolution.
//!
//! A *definition* says what a node should look like for one animation
//! layer. It is either a concrete [`AnimationTarget`], a variant label, a
//! list of labels, or a function of custom data and current values.
//! [`resolve`] turns any of these into a concrete target.
//!
//! Labels are looked up in the node's own variants first and then, when
//! inheritance is enabled, in each ancestor's variants in turn. A label
//! seen twice during one resolution resolves to nothing instead of
//! looping.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

use crate::style::canonical_key;
use crate::transition::{Transition, TransitionSpec};
use crate::value::{Keyframes, Value};

/// Concrete property values to animate to.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnimationTarget {
    /// Keyframes per canonical property key.
    pub values: BTreeMap<String, Keyframes>,
    pub transition: Option<Transition>,
    /// Values written once the animation completes.
    pub transition_end: BTreeMap<String, Value>,
}

impl AnimationTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, keyframes: impl Into<Keyframes>) -> Self {
        let keyframes = keyframes.into();
        if !keyframes.is_empty() {
            self.values.insert(canonical_key(key), keyframes);
        }
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transition = Some(transition);
        self
    }

    pub fn with_transition_end(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.transition_end.insert(canonical_key(key), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.transition_end.is_empty()
    }

    /// Right-biased merge: keys in `other` replace keys in `self`, the
    /// transition is taken from `other` when it has one, and
    /// `transition_end` maps are unioned with `other` winning.
    pub fn merge(mut self, other: AnimationTarget) -> AnimationTarget {
        self.values.extend(other.values);
        if other.transition.is_some() {
            self.transition = other.transition;
        }
        self.transition_end.extend(other.transition_end);
        self
    }

    /// Build a target from a JSON object. `transition` and `transitionEnd`
    /// are special keys; every other key is a property whose value is a
    /// number, a string, or an array of those. Keys with no usable value
    /// are dropped.
    pub fn from_json(json: &serde_json::Value, fallback: TransitionSpec) -> Option<Self> {
        let map = json.as_object()?;
        let mut target = AnimationTarget::new();
        for (key, value) in map {
            match key.as_str() {
                "transition" => target.transition = Transition::from_json(value, fallback),
                "transitionEnd" => {
                    if let Some(end) = value.as_object() {
                        target.transition_end = end
                            .iter()
                            .filter_map(|(k, v)| Some((canonical_key(k), Value::from_json(v)?)))
                            .collect();
                    }
                }
                property => match Keyframes::from_json(value) {
                    Some(frames) => {
                        target.values.insert(canonical_key(property), frames);
                    }
                    None => trace!(key = property, "dropping unsupported keyframe value"),
                },
            }
        }
        Some(target)
    }
}

/// Data handed to function definitions.
#[derive(Debug, Clone, Copy)]
pub struct ResolveInput<'a> {
    pub custom: &'a serde_json::Value,
    pub current: &'a BTreeMap<String, Value>,
    pub velocity: &'a BTreeMap<String, f64>,
}

/// What a function definition may return.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Target(AnimationTarget),
    Label(String),
    Labels(Vec<String>),
    Nothing,
}

pub type ResolverFn = Rc<dyn Fn(&ResolveInput<'_>) -> Resolution>;

/// Declarative description of one layer's target.
#[derive(Clone)]
pub enum Definition {
    Target(AnimationTarget),
    Label(String),
    Labels(Vec<String>),
    Resolver(ResolverFn),
}

impl Definition {
    pub fn label(label: impl Into<String>) -> Self {
        Self::Label(label.into())
    }

    pub fn labels<S: Into<String>>(labels: impl IntoIterator<Item = S>) -> Self {
        Self::Labels(labels.into_iter().map(Into::into).collect())
    }

    pub fn resolver(f: impl Fn(&ResolveInput<'_>) -> Resolution + 'static) -> Self {
        Self::Resolver(Rc::new(f))
    }

    /// True for label based definitions, which children may inherit.
    pub fn is_label(&self) -> bool {
        matches!(self, Self::Label(_) | Self::Labels(_))
    }

    /// A string is a label, an array of strings is a list of labels, and an
    /// object is a target.
    pub fn from_json(json: &serde_json::Value, fallback: TransitionSpec) -> Option<Self> {
        match json {
            serde_json::Value::String(label) => Some(Self::Label(label.clone())),
            serde_json::Value::Array(items) => {
                let labels: Vec<String> = items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                Some(Self::Labels(labels))
            }
            serde_json::Value::Object(_) => {
                AnimationTarget::from_json(json, fallback).map(Self::Target)
            }
            _ => None,
        }
    }
}

impl From<AnimationTarget> for Definition {
    fn from(target: AnimationTarget) -> Self {
        Self::Target(target)
    }
}

impl From<&str> for Definition {
    fn from(label: &str) -> Self {
        Self::Label(label.to_string())
    }
}

impl PartialEq for Definition {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Target(a), Self::Target(b)) => a == b,
            (Self::Label(a), Self::Label(b)) => a == b,
            (Self::Labels(a), Self::Labels(b)) => a == b,
            (Self::Resolver(a), Self::Resolver(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Target(t) => f.debug_tuple("Target").field(t).finish(),
            Self::Label(l) => f.debug_tuple("Label").field(l).finish(),
            Self::Labels(l) => f.debug_tuple("Labels").field(l).finish(),
            Self::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// Named definitions declared on a node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Variants {
    entries: HashMap<String, Definition>,
}

impl Variants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, label: &str, definition: impl Into<Definition>) -> Self {
        self.entries.insert(label.to_string(), definition.into());
        self
    }

    pub fn get(&self, label: &str) -> Option<&Definition> {
        self.entries.get(label)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse `{ "label": definition, ... }`.
    pub fn from_json(json: &serde_json::Value, fallback: TransitionSpec) -> Option<Self> {
        let map = json.as_object()?;
        let entries = map
            .iter()
            .filter_map(|(label, def)| Some((label.clone(), Definition::from_json(def, fallback)?)))
            .collect();
        Some(Self { entries })
    }
}

/// A node's variants linked to its ancestors' scopes.
#[derive(Debug, Default)]
pub struct VariantScope {
    variants: Option<Rc<Variants>>,
    parent: Option<Rc<VariantScope>>,
}

impl VariantScope {
    pub fn root(variants: Option<Rc<Variants>>) -> Rc<Self> {
        Rc::new(Self {
            variants,
            parent: None,
        })
    }

    pub fn child(parent: &Rc<VariantScope>, variants: Option<Rc<Variants>>) -> Rc<Self> {
        Rc::new(Self {
            variants,
            parent: Some(parent.clone()),
        })
    }

    /// Find `label` locally, then (if `inherit`) in the nearest ancestor
    /// that declares it.
    pub fn lookup(&self, label: &str, inherit: bool) -> Option<&Definition> {
        let local = self.variants.as_ref().and_then(|v| v.get(label));
        if local.is_some() || !inherit {
            return local;
        }
        let mut scope = self.parent.as_deref();
        while let Some(current) = scope {
            if let Some(found) = current.variants.as_ref().and_then(|v| v.get(label)) {
                return Some(found);
            }
            scope = current.parent.as_deref();
        }
        None
    }
}

/// Resolve `definition` to a concrete target, or `None` when it names no
/// known variant.
pub fn resolve(
    definition: &Definition,
    scope: &VariantScope,
    inherit: bool,
    input: &ResolveInput<'_>,
) -> Option<AnimationTarget> {
    let mut visited = HashSet::new();
    resolve_definition(definition, scope, inherit, input, &mut visited)
}

fn resolve_definition(
    definition: &Definition,
    scope: &VariantScope,
    inherit: bool,
    input: &ResolveInput<'_>,
    visited: &mut HashSet<String>,
) -> Option<AnimationTarget> {
    match definition {
        Definition::Target(target) => Some(target.clone()),
        Definition::Label(label) => resolve_label(label, scope, inherit, input, visited),
        Definition::Labels(labels) => resolve_labels(labels, scope, inherit, input, visited),
        Definition::Resolver(f) => match f(input) {
            Resolution::Target(target) => Some(target),
            Resolution::Label(label) => resolve_label(&label, scope, inherit, input, visited),
            Resolution::Labels(labels) => resolve_labels(&labels, scope, inherit, input, visited),
            Resolution::Nothing => None,
        },
    }
}

fn resolve_label(
    label: &str,
    scope: &VariantScope,
    inherit: bool,
    input: &ResolveInput<'_>,
    visited: &mut HashSet<String>,
) -> Option<AnimationTarget> {
    if !visited.insert(label.to_string()) {
        debug!(label, "variant cycle detected");
        return None;
    }
    let Some(definition) = scope.lookup(label, inherit) else {
        trace!(label, "unknown variant label");
        return None;
    };
    resolve_definition(definition, scope, inherit, input, visited)
}

fn resolve_labels(
    labels: &[String],
    scope: &VariantScope,
    inherit: bool,
    input: &ResolveInput<'_>,
    visited: &mut HashSet<String>,
) -> Option<AnimationTarget> {
    let mut merged: Option<AnimationTarget> = None;
    for label in labels {
        // Each label gets its own cycle tracking so listing the same
        // variant twice is not a cycle.
        let mut branch = visited.clone();
        if let Some(target) = resolve_label(label, scope, inherit, input, &mut branch) {
            merged = Some(match merged {
                Some(acc) => acc.merge(target),
                None => target,
            });
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input_parts() -> (serde_json::Value, BTreeMap<String, Value>, BTreeMap<String, f64>) {
        (serde_json::Value::Null, BTreeMap::new(), BTreeMap::new())
    }

    #[test]
    fn test_label_resolves_locally() {
        let variants = Variants::new().with("visible", AnimationTarget::new().with("opacity", 1.0));
        let scope = VariantScope::root(Some(Rc::new(variants)));
        let (custom, current, velocity) = input_parts();
        let input = ResolveInput { custom: &custom, current: &current, velocity: &velocity };

        let target = resolve(&Definition::label("visible"), &scope, true, &input).unwrap();
        assert_eq!(target.values["opacity"], Keyframes::single(1.0));
        assert!(resolve(&Definition::label("missing"), &scope, true, &input).is_none());
    }

    #[test]
    fn test_label_walks_ancestors_when_inheriting() {
        let parent_variants = Variants::new().with("open", AnimationTarget::new().with("x", 100.0));
        let parent = VariantScope::root(Some(Rc::new(parent_variants)));
        let child = VariantScope::child(&parent, None);
        let (custom, current, velocity) = input_parts();
        let input = ResolveInput { custom: &custom, current: &current, velocity: &velocity };

        assert!(resolve(&Definition::label("open"), &child, true, &input).is_some());
        assert!(resolve(&Definition::label("open"), &child, false, &input).is_none());
    }

    #[test]
    fn test_cycle_resolves_to_none() {
        let variants = Variants::new()
            .with("a", Definition::label("b"))
            .with("b", Definition::label("a"));
        let scope = VariantScope::root(Some(Rc::new(variants)));
        let (custom, current, velocity) = input_parts();
        let input = ResolveInput { custom: &custom, current: &current, velocity: &velocity };

        assert!(resolve(&Definition::label("a"), &scope, true, &input).is_none());
    }

    #[test]
    fn test_label_list_merges_right_biased() {
        let variants = Variants::new()
            .with(
                "base",
                AnimationTarget::new()
                    .with("opacity", 0.5)
                    .with("x", 0.0)
                    .with_transition_end("display", "block")
                    .with_transition_end("visibility", "visible"),
            )
            .with(
                "highlight",
                AnimationTarget::new()
                    .with("opacity", 1.0)
                    .with_transition_end("display", "flex"),
            );
        let scope = VariantScope::root(Some(Rc::new(variants)));
        let (custom, current, velocity) = input_parts();
        let input = ResolveInput { custom: &custom, current: &current, velocity: &velocity };

        let target = resolve(&Definition::labels(["base", "highlight"]), &scope, true, &input).unwrap();
        assert_eq!(target.values["opacity"], Keyframes::single(1.0));
        assert_eq!(target.values["x"], Keyframes::single(0.0));
        assert_eq!(target.transition_end["display"], Value::from("flex"));
        assert_eq!(target.transition_end["visibility"], Value::from("visible"));
    }

    #[test]
    fn test_resolver_uses_custom_data_and_may_return_label() {
        let variants = Variants::new()
            .with(
                "slide",
                Definition::resolver(|input| {
                    let index = input.custom.as_f64().unwrap_or(0.0);
                    Resolution::Target(AnimationTarget::new().with("x", index * 10.0))
                }),
            )
            .with("alias", Definition::resolver(|_| Resolution::Label("slide".into())));
        let scope = VariantScope::root(Some(Rc::new(variants)));
        let custom = json!(3);
        let (current, velocity) = (BTreeMap::new(), BTreeMap::new());
        let input = ResolveInput { custom: &custom, current: &current, velocity: &velocity };

        let target = resolve(&Definition::label("alias"), &scope, true, &input).unwrap();
        assert_eq!(target.values["x"], Keyframes::single(30.0));
    }

    #[test]
    fn test_target_from_json_drops_invalid_keys() {
        let target = AnimationTarget::from_json(
            &json!({
                "opacity": [0, 1],
                "backgroundColor": "red",
                "visible": true,
                "transition": { "duration": 120 },
                "transitionEnd": { "display": "none" }
            }),
            TransitionSpec::default(),
        )
        .unwrap();

        assert_eq!(target.values.len(), 2);
        assert!(target.values.contains_key("background-color"));
        assert_eq!(target.transition.unwrap().default.unwrap().duration_ms, 120.0);
        assert_eq!(target.transition_end["display"], Value::from("none"));
    }

    #[test]
    fn test_definition_from_json() {
        let fallback = TransitionSpec::default();
        assert_eq!(Definition::from_json(&json!("open"), fallback), Some(Definition::label("open")));
        assert_eq!(
            Definition::from_json(&json!(["a", "b"]), fallback),
            Some(Definition::labels(["a", "b"]))
        );
        assert_eq!(Definition::from_json(&json!(5), fallback), None);
    }
}
