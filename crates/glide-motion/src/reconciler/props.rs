use std::collections::BTreeMap;
use std::rc::Rc;

use crate::projection::LayoutMode;
use crate::style::canonical_key;
use crate::transition::{Transition, TransitionSpec};
use crate::value::Value;
use crate::variants::{Definition, Variants};

use super::LayerType;

/// Where a node starts when it mounts.
#[derive(Debug, Clone, PartialEq)]
pub enum Initial {
    /// Start at this definition's values and animate to `animate`.
    Definition(Definition),
    /// Start directly at the `animate` target without animating.
    Disabled,
}

impl From<Definition> for Initial {
    fn from(definition: Definition) -> Self {
        Self::Definition(definition)
    }
}

/// Declarative animation props of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionProps {
    pub initial: Option<Initial>,
    pub animate: Option<Definition>,
    pub exit: Option<Definition>,
    pub while_hover: Option<Definition>,
    pub while_tap: Option<Definition>,
    pub while_focus: Option<Definition>,
    pub while_in_view: Option<Definition>,
    pub while_drag: Option<Definition>,
    pub variants: Option<Rc<Variants>>,
    /// Node-level transition, used for keys the active target does not
    /// time itself. A `layout` entry times layout animations.
    pub transition: Option<Transition>,
    /// Whether labels may come from ancestors.
    pub inherit: bool,
    /// Data handed to function definitions.
    pub custom: serde_json::Value,
    /// Static styles, keyed by canonical property name.
    pub style: BTreeMap<String, Value>,
    pub layout: LayoutMode,
    pub layout_id: Option<String>,
    /// Changing any entry snapshots the layout before the host re-lays out.
    pub layout_dependencies: Vec<serde_json::Value>,
}

impl Default for MotionProps {
    fn default() -> Self {
        Self {
            initial: None,
            animate: None,
            exit: None,
            while_hover: None,
            while_tap: None,
            while_focus: None,
            while_in_view: None,
            while_drag: None,
            variants: None,
            transition: None,
            inherit: true,
            custom: serde_json::Value::Null,
            style: BTreeMap::new(),
            layout: LayoutMode::None,
            layout_id: None,
            layout_dependencies: Vec::new(),
        }
    }
}

impl MotionProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial(mut self, initial: impl Into<Definition>) -> Self {
        self.initial = Some(Initial::Definition(initial.into()));
        self
    }

    pub fn no_initial(mut self) -> Self {
        self.initial = Some(Initial::Disabled);
        self
    }

    pub fn animate(mut self, definition: impl Into<Definition>) -> Self {
        self.animate = Some(definition.into());
        self
    }

    pub fn exit(mut self, definition: impl Into<Definition>) -> Self {
        self.exit = Some(definition.into());
        self
    }

    pub fn while_hover(mut self, definition: impl Into<Definition>) -> Self {
        self.while_hover = Some(definition.into());
        self
    }

    pub fn while_tap(mut self, definition: impl Into<Definition>) -> Self {
        self.while_tap = Some(definition.into());
        self
    }

    pub fn while_focus(mut self, definition: impl Into<Definition>) -> Self {
        self.while_focus = Some(definition.into());
        self
    }

    pub fn while_in_view(mut self, definition: impl Into<Definition>) -> Self {
        self.while_in_view = Some(definition.into());
        self
    }

    pub fn while_drag(mut self, definition: impl Into<Definition>) -> Self {
        self.while_drag = Some(definition.into());
        self
    }

    pub fn variants(mut self, variants: Variants) -> Self {
        self.variants = Some(Rc::new(variants));
        self
    }

    pub fn transition(mut self, transition: Transition) -> Self {
        self.transition = Some(transition);
        self
    }

    pub fn inherit(mut self, inherit: bool) -> Self {
        self.inherit = inherit;
        self
    }

    pub fn custom(mut self, custom: serde_json::Value) -> Self {
        self.custom = custom;
        self
    }

    pub fn style(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.style.insert(canonical_key(key), value.into());
        self
    }

    pub fn layout(mut self, mode: LayoutMode) -> Self {
        self.layout = mode;
        self
    }

    pub fn layout_id(mut self, layout_id: impl Into<String>) -> Self {
        self.layout_id = Some(layout_id.into());
        self
    }

    pub fn layout_dependencies(mut self, dependencies: Vec<serde_json::Value>) -> Self {
        self.layout_dependencies = dependencies;
        self
    }

    /// Declared definition for `layer`.
    pub fn definition(&self, layer: LayerType) -> Option<&Definition> {
        match layer {
            LayerType::Base => self.animate.as_ref(),
            LayerType::InView => self.while_in_view.as_ref(),
            LayerType::Focus => self.while_focus.as_ref(),
            LayerType::Hover => self.while_hover.as_ref(),
            LayerType::Tap => self.while_tap.as_ref(),
            LayerType::Drag => self.while_drag.as_ref(),
            LayerType::Exit => self.exit.as_ref(),
        }
    }

    /// Whether the node takes part in layout projection.
    pub fn layout_enabled(&self) -> bool {
        self.layout.is_enabled() || self.layout_id.is_some()
    }

    /// Transition for layout animations, if one was declared.
    pub fn layout_transition(&self) -> Option<TransitionSpec> {
        self.transition
            .as_ref()
            .and_then(|t| t.properties.get("layout").copied())
    }

    /// Parse props from JSON using the usual prop names (`initial`,
    /// `animate`, `whileHover`, `layoutId`, ...). `initial: false` disables
    /// the mount animation; `layout` is `true` or `"position"`.
    pub fn from_json(json: &serde_json::Value, fallback: TransitionSpec) -> Option<Self> {
        let map = json.as_object()?;
        let definition = |name: &str| {
            map.get(name)
                .and_then(|value| Definition::from_json(value, fallback))
        };

        let mut props = MotionProps {
            initial: match map.get("initial") {
                Some(serde_json::Value::Bool(false)) => Some(Initial::Disabled),
                Some(value) => Definition::from_json(value, fallback).map(Initial::Definition),
                None => None,
            },
            animate: definition("animate"),
            exit: definition("exit"),
            while_hover: definition("whileHover"),
            while_tap: definition("whileTap"),
            while_focus: definition("whileFocus"),
            while_in_view: definition("whileInView"),
            while_drag: definition("whileDrag"),
            variants: map
                .get("variants")
                .and_then(|v| Variants::from_json(v, fallback))
                .map(Rc::new),
            transition: map
                .get("transition")
                .and_then(|t| Transition::from_json(t, fallback)),
            inherit: map.get("inherit").and_then(|v| v.as_bool()).unwrap_or(true),
            custom: map.get("custom").cloned().unwrap_or_default(),
            layout: match map.get("layout") {
                Some(serde_json::Value::Bool(true)) => LayoutMode::Full,
                Some(serde_json::Value::String(mode)) if mode == "position" => LayoutMode::Position,
                _ => LayoutMode::None,
            },
            layout_id: map
                .get("layoutId")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            layout_dependencies: map
                .get("layoutDependencies")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default(),
            ..MotionProps::default()
        };
        if let Some(style) = map.get("style").and_then(|s| s.as_object()) {
            for (key, value) in style {
                if let Some(value) = Value::from_json(value) {
                    props.style.insert(canonical_key(key), value);
                }
            }
        }
        Some(props)
    }
}
