//! Host element interface.
//!
//! The engine never touches a real DOM. It talks to mounted elements
//! through [`ElementHandle`], which the host UI layer implements.
//! [`DetachedElement`] is an in-memory element used by the demo binary and
//! the test suite.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;

use crate::geometry::LayoutBox;

/// A mounted element as seen by the engine.
pub trait ElementHandle {
    /// Layout box in page coordinates, ignoring any `transform` currently
    /// applied to the element or its ancestors.
    fn measure(&self) -> LayoutBox;

    /// Set an inline style property, or remove it with `None`.
    fn set_style(&self, name: &str, value: Option<&str>);

    /// Current value of a style property as the host resolves it.
    fn read_style(&self, name: &str) -> Option<String>;
}

/// In-memory element with a settable layout box.
///
/// Counts measurements and style writes so callers can observe batching
/// and write suppression.
#[derive(Default)]
pub struct DetachedElement {
    layout: Cell<LayoutBox>,
    styles: RefCell<BTreeMap<String, String>>,
    computed: RefCell<BTreeMap<String, String>>,
    measurements: Cell<usize>,
    style_writes: Cell<usize>,
}

impl DetachedElement {
    pub fn new(layout: LayoutBox) -> Self {
        Self {
            layout: Cell::new(layout),
            ..Self::default()
        }
    }

    /// Move or resize the element (what a host re-layout would do).
    pub fn set_layout(&self, layout: LayoutBox) {
        self.layout.set(layout);
    }

    /// Seed a value returned by `read_style` when no inline style is set,
    /// standing in for the host's computed style.
    pub fn set_computed(&self, name: &str, value: &str) {
        self.computed
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
    }

    /// Inline style currently set on the element.
    pub fn style(&self, name: &str) -> Option<String> {
        self.styles.borrow().get(name).cloned()
    }

    /// Snapshot of every inline style.
    pub fn styles(&self) -> BTreeMap<String, String> {
        self.styles.borrow().clone()
    }

    pub fn measurements(&self) -> usize {
        self.measurements.get()
    }

    pub fn style_writes(&self) -> usize {
        self.style_writes.get()
    }
}

impl ElementHandle for DetachedElement {
    fn measure(&self) -> LayoutBox {
        self.measurements.set(self.measurements.get() + 1);
        self.layout.get()
    }

    fn set_style(&self, name: &str, value: Option<&str>) {
        self.style_writes.set(self.style_writes.get() + 1);
        let mut styles = self.styles.borrow_mut();
        match value {
            Some(value) => {
                styles.insert(name.to_string(), value.to_string());
            }
            None => {
                styles.remove(name);
            }
        }
    }

    fn read_style(&self, name: &str) -> Option<String> {
        self.styles
            .borrow()
            .get(name)
            .cloned()
            .or_else(|| self.computed.borrow().get(name).cloned())
    }
}

impl fmt::Debug for DetachedElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetachedElement")
            .field("layout", &self.layout.get())
            .field("styles", &self.styles.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_style_prefers_inline() {
        let element = DetachedElement::new(LayoutBox::from_rect(0.0, 0.0, 10.0, 10.0));
        element.set_computed("opacity", "1");
        assert_eq!(element.read_style("opacity").as_deref(), Some("1"));

        element.set_style("opacity", Some("0.25"));
        assert_eq!(element.read_style("opacity").as_deref(), Some("0.25"));

        element.set_style("opacity", None);
        assert_eq!(element.read_style("opacity").as_deref(), Some("1"));
    }

    #[test]
    fn test_measure_counts() {
        let element = DetachedElement::new(LayoutBox::from_rect(0.0, 0.0, 10.0, 10.0));
        element.set_layout(LayoutBox::from_rect(5.0, 0.0, 10.0, 10.0));
        assert_eq!(element.measure().x.min, 5.0);
        assert_eq!(element.measurements(), 1);
    }
}
