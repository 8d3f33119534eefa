//! Tag-keyed component constructors.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::trace;

use crate::host::ElementHandle;
use crate::reconciler::{MotionNode, MotionProps};
use crate::runtime::MotionRuntime;

/// A motion-enabled version of one element tag (`div`, `li`, ...).
#[derive(Debug, PartialEq, Eq)]
pub struct MotionComponent {
    tag: String,
}

impl MotionComponent {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Mount a node for an element of this tag.
    pub fn mount(
        &self,
        runtime: &MotionRuntime,
        element: Rc<dyn ElementHandle>,
        props: MotionProps,
        parent: Option<&MotionNode>,
    ) -> MotionNode {
        trace!(tag = %self.tag, "mounting component");
        runtime.mount(element, props, parent)
    }
}

/// Memoized map from tag to component; asking twice for a tag returns the
/// same component.
#[derive(Debug, Default)]
pub struct ComponentFactory {
    components: RefCell<HashMap<String, Rc<MotionComponent>>>,
}

impl ComponentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn component(&self, tag: &str) -> Rc<MotionComponent> {
        self.components
            .borrow_mut()
            .entry(tag.to_string())
            .or_insert_with(|| {
                Rc::new(MotionComponent {
                    tag: tag.to_string(),
                })
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.components.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
