//! Engine handles shared by every node of one runtime.

use glide_config::GlideConfig;
use std::cell::RefCell;
use std::rc::Rc;

use crate::driver::AnimationDriver;
use crate::events::{EventQueue, MotionEvent};
use crate::presence::PopLayoutRoots;
use crate::projection::ProjectionEngine;
use crate::scheduler::Scheduler;
use crate::transition::TransitionSpec;

/// Defaults resolved from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionSettings {
    /// Used when neither the target nor the node declares a transition.
    pub default_transition: TransitionSpec,
    /// Used for projection animations without an explicit transition.
    pub layout_transition: TransitionSpec,
    /// Safety bound on how long an exiting node stays mounted.
    pub exit_timeout_ms: f64,
}

impl MotionSettings {
    pub fn from_config(config: &GlideConfig) -> Self {
        Self {
            default_transition: TransitionSpec::from_animation_config(&config.animation),
            layout_transition: TransitionSpec::from_layout_config(&config.layout),
            exit_timeout_ms: config.presence.exit_timeout_ms.max(0.0),
        }
    }
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self::from_config(&GlideConfig::default())
    }
}

/// Cheap clonable bundle of the runtime's shared services.
#[derive(Clone)]
pub struct MotionContext {
    pub(crate) scheduler: Scheduler,
    pub(crate) driver: Rc<dyn AnimationDriver>,
    pub(crate) projection: ProjectionEngine,
    pub(crate) events: Rc<RefCell<EventQueue>>,
    pub(crate) settings: Rc<MotionSettings>,
    pub(crate) pop_roots: PopLayoutRoots,
}

impl MotionContext {
    pub fn new(settings: MotionSettings, scheduler: Scheduler, driver: Rc<dyn AnimationDriver>) -> Self {
        let events = Rc::new(RefCell::new(EventQueue::new()));
        let projection = ProjectionEngine::new(
            scheduler.clone(),
            driver.clone(),
            events.clone(),
            settings.layout_transition,
        );
        Self {
            scheduler,
            driver,
            projection,
            events,
            settings: Rc::new(settings),
            pop_roots: PopLayoutRoots::default(),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn projection(&self) -> &ProjectionEngine {
        &self.projection
    }

    pub fn settings(&self) -> &MotionSettings {
        &self.settings
    }

    pub(crate) fn emit(&self, event: MotionEvent) {
        self.events.borrow_mut().push(event);
    }
}
