//! The engine instance a host drives.
//!
//! A [`MotionRuntime`] owns everything that would otherwise be global: the
//! scheduler, the animation driver, the projection tree, the event queue
//! and the component cache. Tests and hosts create as many as they like.

use glide_config::GlideConfig;
use std::rc::Rc;
use tracing::debug;

use crate::context::{MotionContext, MotionSettings};
use crate::driver::{AnimationDriver, TweenDriver};
use crate::events::MotionEvent;
use crate::factory::{ComponentFactory, MotionComponent};
use crate::host::ElementHandle;
use crate::presence::{PresenceGroup, PresenceMode};
use crate::projection::ProjectionEngine;
use crate::reconciler::{MotionNode, MotionProps};
use crate::scheduler::Scheduler;

pub struct MotionRuntime {
    ctx: MotionContext,
    factory: ComponentFactory,
}

impl MotionRuntime {
    /// Runtime with the built-in [`TweenDriver`].
    pub fn new(config: &GlideConfig) -> Self {
        Self::with_driver(config, Rc::new(TweenDriver::new()))
    }

    /// Runtime playing animations through `driver`.
    pub fn with_driver(config: &GlideConfig, driver: Rc<dyn AnimationDriver>) -> Self {
        let settings = MotionSettings::from_config(config);
        let scheduler = Scheduler::new(config.layout.max_frame_passes);
        debug!(
            exit_timeout_ms = settings.exit_timeout_ms,
            max_frame_passes = config.layout.max_frame_passes,
            "motion runtime created"
        );
        Self {
            ctx: MotionContext::new(settings, scheduler, driver),
            factory: ComponentFactory::new(),
        }
    }

    /// Mount a node for `element`, under `parent` if given.
    pub fn mount(
        &self,
        element: Rc<dyn ElementHandle>,
        props: MotionProps,
        parent: Option<&MotionNode>,
    ) -> MotionNode {
        MotionNode::mount(self.ctx.clone(), element, props, parent)
    }

    pub fn presence(&self, mode: PresenceMode) -> PresenceGroup {
        PresenceGroup::new(self.ctx.clone(), mode)
    }

    pub fn component(&self, tag: &str) -> Rc<MotionComponent> {
        self.factory.component(tag)
    }

    /// Snapshot layout before the host applies a layout-affecting change.
    pub fn schedule_layout_update(&self) {
        self.ctx.projection.schedule_update();
    }

    /// Advance one frame: fire due timers, step the driver, drain
    /// microtasks, then run frame work (layout flush, projection, render).
    pub fn tick(&self, delta_ms: f64) {
        self.ctx.scheduler.advance(delta_ms);
        self.ctx.driver.tick(delta_ms);
        self.ctx.scheduler.run_microtasks();
        self.ctx.scheduler.run_frame();
    }

    /// Run pending microtasks and frame work without advancing time.
    pub fn flush(&self) {
        self.ctx.scheduler.run_microtasks();
        self.ctx.scheduler.run_frame();
    }

    pub fn drain_events(&self) -> Vec<MotionEvent> {
        self.ctx.events.borrow_mut().drain().collect()
    }

    /// True when nothing is animating and no work or timer is queued.
    pub fn is_idle(&self) -> bool {
        self.ctx.driver.active() == 0
            && !self.ctx.scheduler.has_pending_frame()
            && self.ctx.scheduler.pending_timers() == 0
            && self.ctx.projection.is_idle()
    }

    pub fn scheduler(&self) -> &Scheduler {
        self.ctx.scheduler()
    }

    pub fn projection(&self) -> &ProjectionEngine {
        self.ctx.projection()
    }

    pub fn settings(&self) -> &MotionSettings {
        self.ctx.settings()
    }

    pub fn context(&self) -> &MotionContext {
        &self.ctx
    }
}

impl Default for MotionRuntime {
    fn default() -> Self {
        Self::new(&GlideConfig::default())
    }
}
