//! Declarative animation and layout projection for UI element trees.
//!
//! A host mounts [`MotionNode`]s for its elements through a
//! [`MotionRuntime`], hands them [`MotionProps`] describing what each node
//! should look like per interaction layer, and drives time with
//! [`MotionRuntime::tick`]. The engine works out which values to animate,
//! plays them through an [`AnimationDriver`], writes the resulting styles
//! back through [`ElementHandle`], and animates layout changes with
//! inverse transforms (FLIP) when nodes opt into layout projection.
//!
//! ```ignore
//! let runtime = MotionRuntime::new(&GlideConfig::default());
//! let element = Rc::new(DetachedElement::new(LayoutBox::from_rect(0.0, 0.0, 100.0, 40.0)));
//! let node = runtime.mount(
//!     element.clone(),
//!     MotionProps::new()
//!         .initial(AnimationTarget::new().with("opacity", 0.0))
//!         .animate(AnimationTarget::new().with("opacity", 1.0)),
//!     None,
//! );
//! runtime.tick(16.0);
//! ```

pub mod completion;
pub mod context;
pub mod driver;
pub mod easing;
pub mod error;
pub mod events;
pub mod factory;
pub mod geometry;
pub mod host;
pub mod interpolate;
pub mod orchestration;
pub mod presence;
pub mod projection;
pub mod reconciler;
pub mod runtime;
pub mod scale_correction;
pub mod scheduler;
pub mod style;
pub mod transform;
pub mod transition;
pub mod value;
pub mod variants;

pub use completion::{Completion, Outcome};
pub use context::{MotionContext, MotionSettings};
pub use driver::{AnimationDriver, AnimationRequest, Controls, TweenDriver};
pub use easing::EasingFunction;
pub use error::{MotionError, Result};
pub use events::MotionEvent;
pub use factory::{ComponentFactory, MotionComponent};
pub use geometry::{Axis, Delta, LayoutBox};
pub use host::{DetachedElement, ElementHandle};
pub use presence::{PresenceGroup, PresenceMode};
pub use projection::{LayoutMode, LayoutNodeId, LayoutOptions, ProjectionEngine, ProjectionOutput};
pub use reconciler::{ExitParticipant, GestureState, Initial, LayerType, MotionNode, MotionProps, NodeId};
pub use runtime::MotionRuntime;
pub use scheduler::Scheduler;
pub use transition::{DelayChildren, Orchestration, StaggerDirection, Transition, TransitionSpec, When};
pub use value::{Keyframes, MotionValue, Value};
pub use variants::{AnimationTarget, Definition, Resolution, Variants};
