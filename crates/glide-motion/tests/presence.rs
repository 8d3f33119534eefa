use anyhow::Result;
use glide_config::GlideConfig;
use glide_motion::{
    AnimationDriver, AnimationRequest, AnimationTarget, Completion, Controls, DetachedElement,
    EasingFunction, ElementHandle, LayoutBox, MotionEvent, MotionNode, MotionProps, MotionRuntime, PresenceMode,
    Transition, TransitionSpec,
};
use std::cell::RefCell;
use std::rc::Rc;

fn config() -> GlideConfig {
    let mut config = GlideConfig::default();
    config.animation.duration_ms = 100.0;
    config.animation.easing = "linear".to_string();
    config.presence.exit_timeout_ms = 500.0;
    config
}

fn fade_out() -> MotionProps {
    MotionProps::new()
        .no_initial()
        .animate(AnimationTarget::new().with("opacity", 1.0))
        .exit(AnimationTarget::new().with("opacity", 0.0))
}

fn mount_at(runtime: &MotionRuntime, rect: (f64, f64, f64, f64), props: MotionProps) -> (Rc<DetachedElement>, MotionNode) {
    let el = Rc::new(DetachedElement::new(LayoutBox::from_rect(rect.0, rect.1, rect.2, rect.3)));
    let node = runtime.mount(el.clone(), props, None);
    (el, node)
}

fn exit_events(runtime: &MotionRuntime) -> Vec<(String, bool)> {
    runtime
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            MotionEvent::ExitComplete { key, forced } => Some((key, forced)),
            _ => None,
        })
        .collect()
}

/// Driver whose animations never finish.
struct StalledDriver {
    started: RefCell<usize>,
}

impl AnimationDriver for StalledDriver {
    fn animate(&self, _request: AnimationRequest) -> Controls {
        *self.started.borrow_mut() += 1;
        Controls::new(Completion::new(), || {})
    }
}

#[test]
fn child_without_exit_is_removed_at_once() -> Result<()> {
    let runtime = MotionRuntime::new(&config());
    let group = runtime.presence(PresenceMode::Sync);
    let (_, node) = mount_at(&runtime, (0.0, 0.0, 10.0, 10.0), MotionProps::new());
    group.register_node("a", node.clone())?;
    group.render(["a"]);

    group.render(Vec::<String>::new());
    assert!(!node.is_mounted());
    assert!(group.exiting().is_empty());
    assert_eq!(exit_events(&runtime), vec![("a".to_string(), false)]);
    Ok(())
}

#[test]
fn exiting_child_stays_until_animation_settles() -> Result<()> {
    let runtime = MotionRuntime::new(&config());
    let group = runtime.presence(PresenceMode::Sync);
    let removed = Rc::new(RefCell::new(Vec::new()));
    let sink = removed.clone();
    group.on_remove(move |key| sink.borrow_mut().push(key.to_string()));

    let (_, node) = mount_at(&runtime, (0.0, 0.0, 10.0, 10.0), fade_out());
    group.register_node("a", node.clone())?;
    group.render(["a"]);
    group.render(Vec::<String>::new());

    assert!(node.is_mounted());
    assert!(node.is_exiting());
    assert_eq!(group.exiting(), vec!["a"]);
    assert!(group.rendered().is_empty());

    runtime.tick(50.0);
    assert!(node.is_mounted());

    runtime.tick(50.0);
    assert!(!node.is_mounted());
    assert_eq!(*removed.borrow(), vec!["a"]);
    assert_eq!(exit_events(&runtime), vec![("a".to_string(), false)]);
    assert_eq!(runtime.scheduler().pending_timers(), 0);
    Ok(())
}

#[test]
fn returning_child_cancels_its_exit() -> Result<()> {
    let runtime = MotionRuntime::new(&config());
    let group = runtime.presence(PresenceMode::Sync);
    let (_, node) = mount_at(&runtime, (0.0, 0.0, 10.0, 10.0), fade_out());
    group.register_node("a", node.clone())?;
    group.render(["a"]);

    group.render(Vec::<String>::new());
    runtime.tick(50.0);
    group.render(["a"]);

    assert!(!node.is_exiting());
    assert_eq!(group.pending_exit_count(), 0);
    runtime.tick(1000.0);
    assert!(node.is_mounted());
    assert!(exit_events(&runtime).is_empty());
    Ok(())
}

#[test]
fn safety_timeout_forces_removal() -> Result<()> {
    let driver = Rc::new(StalledDriver {
        started: RefCell::new(0),
    });
    let runtime = MotionRuntime::with_driver(&config(), driver.clone());
    let group = runtime.presence(PresenceMode::Sync);
    let (_, node) = mount_at(&runtime, (0.0, 0.0, 10.0, 10.0), fade_out());
    group.register_node("a", node.clone())?;
    group.render(["a"]);
    group.render(Vec::<String>::new());
    assert_eq!(*driver.started.borrow(), 1);

    runtime.tick(400.0);
    assert!(node.is_mounted());

    runtime.tick(200.0);
    assert!(!node.is_mounted());
    assert_eq!(exit_events(&runtime), vec![("a".to_string(), true)]);
    Ok(())
}

#[test]
fn wait_mode_shows_only_the_latest_entrant() -> Result<()> {
    let runtime = MotionRuntime::new(&config());
    let group = runtime.presence(PresenceMode::Wait);
    let (_, node) = mount_at(&runtime, (0.0, 0.0, 10.0, 10.0), fade_out());
    group.register_node("a", node)?;
    group.render(["a"]);

    group.render(["b"]);
    assert!(group.rendered().is_empty());
    assert_eq!(group.queued(), Some(vec!["b".to_string()]));

    group.render(["c"]);
    assert_eq!(group.queued(), Some(vec!["c".to_string()]));

    runtime.tick(100.0);
    assert_eq!(group.rendered(), vec!["c"]);
    assert_eq!(group.queued(), None);
    Ok(())
}

#[test]
fn duplicate_keys_are_rejected() -> Result<()> {
    let runtime = MotionRuntime::new(&config());
    let group = runtime.presence(PresenceMode::Sync);
    let (_, first) = mount_at(&runtime, (0.0, 0.0, 10.0, 10.0), MotionProps::new());
    let (_, second) = mount_at(&runtime, (0.0, 0.0, 10.0, 10.0), MotionProps::new());

    group.register_node("a", first.clone())?;
    group.register_node("a", first)?;
    assert!(group.register_node("a", second).is_err());
    Ok(())
}

#[test]
fn pop_layout_root_is_restored_after_last_exit() -> Result<()> {
    let runtime = MotionRuntime::new(&config());
    let group = runtime.presence(PresenceMode::PopLayout);
    let root = Rc::new(DetachedElement::new(LayoutBox::from_rect(10.0, 20.0, 300.0, 300.0)));
    group.set_pop_layout_root(root.clone());

    let slow = fade_out().exit(
        AnimationTarget::new()
            .with("opacity", 0.0)
            .with_transition(Transition::new(
                TransitionSpec::new(200.0).with_easing(EasingFunction::Linear),
            )),
    );
    let (a_el, a) = mount_at(&runtime, (10.0, 60.0, 100.0, 40.0), fade_out());
    let (_, b) = mount_at(&runtime, (10.0, 100.0, 100.0, 40.0), slow);
    group.register_node("a", a.clone())?;
    group.register_node("b", b.clone())?;
    group.render(["a", "b"]);

    group.render(Vec::<String>::new());
    assert_eq!(a_el.style("position").as_deref(), Some("absolute"));
    assert_eq!(a_el.style("top").as_deref(), Some("40px"));
    assert_eq!(a_el.style("left").as_deref(), Some("0px"));
    assert_eq!(a_el.style("width").as_deref(), Some("100px"));
    assert_eq!(root.style("position").as_deref(), Some("relative"));
    assert_eq!(root.style("min-height").as_deref(), Some("300px"));

    runtime.tick(100.0);
    assert!(!a.is_mounted());
    assert!(b.is_mounted());
    assert_eq!(root.style("position").as_deref(), Some("relative"));

    runtime.tick(100.0);
    assert!(!b.is_mounted());
    assert_eq!(root.style("position"), None);
    assert_eq!(root.style("min-width"), None);
    assert_eq!(root.style("min-height"), None);
    Ok(())
}

#[test]
fn returning_popped_child_goes_back_into_flow() -> Result<()> {
    let runtime = MotionRuntime::new(&config());
    let group = runtime.presence(PresenceMode::PopLayout);
    let root = Rc::new(DetachedElement::new(LayoutBox::from_rect(10.0, 20.0, 300.0, 300.0)));
    group.set_pop_layout_root(root.clone());

    let (el, node) = mount_at(&runtime, (10.0, 60.0, 100.0, 40.0), fade_out());
    el.set_style("width", Some("50%"));
    group.register_node("a", node.clone())?;
    group.render(["a"]);

    group.render(Vec::<String>::new());
    assert_eq!(el.style("position").as_deref(), Some("absolute"));
    assert_eq!(el.style("width").as_deref(), Some("100px"));

    runtime.tick(30.0);
    group.render(["a"]);
    assert_eq!(el.style("position"), None);
    assert_eq!(el.style("top"), None);
    assert_eq!(el.style("left"), None);
    assert_eq!(el.style("height"), None);
    assert_eq!(el.style("width").as_deref(), Some("50%"));
    assert_eq!(root.style("position"), None);

    runtime.tick(500.0);
    assert!(node.is_mounted());
    assert!(!node.is_exiting());
    assert_eq!(el.style("position"), None);
    Ok(())
}

#[test]
fn nested_group_exits_run_before_owner_is_removed() -> Result<()> {
    let runtime = MotionRuntime::new(&config());
    let outer = runtime.presence(PresenceMode::Sync);
    let (_, panel) = mount_at(&runtime, (0.0, 0.0, 100.0, 100.0), MotionProps::new());
    outer.register_node("panel", panel.clone())?;
    outer.render(["panel"]);

    let inner = runtime.presence(PresenceMode::Sync).with_propagate(true);
    inner.attach_to(&panel);
    let (_, item) = mount_at(&runtime, (0.0, 0.0, 10.0, 10.0), fade_out());
    inner.register_node("item", item.clone())?;
    inner.render(["item"]);

    outer.render(Vec::<String>::new());
    assert!(panel.is_mounted());
    assert!(item.is_exiting());

    runtime.tick(100.0);
    assert!(!panel.is_mounted());
    assert_eq!(exit_events(&runtime), vec![("panel".to_string(), false)]);
    Ok(())
}

#[test]
fn nested_group_without_propagation_does_not_delay_owner() -> Result<()> {
    let runtime = MotionRuntime::new(&config());
    let outer = runtime.presence(PresenceMode::Sync);
    let (_, panel) = mount_at(&runtime, (0.0, 0.0, 100.0, 100.0), MotionProps::new());
    outer.register_node("panel", panel.clone())?;
    outer.render(["panel"]);

    let inner = runtime.presence(PresenceMode::Sync);
    inner.attach_to(&panel);
    let (_, item) = mount_at(&runtime, (0.0, 0.0, 10.0, 10.0), fade_out());
    inner.register_node("item", item.clone())?;
    inner.render(["item"]);

    outer.render(Vec::<String>::new());
    assert!(!panel.is_mounted());
    assert!(!item.is_exiting());
    Ok(())
}
