use anyhow::Result;
use glide_config::GlideConfig;
use glide_motion::{
    DetachedElement, LayoutBox, LayoutMode, MotionEvent, MotionNode, MotionProps, MotionRuntime,
};
use std::rc::Rc;

fn config() -> GlideConfig {
    let mut config = GlideConfig::default();
    config.layout.duration_ms = 100.0;
    config.layout.easing = "linear".to_string();
    config
}

fn mount(runtime: &MotionRuntime, rect: LayoutBox, props: MotionProps) -> (Rc<DetachedElement>, MotionNode) {
    let el = Rc::new(DetachedElement::new(rect));
    let node = runtime.mount(el.clone(), props, None);
    (el, node)
}

fn rect(left: f64, top: f64, width: f64, height: f64) -> LayoutBox {
    LayoutBox::from_rect(left, top, width, height)
}

#[test]
fn updates_in_one_window_share_a_measurement() {
    let runtime = MotionRuntime::new(&config());
    let (el, _) = mount(&runtime, rect(0.0, 0.0, 100.0, 100.0), MotionProps::new().layout(LayoutMode::Full));
    assert_eq!(el.measurements(), 1);

    runtime.schedule_layout_update();
    runtime.schedule_layout_update();
    assert_eq!(el.measurements(), 2);

    runtime.flush();
    assert_eq!(el.measurements(), 3);
}

#[test]
fn moved_node_is_projected_back_and_released() -> Result<()> {
    let runtime = MotionRuntime::new(&config());
    let (el, node) = mount(&runtime, rect(0.0, 0.0, 100.0, 100.0), MotionProps::new().layout(LayoutMode::Full));
    let id = node.layout_node().expect("layout node");

    runtime.schedule_layout_update();
    el.set_layout(rect(100.0, 0.0, 100.0, 100.0));
    runtime.flush();
    assert_eq!(el.style("transform").as_deref(), Some("translate3d(-100px, 0px, 0)"));
    assert!(runtime.projection().is_animating(id)?);

    runtime.tick(50.0);
    assert_eq!(el.style("transform").as_deref(), Some("translate3d(-50px, 0px, 0)"));
    assert_eq!(runtime.projection().visual_box(id)?, rect(50.0, 0.0, 100.0, 100.0));

    runtime.tick(50.0);
    assert_eq!(el.style("transform"), None);
    assert!(!runtime.projection().is_animating(id)?);

    let events = runtime.drain_events();
    assert!(events.contains(&MotionEvent::LayoutAnimationStart { node: node.id() }));
    assert!(events.contains(&MotionEvent::LayoutAnimationComplete { node: node.id() }));
    assert!(runtime.is_idle());
    Ok(())
}

#[test]
fn position_mode_ignores_size_changes() -> Result<()> {
    let runtime = MotionRuntime::new(&config());
    let (el, node) = mount(
        &runtime,
        rect(0.0, 0.0, 100.0, 100.0),
        MotionProps::new().layout(LayoutMode::Position),
    );
    let id = node.layout_node().expect("layout node");

    runtime.schedule_layout_update();
    el.set_layout(rect(0.0, 0.0, 200.0, 100.0));
    runtime.flush();
    assert!(!runtime.projection().is_animating(id)?);
    assert_eq!(el.style("transform"), None);

    runtime.schedule_layout_update();
    el.set_layout(rect(50.0, 0.0, 300.0, 100.0));
    runtime.flush();
    assert_eq!(el.style("transform").as_deref(), Some("translate3d(-50px, 0px, 0)"));
    Ok(())
}

#[test]
fn shared_layout_id_animates_from_previous_member() -> Result<()> {
    let runtime = MotionRuntime::new(&config());
    let props = || MotionProps::new().layout_id("card");
    let (_, first) = mount(&runtime, rect(0.0, 0.0, 100.0, 100.0), props());
    assert_eq!(runtime.projection().shared_members("card"), 1);

    first.unmount();
    let (el, second) = mount(&runtime, rect(200.0, 200.0, 50.0, 50.0), props());
    let id = second.layout_node().expect("layout node");
    assert_eq!(runtime.projection().shared_members("card"), 1);

    runtime.flush();
    assert_eq!(
        el.style("transform").as_deref(),
        Some("translate3d(-175px, -175px, 0) scale(2, 2)")
    );
    let output = runtime.projection().output(id)?;
    assert!(output.correction.is_some());

    runtime.tick(100.0);
    assert_eq!(el.style("transform"), None);
    Ok(())
}

#[test]
fn hidden_shared_member_hands_its_box_to_the_visible_one() -> Result<()> {
    let runtime = MotionRuntime::new(&config());
    let props = || MotionProps::new().layout_id("card");
    let (first_el, first) = mount(&runtime, rect(0.0, 0.0, 100.0, 100.0), props());
    let (_, second) = mount(&runtime, rect(200.0, 200.0, 50.0, 50.0), props());
    let first_id = first.layout_node().expect("layout node");
    let second_id = second.layout_node().expect("layout node");

    // The newcomer takes over from the first member.
    runtime.flush();
    assert!(runtime.projection().is_animating(second_id)?);
    runtime.tick(100.0);
    assert!(!runtime.projection().is_animating(second_id)?);
    assert_eq!(first_el.style("transform"), None);

    runtime.projection().set_visible(second_id, false)?;
    runtime.flush();
    assert!(runtime.projection().is_animating(first_id)?);
    assert_eq!(
        first_el.style("transform").as_deref(),
        Some("translate3d(175px, 175px, 0) scale(0.5, 0.5)")
    );

    runtime.tick(100.0);
    assert_eq!(first_el.style("transform"), None);
    Ok(())
}

#[test]
fn scaled_projection_corrects_shadow_and_radius() {
    let runtime = MotionRuntime::new(&config());
    let (el, _) = mount(
        &runtime,
        rect(0.0, 0.0, 100.0, 100.0),
        MotionProps::new()
            .layout(LayoutMode::Full)
            .style("box-shadow", "0px 4px 8px black")
            .style("border-radius", "8px"),
    );
    assert_eq!(el.style("box-shadow").as_deref(), Some("0px 4px 8px black"));

    runtime.schedule_layout_update();
    el.set_layout(rect(0.0, 0.0, 200.0, 200.0));
    runtime.flush();

    assert_eq!(
        el.style("transform").as_deref(),
        Some("translate3d(-50px, -50px, 0) scale(0.5, 0.5)")
    );
    assert_eq!(el.style("box-shadow").as_deref(), Some("0px 8px 16px black"));
    assert_eq!(el.style("border-radius").as_deref(), Some("8% 8%"));

    runtime.tick(100.0);
    assert_eq!(el.style("box-shadow").as_deref(), Some("0px 4px 8px black"));
    assert_eq!(el.style("border-radius").as_deref(), Some("8px"));
}

#[test]
fn projection_composes_with_motion_transform() {
    let runtime = MotionRuntime::new(&config());
    let (el, _) = mount(
        &runtime,
        rect(0.0, 0.0, 100.0, 100.0),
        MotionProps::new()
            .layout(LayoutMode::Full)
            .no_initial()
            .animate(glide_motion::AnimationTarget::new().with("rotate", 45.0)),
    );
    assert_eq!(el.style("transform").as_deref(), Some("rotate(45deg)"));

    runtime.schedule_layout_update();
    el.set_layout(rect(0.0, 100.0, 100.0, 100.0));
    runtime.flush();
    assert_eq!(
        el.style("transform").as_deref(),
        Some("translate3d(0px, -100px, 0) rotate(45deg)")
    );
}

#[test]
fn layout_dependencies_snapshot_before_host_change() -> Result<()> {
    let runtime = MotionRuntime::new(&config());
    let props = |dep: i64| {
        MotionProps::new()
            .layout(LayoutMode::Full)
            .layout_dependencies(vec![serde_json::json!(dep)])
    };
    let (el, node) = mount(&runtime, rect(0.0, 0.0, 100.0, 100.0), props(1));
    let id = node.layout_node().expect("layout node");

    node.set_props(props(2))?;
    el.set_layout(rect(0.0, 40.0, 100.0, 100.0));
    runtime.flush();
    assert!(runtime.projection().is_animating(id)?);
    assert_eq!(el.style("transform").as_deref(), Some("translate3d(0px, -40px, 0)"));
    Ok(())
}

#[test]
fn nested_projection_divides_by_parent_scale() -> Result<()> {
    let runtime = MotionRuntime::new(&config());
    let parent_el = Rc::new(DetachedElement::new(rect(0.0, 0.0, 100.0, 100.0)));
    let parent = runtime.mount(parent_el.clone(), MotionProps::new().layout(LayoutMode::Full), None);
    let child_el = Rc::new(DetachedElement::new(rect(0.0, 0.0, 50.0, 50.0)));
    let child = runtime.mount(
        child_el.clone(),
        MotionProps::new().layout(LayoutMode::Full),
        Some(&parent),
    );
    let child_id = child.layout_node().expect("layout node");
    assert_eq!(runtime.projection().parent(child_id)?, parent.layout_node());
    assert_eq!(runtime.projection().depth(child_id)?, 1);

    runtime.schedule_layout_update();
    parent_el.set_layout(rect(0.0, 0.0, 200.0, 200.0));
    child_el.set_layout(rect(0.0, 0.0, 100.0, 100.0));
    runtime.flush();

    assert_eq!(
        parent_el.style("transform").as_deref(),
        Some("translate3d(-50px, -50px, 0) scale(0.5, 0.5)")
    );
    // The parent's scale already shrinks the child back to its old box.
    assert_eq!(child_el.style("transform"), None);
    Ok(())
}
