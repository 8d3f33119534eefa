use anyhow::{Context, Result};
use glide_config::GlideConfig;
use glide_motion::{
    AnimationTarget, DetachedElement, LayoutBox, LayoutMode, MotionEvent, MotionNode,
    MotionProps, MotionRuntime, PresenceMode,
};
use std::rc::Rc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const ROW_HEIGHT: f64 = 40.0;
const FRAME_MS: f64 = 16.0;

struct Row {
    key: &'static str,
    element: Rc<DetachedElement>,
    node: MotionNode,
}

fn row_box(index: usize) -> LayoutBox {
    LayoutBox::from_rect(0.0, index as f64 * ROW_HEIGHT, 320.0, ROW_HEIGHT)
}

fn row_props() -> MotionProps {
    MotionProps::new()
        .initial(AnimationTarget::new().with("opacity", 0.0).with("x", -20.0))
        .animate(AnimationTarget::new().with("opacity", 1.0).with("x", 0.0))
        .exit(AnimationTarget::new().with("opacity", 0.0).with("scale", 0.9))
        .layout(LayoutMode::Position)
}

fn print_rows(label: &str, rows: &[Row]) {
    println!("-- {}", label);
    for row in rows {
        if !row.node.is_mounted() {
            continue;
        }
        let styles = row.element.styles();
        let described: Vec<String> = styles.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
        println!("  {:<6} {}", row.key, described.join("; "));
    }
}

fn run_until_idle(runtime: &MotionRuntime, max_frames: usize) -> usize {
    let mut frames = 0;
    while !runtime.is_idle() && frames < max_frames {
        runtime.tick(FRAME_MS);
        frames += 1;
    }
    frames
}

/// Headless scene: three rows fade in, the first row exits and the rest
/// slide up into its place.
fn main() -> Result<()> {
    let config = GlideConfig::load();
    let filter = EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runtime = MotionRuntime::new(&config);
    let list = runtime.presence(PresenceMode::PopLayout);
    let root = Rc::new(DetachedElement::new(LayoutBox::from_rect(0.0, 0.0, 320.0, 3.0 * ROW_HEIGHT)));
    list.set_pop_layout_root(root.clone());

    let li = runtime.component("li");
    let mut rows = Vec::new();
    for (index, key) in ["alpha", "beta", "gamma"].into_iter().enumerate() {
        let element = Rc::new(DetachedElement::new(row_box(index)));
        let node = li.mount(&runtime, element.clone(), row_props(), None);
        list.register_node(key, node.clone())
            .with_context(|| format!("registering row {}", key))?;
        rows.push(Row { key, element, node });
    }
    list.render(["alpha", "beta", "gamma"]);

    let frames = run_until_idle(&runtime, 200);
    info!(frames, "rows entered");
    print_rows("after enter", &rows);

    list.render(["beta", "gamma"]);
    // The host reflows the remaining rows once the exiting one is popped.
    rows[1].element.set_layout(row_box(0));
    rows[2].element.set_layout(row_box(1));
    runtime.tick(FRAME_MS);
    print_rows("exit started", &rows);

    let frames = run_until_idle(&runtime, 200);
    info!(frames, "exit and reflow settled");
    print_rows("after exit", &rows);

    for event in runtime.drain_events() {
        if let MotionEvent::ExitComplete { key, forced } = event {
            println!("removed {} (forced: {})", key, forced);
        }
    }
    Ok(())
}
