/// Example program to print the loaded configuration
///
/// Run with: cargo run -p glide-config --example print_config

fn main() {
    let config = glide_config::GlideConfig::load();

    println!("=== Glide Configuration ===\n");

    println!("Presence Settings:");
    println!("  Exit Timeout (ms): {}", config.presence.exit_timeout_ms);
    println!();

    println!("Animation Settings:");
    println!("  Duration (ms): {}", config.animation.duration_ms);
    println!("  Delay (ms): {}", config.animation.delay_ms);
    println!("  Easing: {}", config.animation.easing);
    println!();

    println!("Layout Settings:");
    println!("  Duration (ms): {}", config.layout.duration_ms);
    println!("  Easing: {}", config.layout.easing);
    println!("  Max Frame Passes: {}", config.layout.max_frame_passes);
    println!();

    println!("Logging Settings:");
    println!("  Filter: {}", config.logging.filter);
    println!();

    match toml::to_string_pretty(&config) {
        Ok(toml_str) => {
            println!("=== Serialized Configuration ===");
            println!("{}", toml_str);
        }
        Err(e) => {
            eprintln!("Failed to serialize config: {}", e);
        }
    }
}
