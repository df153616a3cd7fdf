// =============================================================================
// TRIANGLE RENDERER
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  AppWindow (winit, polled once per frame)                       │
// │    └── Renderer                                                 │
// │          └── VulkanDevice (instance, surface, queues)           │
// │                └── Swapchain -> RenderPass -> Pipeline          │
// │                      └── Command buffer + sync (1 in flight)    │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Wait for the previous frame's fence, reset it
// 2. Acquire swapchain image
// 3. Re-record the command buffer (clear, draw 3 vertices)
// 4. Submit to the graphics queue
// 5. Present
//
// =============================================================================

use anyhow::Result;
use triangle_renderer::config::ConfigSource;
use triangle_renderer::{AppWindow, Config, Renderer};

fn main() -> Result<()> {
    // Load configuration from config.toml. The log level lives in the config,
    // so problems with it are reported once the logger is up.
    let (config, source) = Config::load();

    init_logging(&config);
    log::info!("Starting triangle renderer");

    match source {
        Ok(ConfigSource::File(path)) => log::info!("Loaded configuration from {:?}", path),
        Ok(ConfigSource::Defaults) => log::info!("Config file not found, using defaults"),
        Err(e) => log::warn!("Failed to load config.toml: {:#}. Using defaults.", e),
    }
    log::debug!("Config: {:?}", config);

    // Declared before the renderer so it is dropped after it: the surface
    // must go before the window it belongs to.
    let mut window = AppWindow::new(&config.window)?;
    let mut renderer = Renderer::new(&config, &window)?;

    renderer.run(&mut window)?;

    drop(renderer);
    log::info!("Cleanup complete");
    Ok(())
}

/// RUST_LOG takes precedence over the configured level.
fn init_logging(config: &Config) {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or(config.debug.log_level.as_str())).init();
}
