// =============================================================================
// TRIANGLE RENDERER - minimal Vulkan bring-up and frame loop
// =============================================================================
//
// FRAME FLOW:
// 1. Pump window events (close request / Escape ends the loop)
// 2. Wait for the previous frame's fence
// 3. Acquire swapchain image
// 4. Record and submit the draw
// 5. Present rendered image to screen
//
// =============================================================================

mod backend;
mod config;
mod error;
mod file;
mod window;

use anyhow::{Context, Result};
use backend::{Renderer, RendererConfig};
use config::Config;
use error::ErrorKind;
use std::time::{Duration, Instant};
use window::{Window, WinitWindow};

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting triangle renderer");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        config.window.title
    );

    let mut window = WinitWindow::create(&config.window)?;

    let renderer_config = RendererConfig::from(&config);
    let mut renderer = Renderer::create_with_window(&window, &renderer_config)
        .map_err(|e| {
            if e.kind() == ErrorKind::DeviceSelection {
                log::error!("No GPU can present to this window with the required features");
            }
            e
        })
        .context("Failed to initialize Vulkan renderer")?;

    let mut fps = FpsCounter::new();
    while !window.should_close() {
        window.update();
        renderer.render();

        if config.debug.show_fps {
            fps.tick();
        }
    }

    // The surface must go before the window it was created from
    drop(renderer);
    drop(window);

    log::info!("Shut down cleanly");
    Ok(())
}

fn init_logging(config: &Config) {
    use env_logger::Builder;

    // RUST_LOG still wins over the config file
    Builder::new()
        .filter_level(config.log_level())
        .parse_default_env()
        .init();
}

/// Logs the frame rate once a second
struct FpsCounter {
    frames: u32,
    last_report: Instant,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            frames: 0,
            last_report: Instant::now(),
        }
    }

    fn tick(&mut self) {
        self.frames += 1;

        let elapsed = self.last_report.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let fps = self.frames as f64 / elapsed.as_secs_f64();
            log::debug!("FPS: {:.1} ({:.2} ms/frame)", fps, 1000.0 / fps);
            self.frames = 0;
            self.last_report = Instant::now();
        }
    }
}
