// Platform window
//
// The renderer only needs four things from a window: its client-area size,
// a way to pump platform events, a close flag and the raw handles used to
// build a Vulkan surface. `Window` captures exactly that; `WinitWindow` is
// the implementation used by the binary.

use anyhow::{Context, Result};
use raw_window_handle::{
    HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle, RawWindowHandle,
};
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{WindowAttributes, WindowId},
};

use crate::config::WindowConfig;

/// Capabilities the rendering backend requires from a platform window
pub trait Window: HasRawWindowHandle + HasRawDisplayHandle {
    /// Current client-area width in pixels
    fn width(&self) -> u32;
    /// Current client-area height in pixels
    fn height(&self) -> u32;
    /// Pump pending platform events; may set the close flag
    fn update(&mut self);
    fn should_close(&self) -> bool;
}

/// winit-backed window driven through the pump-events API, so the caller
/// owns the main loop instead of handing control to winit.
pub struct WinitWindow {
    // Dropped before the event loop that owns its platform connection
    window: winit::window::Window,
    state: WindowState,
    event_loop: EventLoop<()>,
}

/// Event handler state shared with winit during a pump
struct WindowState {
    attributes: WindowAttributes,
    created: Option<winit::window::Window>,
    has_window: bool,
    create_error: Option<winit::error::OsError>,
    should_close: bool,
}

impl WinitWindow {
    pub fn create(config: &WindowConfig) -> Result<Self> {
        log::info!("Creating window: {}x{}", config.width, config.height);

        let mut event_loop = EventLoop::new().context("Failed to create event loop")?;

        let attributes = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(config.width, config.height));

        let mut state = WindowState {
            attributes,
            created: None,
            has_window: false,
            create_error: None,
            should_close: false,
        };

        // Windows can only be created once the platform reports `resumed`
        let window = loop {
            let status = event_loop.pump_app_events(Some(Duration::from_millis(10)), &mut state);

            if let Some(e) = state.create_error.take() {
                return Err(e).context("Failed to create window");
            }
            if let Some(window) = state.created.take() {
                break window;
            }
            if let PumpStatus::Exit(code) = status {
                anyhow::bail!("Event loop exited with code {} before the window was created", code);
            }
        };

        Ok(Self {
            window,
            state,
            event_loop,
        })
    }
}

impl Window for WinitWindow {
    fn width(&self) -> u32 {
        self.window.inner_size().width
    }

    fn height(&self) -> u32 {
        self.window.inner_size().height
    }

    fn update(&mut self) {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state);

        if let PumpStatus::Exit(code) = status {
            log::info!("Event loop exited with code {}", code);
            self.state.should_close = true;
        }
    }

    fn should_close(&self) -> bool {
        self.state.should_close
    }
}

unsafe impl HasRawWindowHandle for WinitWindow {
    fn raw_window_handle(&self) -> RawWindowHandle {
        self.window.raw_window_handle()
    }
}

unsafe impl HasRawDisplayHandle for WinitWindow {
    fn raw_display_handle(&self) -> RawDisplayHandle {
        self.window.raw_display_handle()
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.has_window || self.should_close {
            return;
        }

        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => {
                self.has_window = true;
                self.created = Some(window);
            }
            Err(e) => self.create_error = Some(e),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                log::info!("Close requested, shutting down...");
                self.should_close = true;
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    self.should_close = true;
                }
            }
            // Swapchain is fixed at creation; resizes are not followed
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{} (ignored)", size.width, size.height);
            }
            _ => {}
        }
    }
}
