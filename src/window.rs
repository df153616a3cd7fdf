// =============================================================================
// WINDOW - winit window driven by polling
// =============================================================================
//
// The renderer owns the frame loop, so instead of handing control to
// `EventLoop::run_app` the window pumps pending events once per frame.
// The window is not resizable: the swapchain is never recreated.

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::{CStr, CString};
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowAttributes, WindowId},
};

use crate::config::WindowConfig;

pub struct AppWindow {
    state: WindowState,
    event_loop: EventLoop<()>,
}

/// Event handler state shared with winit while pumping.
struct WindowState {
    attributes: WindowAttributes,
    window: Option<Window>,
    close_requested: bool,
    create_error: Option<String>,
}

impl AppWindow {
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let mut event_loop = EventLoop::new().context("Failed to create event loop")?;

        let attributes = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(config.width, config.height))
            .with_resizable(false);

        let mut state = WindowState {
            attributes,
            window: None,
            close_requested: false,
            create_error: None,
        };

        // The window can only be created from inside the event loop, once it
        // reports `resumed`.
        while state.window.is_none() {
            let status = event_loop.pump_app_events(Some(Duration::ZERO), &mut state);
            if let Some(e) = state.create_error.take() {
                anyhow::bail!("Failed to create window: {}", e);
            }
            if let PumpStatus::Exit(code) = status {
                anyhow::bail!("Event loop exited with code {} before the window opened", code);
            }
        }

        log::info!("Window: {}x{} ({})", config.width, config.height, config.title);

        Ok(Self { state, event_loop })
    }

    /// Process pending events. Returns false once the window should close.
    pub fn update(&mut self) -> bool {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state);

        !matches!(status, PumpStatus::Exit(_)) && !self.state.close_requested
    }

    /// Instance extensions needed to create a surface for this window.
    pub fn required_extensions(&self) -> Result<Vec<CString>> {
        let window = self.window()?;
        let extensions = ash_window::enumerate_required_extensions(window.raw_display_handle())
            .context("Window system is not supported by Vulkan")?;

        Ok(extensions
            .iter()
            .map(|&ptr| unsafe { CStr::from_ptr(ptr) }.to_owned())
            .collect())
    }

    /// # Safety
    /// `instance` must have been created with [`Self::required_extensions`]
    /// enabled, and the returned surface must be destroyed before it.
    pub unsafe fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR> {
        let window = self.window()?;
        ash_window::create_surface(
            entry,
            instance,
            window.raw_display_handle(),
            window.raw_window_handle(),
            None,
        )
        .context("Failed to create window surface")
    }

    /// Current framebuffer size in physical pixels.
    pub fn size(&self) -> vk::Extent2D {
        self.state
            .window
            .as_ref()
            .map(|w| {
                let size = w.inner_size();
                vk::Extent2D {
                    width: size.width,
                    height: size.height,
                }
            })
            .unwrap_or_default()
    }

    fn window(&self) -> Result<&Window> {
        self.state.window.as_ref().context("Window not created")
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => self.window = Some(window),
            Err(e) => {
                self.create_error = Some(e.to_string());
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.close_requested = true;
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    self.close_requested = true;
                }
            }
            _ => {}
        }
    }
}
