// Renderer - owns the whole Vulkan stack
//
// Bring-up runs bottom-up: library, instance, messenger, surface, device
// selection, logical device, swapchain, render pass, pipeline, framebuffers,
// sync objects. Every handle goes on the resource stack as it is created, so
// a failure half way releases exactly what exists, in reverse.

use ash::Entry;

use super::frame::{FrameExecutor, VulkanFrame};
use super::instance::{create_debug_messenger, create_instance, log_device_details, log_instance_details};
use super::pipeline::{create_render_pass, GraphicsPipeline};
use super::probe::pick_physical_device;
use super::resources::{ResourceStack, VkResource};
use super::session::Session;
use super::surface::Surface;
use super::swapchain::{Swapchain, SwapchainDescriptor};
use super::sync::FrameSync;
use super::{DebugOutput, RendererConfig};
use crate::error::{RendererError, RendererResult};
use crate::window::Window;

pub struct Renderer {
    executor: FrameExecutor,
    sync: FrameSync,
    pipeline: GraphicsPipeline,
    swapchain: Swapchain,
    session: Session,
    resources: ResourceStack<VkResource>,
    // Keeps the loader library mapped until the stack is released
    _entry: Entry,
}

impl Renderer {
    pub fn create_with_window<W: Window>(window: &W, config: &RendererConfig) -> RendererResult<Self> {
        let entry = unsafe { Entry::load() }?;
        let mut resources = ResourceStack::new();
        let debug_enabled = config.debug_output == DebugOutput::Enabled;

        if debug_enabled {
            log_instance_details(&entry)?;
        }

        let instance = create_instance(&entry, config, window.raw_display_handle(), &mut resources)?;
        if debug_enabled {
            create_debug_messenger(&entry, &instance, &mut resources)?;
            log_device_details(&instance)?;
        }

        let surface = Surface::new(&entry, &instance, window, &mut resources)?;

        let selected = pick_physical_device(&instance, &surface, &config.device_extensions)?;
        let session = Session::new(&instance, &selected, config, &mut resources)?;

        let descriptor = SwapchainDescriptor::negotiate(
            &selected.candidate.surface,
            session.queue_families,
            window.width(),
            window.height(),
        )
        .ok_or(RendererError::NoSuitableDevice)?;
        let mut swapchain = Swapchain::new(&session, &surface, &descriptor, &mut resources)?;

        let render_pass = create_render_pass(&session.device, swapchain.format, &mut resources)?;
        let pipeline = GraphicsPipeline::new(
            &session.device,
            render_pass,
            swapchain.extent,
            config,
            &mut resources,
        )?;
        swapchain.create_framebuffers(&session.device, render_pass, &mut resources)?;

        let sync = FrameSync::new(&session, &mut resources)?;

        log::info!("Renderer ready ({} resources)", resources.len());

        Ok(Self {
            executor: FrameExecutor::new(),
            sync,
            pipeline,
            swapchain,
            session,
            resources,
            _entry: entry,
        })
    }

    /// Draw and present one frame. Failures are logged and the frame dropped.
    pub fn render(&mut self) {
        let mut frame = VulkanFrame {
            device: &self.session.device,
            queues: self.session.queues,
            swapchain: &self.swapchain,
            pipeline: &self.pipeline,
            sync: &self.sync,
        };

        if let Err(e) = self.executor.run(&mut frame) {
            log::error!("Dropped frame ({:?} error): {}", e.kind(), e);
        }
    }

    pub fn frames_presented(&self) -> u64 {
        self.executor.frames_presented()
    }

    pub fn frames_dropped(&self) -> u64 {
        self.executor.frames_dropped()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!(
            "Shutting down renderer ({} frames presented, {} dropped)",
            self.frames_presented(),
            self.frames_dropped()
        );

        if let Err(e) = self.session.wait_idle() {
            log::warn!("Device wait idle failed during shutdown: {}", e);
        }
        self.resources.release_all();
    }
}
