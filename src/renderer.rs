// =============================================================================
// RENDERER - Owns every Vulkan object and drives the frame loop
// =============================================================================
//
// Construction order:
//   device (instance, surface, queues) -> swapchain -> render pass
//   -> pipeline -> command pool/buffer -> sync primitives
//
// Fields are declared in the reverse order, so Rust's field drop order tears
// everything down from the sync objects back to the device.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use crate::backend::command::DrawInfo;
use crate::backend::{
    shader, Commands, FrameSync, GraphicsPipeline, RenderPass, RequiredCapabilities, Swapchain,
    VulkanDevice,
};
use crate::config::Config;
use crate::frame::{self, FrameError, FrameStage, FrameTarget};
use crate::window::AppWindow;

pub struct Renderer {
    // IMPORTANT: Field order matters for Drop! Reverse of creation.
    sync: FrameSync,
    commands: Commands,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    swapchain: Swapchain,
    device: Arc<VulkanDevice>,

    clear_color: [f32; 4],
    /// Submit waits on image-available at this stage
    wait_stages: [vk::PipelineStageFlags; 1],
}

impl Renderer {
    pub fn new(config: &Config, window: &AppWindow) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let required = RequiredCapabilities::new(window.required_extensions()?, config.validation_enabled());
        let device = VulkanDevice::new(&config.window.title, &required, window)?;

        let swapchain = Swapchain::new(device.clone(), window.size())?;
        let render_pass = RenderPass::new(device.clone(), &swapchain)?;
        let pipeline = GraphicsPipeline::new(
            device.clone(),
            &render_pass,
            shader::TRIANGLE_VERT,
            shader::TRIANGLE_FRAG,
        )?;

        let (graphics_family, _) = device.queue_families.complete()?;
        let commands = Commands::new(device.clone(), graphics_family)?;
        let sync = FrameSync::new(device.clone())?;

        log::info!("Vulkan initialized successfully!");

        Ok(Self {
            sync,
            commands,
            pipeline,
            render_pass,
            swapchain,
            device,
            clear_color: config.graphics.clear_color,
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
        })
    }

    /// Render until the window closes, then wait for the GPU to go idle.
    pub fn run(&mut self, window: &mut AppWindow) -> Result<()> {
        let frames = frame::run(self, || window.update()).context("Frame loop failed")?;
        log::info!("Rendered {} frames", frames);
        Ok(())
    }
}

impl FrameTarget for Renderer {
    fn wait_for_fence(&mut self) -> Result<(), FrameError> {
        let fences = [self.sync.in_flight_fence];
        unsafe {
            self.device
                .device
                .wait_for_fences(&fences, true, u64::MAX)
                .map_err(|e| FrameError::new(FrameStage::WaitFence, e))?;
            self.device
                .device
                .reset_fences(&fences)
                .map_err(|e| FrameError::new(FrameStage::WaitFence, e))
        }
    }

    fn acquire_image(&mut self) -> Result<u32, FrameError> {
        match self
            .swapchain
            .acquire_next_image(u64::MAX, self.sync.image_available)
        {
            Ok((index, false)) => {
                debug_assert!((index as usize) < self.swapchain.images.len());
                Ok(index)
            }
            Ok((_, true)) => Err(FrameError::new(
                FrameStage::AcquireImage,
                vk::Result::SUBOPTIMAL_KHR,
            )),
            Err(e) => Err(FrameError::new(FrameStage::AcquireImage, e)),
        }
    }

    fn record_commands(&mut self, image_index: u32) -> Result<(), FrameError> {
        let draw = DrawInfo {
            render_pass: self.render_pass.render_pass,
            framebuffer: self.render_pass.framebuffers[image_index as usize],
            pipeline: self.pipeline.pipeline,
            extent: self.swapchain.extent,
            clear_color: self.clear_color,
        };

        self.commands
            .record_triangle(&draw)
            .map_err(|e| FrameError::new(FrameStage::RecordCommands, e))
    }

    fn submit(&mut self) -> Result<(), FrameError> {
        let wait_semaphores = [self.sync.image_available];
        let signal_semaphores = [self.sync.render_finished];
        let command_buffers = [self.commands.buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info.build()],
                self.sync.in_flight_fence,
            )
        }
        .map_err(|e| FrameError::new(FrameStage::Submit, e))
    }

    fn present(&mut self, image_index: u32) -> Result<(), FrameError> {
        match self.swapchain.present(
            self.device.present_queue,
            image_index,
            &[self.sync.render_finished],
        ) {
            Ok(false) => Ok(()),
            Ok(true) => Err(FrameError::new(FrameStage::Present, vk::Result::SUBOPTIMAL_KHR)),
            Err(e) => Err(FrameError::new(FrameStage::Present, e)),
        }
    }

    fn drain(&mut self) -> Result<(), FrameError> {
        log::info!("Waiting for device idle...");
        self.device
            .wait_idle()
            .map_err(|e| FrameError::new(FrameStage::Drain, e))
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        // Nothing may be destroyed while the GPU still uses it
        if let Err(e) = self.device.wait_idle() {
            log::warn!("device_wait_idle failed during cleanup: {}", e);
        }
    }
}
