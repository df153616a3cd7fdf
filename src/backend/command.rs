// Command pool and the frame's command buffer
//
// One primary buffer, reset and re-recorded every frame. The pool is created
// with RESET_COMMAND_BUFFER so the buffer can be reset on its own.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

/// Viewport covering the whole extent, depth 0..1.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Everything one draw needs besides the command buffer.
pub struct DrawInfo {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub pipeline: vk::Pipeline,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
}

pub struct Commands {
    pub pool: vk::CommandPool,
    pub buffer: vk::CommandBuffer,
    device: Arc<VulkanDevice>,
}

impl Commands {
    pub fn new(device: Arc<VulkanDevice>, queue_family_index: u32) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        let mut this = Self {
            pool,
            buffer: vk::CommandBuffer::null(),
            device,
        };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { this.device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffer")?;
        this.buffer = buffers[0];

        Ok(this)
    }

    /// Reset the buffer and record one full-screen triangle draw.
    ///
    /// The caller must have waited on the frame fence: the buffer may not be
    /// pending execution.
    pub fn record_triangle(&self, draw: &DrawInfo) -> Result<(), vk::Result> {
        let device = &self.device.device;
        let cmd = self.buffer;

        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;

            let begin_info = vk::CommandBufferBeginInfo::builder();
            device.begin_command_buffer(cmd, &begin_info)?;

            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: draw.clear_color,
                },
            }];
            let render_pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(draw.render_pass)
                .framebuffer(draw.framebuffer)
                .render_area(full_scissor(draw.extent))
                .clear_values(&clear_values);

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, draw.pipeline);
            device.cmd_set_viewport(cmd, 0, &[full_viewport(draw.extent)]);
            device.cmd_set_scissor(cmd, 0, &[full_scissor(draw.extent)]);
            device.cmd_draw(cmd, 3, 1, 0, 0);
            device.cmd_end_render_pass(cmd);

            device.end_command_buffer(cmd)?;
        }

        Ok(())
    }
}

impl Drop for Commands {
    fn drop(&mut self) {
        // Also frees the command buffer
        unsafe { self.device.device.destroy_command_pool(self.pool, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_and_scissor_cover_extent() {
        let extent = vk::Extent2D { width: 800, height: 600 };

        let viewport = full_viewport(extent);
        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!((viewport.width, viewport.height), (800.0, 600.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));

        let scissor = full_scissor(extent);
        assert_eq!((scissor.offset.x, scissor.offset.y), (0, 0));
        assert_eq!(scissor.extent, extent);
    }
}
