// Backend module - Vulkan abstraction layer
//
// Design: Thin wrappers around ash. Every wrapper that creates a Vulkan object
// destroys it in Drop and holds an Arc<VulkanDevice> so the device outlives it.

pub mod buffer;
pub mod capabilities;
pub mod command;
pub mod device;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use buffer::{Buffer, BufferError, Requirements};
pub use capabilities::RequiredCapabilities;
pub use command::Commands;
pub use device::{QueueFamilyIndices, VulkanDevice};
pub use error::{CapabilityKind, SetupError};
pub use pipeline::GraphicsPipeline;
pub use render_pass::RenderPass;
pub use swapchain::Swapchain;
pub use sync::FrameSync;
