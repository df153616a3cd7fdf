// Single-triangle Vulkan renderer.
//
// backend/  - thin RAII wrappers around ash objects
// frame     - the per-frame state machine, independent of Vulkan handles
// renderer  - owns everything and implements the frame stages with Vulkan
// window    - winit window polled once per frame

pub mod backend;
pub mod config;
pub mod frame;
pub mod renderer;
pub mod window;

pub use config::Config;
pub use renderer::Renderer;
pub use window::AppWindow;
