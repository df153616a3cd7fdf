// Setup errors
//
// Everything here is fatal: construction aborts before the first frame.

use ash::vk;
use std::fmt;
use thiserror::Error;

/// Which kind of capability a negotiation was checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Layer,
    Extension,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::Layer => f.write_str("layer"),
            CapabilityKind::Extension => f.write_str("extension"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("missing required {kind} {name}")]
    MissingCapability { kind: CapabilityKind, name: String },

    #[error("no Vulkan-capable GPU found")]
    NoPhysicalDevice,

    #[error("cannot find queues for both graphics and present")]
    NoSuitableQueueFamily,

    #[error("surface reports no supported formats")]
    NoSurfaceFormat,

    #[error("no memory type matches filter {type_filter:#x} with properties {properties:?}")]
    NoSuitableMemoryType {
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    },

    #[error("invalid SPIR-V bytecode: {0}")]
    InvalidShader(String),
}
