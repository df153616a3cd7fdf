// Shader module loading
//
// The triangle's SPIR-V is compiled by build.rs and embedded at compile time.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use std::io::Cursor;
use std::sync::Arc;

use super::error::SetupError;
use super::VulkanDevice;

pub const TRIANGLE_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle.vert.spv"));
pub const TRIANGLE_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle.frag.spv"));

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Layout of the vertex shader's `binding = 0` uniform block.
///
/// Declared by the shader but not bound by the pipeline yet; sized here so a
/// uniform [`Buffer`](super::Buffer) can be created for it.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

impl Default for UniformBufferObject {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }
}

/// Decode SPIR-V bytes into words, rejecting anything that is not SPIR-V.
pub fn read_spirv(code: &[u8]) -> Result<Vec<u32>, SetupError> {
    if code.is_empty() {
        return Err(SetupError::InvalidShader("empty bytecode (was glslc available at build time?)".into()));
    }

    let words = ash::util::read_spv(&mut Cursor::new(code))
        .map_err(|e| SetupError::InvalidShader(e.to_string()))?;

    // read_spv already normalised endianness
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        _ => Err(SetupError::InvalidShader("missing SPIR-V magic number".into())),
    }
}

/// Shader module that lives until the pipeline using it has been created.
pub struct ShaderModule {
    pub module: vk::ShaderModule,
    device: Arc<VulkanDevice>,
}

impl ShaderModule {
    pub fn new(device: Arc<VulkanDevice>, code: &[u8]) -> Result<Self> {
        let words = read_spirv(code)?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

        let module = unsafe { device.device.create_shader_module(&create_info, None) }
            .context("Failed to create shader module")?;

        Ok(Self { module, device })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_shader_module(self.module, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn accepts_spirv_header() {
        let bytes = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 8, 0]);
        let words = read_spirv(&bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn accepts_big_endian_spirv() {
        let bytes: Vec<u8> = [SPIRV_MAGIC, 0x0001_0000]
            .iter()
            .flat_map(|w| w.to_be_bytes())
            .collect();
        assert_eq!(read_spirv(&bytes).unwrap()[0], SPIRV_MAGIC);
    }

    #[test]
    fn rejects_empty_bytecode() {
        assert!(matches!(read_spirv(&[]), Err(SetupError::InvalidShader(_))));
    }

    #[test]
    fn rejects_truncated_bytecode() {
        let mut bytes = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000]);
        bytes.pop();
        assert!(matches!(read_spirv(&bytes), Err(SetupError::InvalidShader(_))));
    }

    #[test]
    fn rejects_missing_magic() {
        let bytes = words_to_bytes(&[0xdead_beef, 0x0001_0000]);
        assert!(matches!(read_spirv(&bytes), Err(SetupError::InvalidShader(_))));
    }

    #[test]
    fn uniform_block_is_three_matrices() {
        assert_eq!(std::mem::size_of::<UniformBufferObject>(), 3 * 64);

        let ubo = UniformBufferObject::default();
        let bytes: &[u8] = bytemuck::bytes_of(&ubo);
        assert_eq!(bytes.len(), 192);
        // Identity matrix: first float is 1.0
        assert_eq!(&bytes[0..4], &1.0f32.to_ne_bytes());
    }
}
