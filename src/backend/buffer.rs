// GPU buffers
//
// A Buffer owns one vk::Buffer and the device memory bound to it. Not used by
// the triangle itself, which has no vertex or uniform data; meant for a
// future mesh or uniform path.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::Pod;
use std::sync::Arc;
use thiserror::Error;

use super::error::SetupError;
use super::VulkanDevice;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("buffer memory is not mapped")]
    NotMapped,

    #[error("{data} bytes do not fit in a {capacity} byte buffer")]
    TooLarge {
        data: vk::DeviceSize,
        capacity: vk::DeviceSize,
    },

    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),
}

/// Describes the buffer to create and the memory backing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirements {
    pub size: vk::DeviceSize,
    pub properties: vk::MemoryPropertyFlags,
    pub usage: vk::BufferUsageFlags,
    pub sharing_mode: vk::SharingMode,
    /// Map the memory once at creation and keep it mapped until drop
    pub keep_mapped: bool,
}

impl Requirements {
    pub fn new(
        size: vk::DeviceSize,
        properties: vk::MemoryPropertyFlags,
        usage: vk::BufferUsageFlags,
        sharing_mode: vk::SharingMode,
        keep_mapped: bool,
    ) -> Self {
        Self {
            size,
            properties,
            usage,
            sharing_mode,
            keep_mapped,
        }
    }

    /// Host-written source for uploads to device-local buffers.
    pub fn staging(size: vk::DeviceSize) -> Self {
        Self::new(
            size,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::SharingMode::EXCLUSIVE,
            true,
        )
    }

    pub fn vertex(size: vk::DeviceSize) -> Self {
        Self::new(
            size,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::SharingMode::EXCLUSIVE,
            false,
        )
    }

    pub fn index(size: vk::DeviceSize) -> Self {
        Self::new(
            size,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::SharingMode::EXCLUSIVE,
            false,
        )
    }

    /// Rewritten from the host every frame, so it stays mapped.
    pub fn uniform(size: vk::DeviceSize) -> Self {
        Self::new(
            size,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::SharingMode::EXCLUSIVE,
            true,
        )
    }
}

/// Index of the first memory type allowed by `type_filter` that has all of
/// `properties`.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32, SetupError> {
    memory_properties.memory_types[..memory_properties.memory_type_count as usize]
        .iter()
        .zip(0u32..)
        .find(|&(memory_type, i)| {
            type_filter & (1u32 << i) != 0 && memory_type.property_flags.contains(properties)
        })
        .map(|(_, i)| i)
        .ok_or(SetupError::NoSuitableMemoryType {
            type_filter,
            properties,
        })
}

/// `data` bytes must fit in a buffer of `capacity` bytes.
fn check_fits(data: vk::DeviceSize, capacity: vk::DeviceSize) -> Result<(), BufferError> {
    if data > capacity {
        return Err(BufferError::TooLarge { data, capacity });
    }
    Ok(())
}

pub struct Buffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    mapped: Option<*mut u8>,
    device: Arc<VulkanDevice>,
}

impl Buffer {
    pub fn new(device: Arc<VulkanDevice>, requirements: Requirements) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(requirements.size)
            .usage(requirements.usage)
            .sharing_mode(requirements.sharing_mode);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .context("Failed to create buffer")?;

        // Null memory is ignored by vkFreeMemory, so Drop covers partial failure
        let mut this = Self {
            buffer,
            memory: vk::DeviceMemory::null(),
            size: requirements.size,
            mapped: None,
            device,
        };

        let mem_requirements = unsafe { this.device.device.get_buffer_memory_requirements(buffer) };

        let memory_type_index = find_memory_type(
            &this.device.memory_properties,
            mem_requirements.memory_type_bits,
            requirements.properties,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        this.memory = unsafe { this.device.device.allocate_memory(&alloc_info, None) }
            .context("Failed to allocate buffer memory")?;

        unsafe {
            this.device
                .device
                .bind_buffer_memory(buffer, this.memory, 0)
                .context("Failed to bind buffer memory")?;
        }

        if requirements.keep_mapped {
            let ptr = unsafe {
                this.device.device.map_memory(
                    this.memory,
                    0,
                    requirements.size,
                    vk::MemoryMapFlags::empty(),
                )
            }
            .context("Failed to map buffer memory")?;
            this.mapped = Some(ptr.cast());
        }

        log::debug!(
            "Created {} byte buffer ({:?}) in memory type {}",
            requirements.size,
            requirements.usage,
            memory_type_index
        );

        Ok(this)
    }

    /// Copy `data` to the start of the mapped memory.
    pub fn fill<T: Pod>(&mut self, data: &[T]) -> Result<(), BufferError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let ptr = self.mapped.ok_or(BufferError::NotMapped)?;
        check_fits(bytes.len() as vk::DeviceSize, self.size)?;

        // Mapped memory is HOST_COHERENT for every mapped preset, no flush needed
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len()) };
        Ok(())
    }

    /// Copy all of `source` into `destination` on the GPU and wait for it.
    ///
    /// `command_buffer` is recorded from scratch; it must not be pending.
    pub fn copy(
        source: &Buffer,
        destination: &Buffer,
        command_buffer: vk::CommandBuffer,
        transfer_queue: vk::Queue,
    ) -> Result<(), BufferError> {
        check_fits(source.size, destination.size)?;

        let device = &source.device.device;

        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(command_buffer, &begin_info)?;

            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: source.size,
            };
            device.cmd_copy_buffer(command_buffer, source.buffer, destination.buffer, &[region]);

            device.end_command_buffer(command_buffer)?;

            let command_buffers = [command_buffer];
            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
            device.queue_submit(transfer_queue, &[submit_info.build()], vk::Fence::null())?;
            device.queue_wait_idle(transfer_queue)?;
        }

        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            if self.mapped.take().is_some() {
                self.device.device.unmap_memory(self.memory);
            }
            self.device.device.destroy_buffer(self.buffer, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::shader::UniformBufferObject;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, &flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = flags;
        }
        props
    }

    #[test]
    fn picks_type_matching_filter_and_properties() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let index = find_memory_type(&props, 0x2, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn first_matching_type_wins() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, host, host]);

        assert_eq!(find_memory_type(&props, 0b110, host).unwrap(), 1);
        assert_eq!(find_memory_type(&props, 0b100, host).unwrap(), 2);
    }

    #[test]
    fn unsatisfiable_request_is_an_error() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        // Filter only allows the device-local type
        let err = find_memory_type(&props, 0x1, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap_err();
        assert!(matches!(
            err,
            SetupError::NoSuitableMemoryType { type_filter: 0x1, .. }
        ));

        // Types beyond memory_type_count are never considered
        let err = find_memory_type(&props, 0x4, vk::MemoryPropertyFlags::empty());
        assert!(err.is_err());
    }

    #[test]
    fn data_up_to_capacity_fits() {
        assert!(check_fits(64, 64).is_ok());
        assert!(check_fits(0, 64).is_ok());
        assert!(check_fits(0, 0).is_ok());
    }

    #[test]
    fn one_byte_over_capacity_is_too_large() {
        assert!(matches!(
            check_fits(65, 64),
            Err(BufferError::TooLarge { data: 65, capacity: 64 })
        ));

        let ubo = std::mem::size_of::<UniformBufferObject>() as vk::DeviceSize;
        let err = check_fits(ubo, ubo - 1).unwrap_err();
        assert_eq!(err.to_string(), "192 bytes do not fit in a 191 byte buffer");
    }

    #[test]
    fn presets_match_their_roles() {
        let staging = Requirements::staging(64);
        assert!(staging.keep_mapped);
        assert!(staging.usage.contains(vk::BufferUsageFlags::TRANSFER_SRC));
        assert!(staging.properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));

        let vertex = Requirements::vertex(64);
        assert!(!vertex.keep_mapped);
        assert_eq!(vertex.properties, vk::MemoryPropertyFlags::DEVICE_LOCAL);
        assert!(vertex.usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST));

        let index = Requirements::index(64);
        assert!(index.usage.contains(vk::BufferUsageFlags::INDEX_BUFFER));
        assert_eq!(index.sharing_mode, vk::SharingMode::EXCLUSIVE);
    }

    #[test]
    fn uniform_preset_fits_the_shader_block() {
        let size = std::mem::size_of::<UniformBufferObject>() as vk::DeviceSize;
        let uniform = Requirements::uniform(size);

        assert_eq!(uniform.size, 192);
        assert!(uniform.keep_mapped);
        assert_eq!(uniform.usage, vk::BufferUsageFlags::UNIFORM_BUFFER);
        assert_eq!(
            uniform.properties,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        );
    }
}
