// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance and surface creation
// - Physical device selection (first adapter)
// - Queue family discovery for graphics and present
// - Logical device + queue creation

use anyhow::{Context, Result};
use ash::vk;
use std::collections::BTreeSet;
use std::ffi::CStr;
use std::sync::Arc;

use super::capabilities::{self, RequiredCapabilities};
use super::error::{CapabilityKind, SetupError};
use super::instance::{Instance, Surface};
use crate::window::AppWindow;

/// Queue families chosen for graphics and presentation. The same family may
/// fill both roles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Both indices as `(graphics, present)`, or an error if either is missing.
    pub fn complete(&self) -> Result<(u32, u32), SetupError> {
        match (self.graphics_family, self.present_family) {
            (Some(graphics), Some(present)) => Ok((graphics, present)),
            _ => Err(SetupError::NoSuitableQueueFamily),
        }
    }

    /// Distinct families that need a queue created, in ascending order.
    pub fn unique_families(&self) -> Vec<u32> {
        self.graphics_family
            .into_iter()
            .chain(self.present_family)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Record graphics and present capable families.
///
/// There is no tie-break: when several families qualify for a role the last
/// one wins. Fine for adapters with one universal family, possibly wrong on
/// hardware with dedicated present queues.
pub fn find_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: F,
) -> Result<QueueFamilyIndices>
where
    F: FnMut(u32) -> Result<bool>,
{
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in (0u32..).zip(families) {
        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics_family = Some(index);
        }

        if supports_present(index)? {
            indices.present_family = Some(index);
        }
    }

    Ok(indices)
}

/// First adapter in enumeration order; no scoring.
pub fn select_physical_device(
    devices: &[vk::PhysicalDevice],
) -> Result<vk::PhysicalDevice, SetupError> {
    devices.first().copied().ok_or(SetupError::NoPhysicalDevice)
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    // Vulkan handles (order matters for drop!)
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub surface: Surface,
    pub instance: Instance,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub queue_families: QueueFamilyIndices,

    // Cached for memory type selection
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VulkanDevice {
    /// Create the instance, window surface and logical device.
    pub fn new(
        app_name: &str,
        required: &RequiredCapabilities,
        window: &AppWindow,
    ) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan device: {}", app_name);

        let instance = Instance::new(app_name, required)?;
        let surface = Surface::new(&instance, window)?;

        let devices = unsafe { instance.handle.enumerate_physical_devices() }?;
        let physical_device = select_physical_device(&devices)?;

        let properties = unsafe { instance.handle.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.handle.get_physical_device_memory_properties(physical_device) };

        log::info!(
            "Selected GPU: {} (1 of {})",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy(),
            devices.len()
        );

        let family_properties = unsafe {
            instance
                .handle
                .get_physical_device_queue_family_properties(physical_device)
        };
        let queue_families = find_queue_families(&family_properties, |index| {
            unsafe {
                surface.loader.get_physical_device_surface_support(
                    physical_device,
                    index,
                    surface.handle,
                )
            }
            .context("Failed to query surface support")
        })?;
        let (graphics_family, present_family) = queue_families.complete()?;

        log::info!(
            "Queue families: graphics={}, present={}",
            graphics_family,
            present_family
        );

        let device = Self::create_logical_device(&instance, physical_device, &queue_families, required)?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        Ok(Arc::new(Self {
            device,
            physical_device,
            surface,
            instance,
            graphics_queue,
            present_queue,
            queue_families,
            memory_properties,
        }))
    }

    fn create_logical_device(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: &QueueFamilyIndices,
        required: &RequiredCapabilities,
    ) -> Result<ash::Device> {
        let available_layers =
            unsafe { instance.handle.enumerate_device_layer_properties(physical_device) }?;
        let layers = capabilities::negotiate(
            CapabilityKind::Layer,
            capabilities::layer_names(&available_layers),
            &required.device_layers,
        )?;

        let available_extensions =
            unsafe { instance.handle.enumerate_device_extension_properties(physical_device) }?;
        let extensions = capabilities::negotiate(
            CapabilityKind::Extension,
            capabilities::extension_names(&available_extensions),
            &required.device_extensions,
        )?;

        let layer_ptrs = capabilities::as_ptrs(&layers);
        let extension_ptrs = capabilities::as_ptrs(&extensions);

        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = queue_families
            .unique_families()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        // Device layers are deprecated but older loaders still read them
        #[allow(deprecated)]
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let device = unsafe { instance.handle.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        Ok(device)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<(), vk::Result> {
        unsafe { self.device.device_wait_idle() }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        if let Err(e) = self.wait_idle() {
            log::warn!("device_wait_idle failed during teardown: {}", e);
        }

        // Surface and instance are released afterwards by their own Drop
        unsafe { self.device.destroy_device(None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn separate_graphics_and_present_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::TRANSFER),
        ];

        let indices = find_queue_families(&families, |i| Ok(i == 1)).unwrap();

        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(1));
        assert_eq!(indices.complete().unwrap(), (0, 1));
        assert_eq!(indices.unique_families(), vec![0, 1]);
    }

    #[test]
    fn one_family_can_fill_both_roles() {
        let families = [family(vk::QueueFlags::GRAPHICS)];

        let indices = find_queue_families(&families, |_| Ok(true)).unwrap();

        assert_eq!(indices.complete().unwrap(), (0, 0));
        assert_eq!(indices.unique_families(), vec![0]);
    }

    #[test]
    fn last_matching_family_wins_each_role() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ];

        let indices = find_queue_families(&families, |i| Ok(i == 0 || i == 1 || i == 3)).unwrap();

        assert_eq!(indices.graphics_family, Some(2));
        assert_eq!(indices.present_family, Some(3));
    }

    #[test]
    fn missing_role_is_rejected() {
        let families = [family(vk::QueueFlags::COMPUTE), family(vk::QueueFlags::TRANSFER)];

        let indices = find_queue_families(&families, |_| Ok(true)).unwrap();
        assert_eq!(indices.graphics_family, None);
        assert!(matches!(indices.complete(), Err(SetupError::NoSuitableQueueFamily)));

        let indices = find_queue_families(&[family(vk::QueueFlags::GRAPHICS)], |_| Ok(false)).unwrap();
        assert_eq!(indices.present_family, None);
        assert!(matches!(indices.complete(), Err(SetupError::NoSuitableQueueFamily)));
    }

    #[test]
    fn surface_query_failure_propagates() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = find_queue_families(&families, |_| anyhow::bail!("surface lost"));
        assert!(result.is_err());
    }

    #[test]
    fn first_physical_device_is_selected() {
        use ash::vk::Handle;

        let devices = [
            vk::PhysicalDevice::from_raw(0x10),
            vk::PhysicalDevice::from_raw(0x20),
        ];
        assert_eq!(select_physical_device(&devices).unwrap(), devices[0]);
        assert!(matches!(
            select_physical_device(&[]),
            Err(SetupError::NoPhysicalDevice)
        ));
    }
}
