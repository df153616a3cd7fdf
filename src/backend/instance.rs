// Vulkan instance and presentation surface
//
// Instance owns the loader, the instance handle and the optional debug
// messenger. Surface is created from a window and must be dropped before the
// instance that made it.

use anyhow::{Context, Result};
use ash::{vk, Entry};
use std::ffi::{CStr, CString};

use super::capabilities::{self, RequiredCapabilities};
use super::error::CapabilityKind;
use crate::window::AppWindow;

/// Application version reported to the driver
pub const APP_VERSION: u32 = vk::make_api_version(0, 0, 0, 1);

pub struct Instance {
    pub handle: ash::Instance,
    debug_utils: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
    pub entry: Entry,
}

impl Instance {
    pub fn new(app_name: &str, required: &RequiredCapabilities) -> Result<Self> {
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let available_layers = entry.enumerate_instance_layer_properties()?;
        let layers = capabilities::negotiate(
            CapabilityKind::Layer,
            capabilities::layer_names(&available_layers),
            &required.instance_layers,
        )?;

        let available_extensions = entry.enumerate_instance_extension_properties(None)?;
        let extensions = capabilities::negotiate(
            CapabilityKind::Extension,
            capabilities::extension_names(&available_extensions),
            &required.instance_extensions,
        )?;

        let layer_ptrs = capabilities::as_ptrs(&layers);
        let extension_ptrs = capabilities::as_ptrs(&extensions);

        let app_name_cstr = CString::new(app_name)?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(APP_VERSION)
            .api_version(vk::API_VERSION_1_0);

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let handle = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        log::info!(
            "Created instance with {} layer(s), {} extension(s)",
            layers.len(),
            extensions.len()
        );

        let mut instance = Self {
            handle,
            debug_utils: None,
            entry,
        };

        if required.validation_enabled() {
            instance.debug_utils = Some(instance.setup_debug_messenger()?);
        }

        Ok(instance)
    }

    fn setup_debug_messenger(
        &self,
    ) -> Result<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::extensions::ext::DebugUtils::new(&self.entry, &self.handle);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to create debug messenger")?;

        Ok((debug_utils, messenger))
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::debug!("Destroying instance");
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.handle.destroy_instance(None);
        }
    }
}

/// Presentation surface bound to one window.
pub struct Surface {
    pub handle: vk::SurfaceKHR,
    pub loader: ash::extensions::khr::Surface,
}

impl Surface {
    pub fn new(instance: &Instance, window: &AppWindow) -> Result<Self> {
        let handle = unsafe { window.create_surface(&instance.entry, &instance.handle) }?;
        let loader = ash::extensions::khr::Surface::new(&instance.entry, &instance.handle);
        Ok(Self { handle, loader })
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!(target: "vulkan", "{}", message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!(target: "vulkan", "{}", message);
        }
        _ => {
            log::debug!(target: "vulkan", "{}", message);
        }
    }

    vk::FALSE
}
