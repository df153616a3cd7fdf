// Capability negotiation
//
// Checks required layers and extensions against what the loader or the
// physical device reports before anything is created with them.

use ash::vk;
use std::ffi::{c_char, CStr, CString};

use super::error::{CapabilityKind, SetupError};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Every layer and extension the renderer asks for, decided once at startup.
#[derive(Debug, Clone, Default)]
pub struct RequiredCapabilities {
    pub instance_layers: Vec<CString>,
    pub instance_extensions: Vec<CString>,
    pub device_layers: Vec<CString>,
    pub device_extensions: Vec<CString>,
}

impl RequiredCapabilities {
    /// `window_extensions` are the instance extensions the window system needs
    /// to create a presentation surface.
    pub fn new(window_extensions: Vec<CString>, enable_validation: bool) -> Self {
        let mut instance_extensions = window_extensions;
        let mut instance_layers = Vec::new();
        let mut device_layers = Vec::new();

        if enable_validation {
            instance_extensions.push(ash::extensions::ext::DebugUtils::name().to_owned());
            instance_layers.push(VALIDATION_LAYER.to_owned());
            // Device layers are deprecated but older loaders still honour them
            device_layers.push(VALIDATION_LAYER.to_owned());
        }

        Self {
            instance_layers,
            instance_extensions,
            device_layers,
            device_extensions: vec![ash::extensions::khr::Swapchain::name().to_owned()],
        }
    }

    pub fn validation_enabled(&self) -> bool {
        self.instance_layers.iter().any(|l| l.as_c_str() == VALIDATION_LAYER)
    }
}

/// Match `required` against `available`.
///
/// Returns the required names in the order they were requested, borrowed from
/// `required` so the pointers stay valid while it lives. Fails on the first
/// name that is not available.
pub fn negotiate<'r, I>(
    kind: CapabilityKind,
    available: I,
    required: &'r [CString],
) -> Result<Vec<&'r CStr>, SetupError>
where
    I: IntoIterator,
    I::Item: AsRef<CStr>,
{
    let available: Vec<I::Item> = available.into_iter().collect();

    required
        .iter()
        .map(|name| {
            if available.iter().any(|a| a.as_ref() == name.as_c_str()) {
                Ok(name.as_c_str())
            } else {
                Err(SetupError::MissingCapability {
                    kind,
                    name: name.to_string_lossy().into_owned(),
                })
            }
        })
        .collect()
}

/// Names reported in `VkLayerProperties`.
pub fn layer_names(properties: &[vk::LayerProperties]) -> Vec<&CStr> {
    properties
        .iter()
        .filter_map(|p| fixed_str(&p.layer_name))
        .collect()
}

/// Names reported in `VkExtensionProperties`.
pub fn extension_names(properties: &[vk::ExtensionProperties]) -> Vec<&CStr> {
    properties
        .iter()
        .filter_map(|p| fixed_str(&p.extension_name))
        .collect()
}

/// Raw pointers for a `*CreateInfo`; valid as long as `names` is.
pub fn as_ptrs(names: &[&CStr]) -> Vec<*const c_char> {
    names.iter().map(|n| n.as_ptr()).collect()
}

fn fixed_str(raw: &[c_char]) -> Option<&CStr> {
    CStr::from_bytes_until_nul(bytemuck::cast_slice(raw)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<CString> {
        list.iter().map(|s| CString::new(*s).unwrap()).collect()
    }

    fn layer(name: &str) -> vk::LayerProperties {
        let mut props = vk::LayerProperties::default();
        for (dst, src) in props.layer_name.iter_mut().zip(name.bytes()) {
            *dst = src as c_char;
        }
        props
    }

    #[test]
    fn subset_is_returned_in_requested_order() {
        let available = names(&["VK_KHR_surface", "VK_KHR_xcb_surface", "VK_EXT_debug_utils"]);
        let required = names(&["VK_EXT_debug_utils", "VK_KHR_surface"]);

        let enabled = negotiate(CapabilityKind::Extension, &available, &required).unwrap();

        assert_eq!(enabled, vec![required[0].as_c_str(), required[1].as_c_str()]);
        // Handles point into the required list, not the available one
        assert_eq!(enabled[0].as_ptr(), required[0].as_ptr());
    }

    #[test]
    fn empty_requirement_always_succeeds() {
        let enabled = negotiate(CapabilityKind::Layer, Vec::<CString>::new(), &[]).unwrap();
        assert!(enabled.is_empty());
    }

    #[test]
    fn first_missing_name_is_reported() {
        let available = names(&["VK_KHR_surface"]);
        let required = names(&["VK_KHR_surface", "VK_KHR_wayland_surface", "VK_EXT_debug_utils"]);

        let err = negotiate(CapabilityKind::Extension, &available, &required).unwrap_err();

        match err {
            SetupError::MissingCapability { kind, name } => {
                assert_eq!(kind, CapabilityKind::Extension);
                assert_eq!(name, "VK_KHR_wayland_surface");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_layer_message_names_the_layer() {
        let required = vec![VALIDATION_LAYER.to_owned()];
        let err = negotiate(CapabilityKind::Layer, Vec::<&CStr>::new(), &required).unwrap_err();
        assert_eq!(err.to_string(), "missing required layer VK_LAYER_KHRONOS_validation");
    }

    #[test]
    fn layer_names_are_read_from_fixed_arrays() {
        let props = [layer("VK_LAYER_KHRONOS_validation"), layer("VK_LAYER_MESA_overlay")];
        let found = layer_names(&props);
        assert_eq!(found, vec![VALIDATION_LAYER, c"VK_LAYER_MESA_overlay"]);

        let required = vec![VALIDATION_LAYER.to_owned()];
        assert!(negotiate(CapabilityKind::Layer, found, &required).is_ok());
    }

    #[test]
    fn validation_adds_layers_and_debug_utils() {
        let window = names(&["VK_KHR_surface"]);

        let plain = RequiredCapabilities::new(window.clone(), false);
        assert!(plain.instance_layers.is_empty());
        assert!(plain.device_layers.is_empty());
        assert_eq!(plain.instance_extensions, window);
        assert!(!plain.validation_enabled());

        let debug = RequiredCapabilities::new(window, true);
        assert!(debug.validation_enabled());
        assert_eq!(debug.device_layers, vec![VALIDATION_LAYER.to_owned()]);
        assert!(debug
            .instance_extensions
            .iter()
            .any(|e| e.as_c_str() == ash::extensions::ext::DebugUtils::name()));
        assert_eq!(
            debug.device_extensions,
            vec![ash::extensions::khr::Swapchain::name().to_owned()]
        );
    }
}
