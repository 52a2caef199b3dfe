// Session - logical device and queues
//
// Responsibilities:
// - Logical device creation, one queue per distinct queue family
// - Validation layer on the device when debug output is on
// - Graphics + present queue handles

use ash::prelude::VkResult;
use ash::vk;

use super::probe::{device_type_label, vendor_name, version_string, QueueFamilies, SelectedDevice};
use super::resources::{ResourceStack, VkResource};
use super::{DebugOutput, RendererConfig, VALIDATION_LAYER};
use crate::error::{RendererError, RendererResult};

#[derive(Debug, Clone, Copy)]
pub struct Queues {
    pub graphics: vk::Queue,
    pub present: vk::Queue,
}

pub struct Session {
    pub instance: ash::Instance,
    pub device: ash::Device,
    pub queue_families: QueueFamilies,
    pub queues: Queues,
}

impl Session {
    pub fn new(
        instance: &ash::Instance,
        selected: &SelectedDevice,
        config: &RendererConfig,
        resources: &mut ResourceStack<VkResource>,
    ) -> RendererResult<Self> {
        let candidate = &selected.candidate;
        log::info!(
            "Using {} {} ({}, Vulkan {})",
            vendor_name(candidate.vendor_id),
            candidate.name,
            device_type_label(candidate.device_type),
            version_string(candidate.api_version)
        );

        let queue_families = selected.queue_families;
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<*const std::ffi::c_char> = config
            .device_extensions
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        // Device layers are deprecated but older loaders still read them
        let layer_names = validation_layers(config.debug_output);

        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(candidate.handle, &create_info, None) }
            .map_err(RendererError::DeviceCreation)?;
        resources.push(VkResource::Device(device.clone()));

        let queues = unsafe {
            Queues {
                graphics: device.get_device_queue(queue_families.graphics, 0),
                present: device.get_device_queue(queue_families.present, 0),
            }
        };

        log::info!(
            "Queue families: graphics={}, present={}",
            queue_families.graphics,
            queue_families.present
        );

        Ok(Self {
            instance: instance.clone(),
            device,
            queue_families,
            queues,
        })
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }
}

/// Layer names to enable for the given debug setting
pub fn validation_layers(debug_output: DebugOutput) -> Vec<*const std::ffi::c_char> {
    match debug_output {
        DebugOutput::Enabled => vec![VALIDATION_LAYER.as_ptr()],
        DebugOutput::Disabled => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn device_layer_only_in_debug_mode() {
        assert!(validation_layers(DebugOutput::Disabled).is_empty());

        let layers = validation_layers(DebugOutput::Enabled);
        assert_eq!(layers.len(), 1);
        assert_eq!(unsafe { CStr::from_ptr(layers[0]) }, VALIDATION_LAYER);
    }
}
