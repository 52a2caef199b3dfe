// Window surface
//
// Connects the platform window to Vulkan and answers what a physical device
// can do with it (capabilities, formats, present modes).

use ash::extensions::khr;
use ash::prelude::VkResult;
use ash::{vk, Entry};

use super::resources::{ResourceStack, VkResource};
use crate::error::{RendererError, RendererResult};
use crate::window::Window;

pub struct Surface {
    pub loader: khr::Surface,
    pub handle: vk::SurfaceKHR,
}

impl Surface {
    pub fn new<W: Window>(
        entry: &Entry,
        instance: &ash::Instance,
        window: &W,
        resources: &mut ResourceStack<VkResource>,
    ) -> RendererResult<Self> {
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .map_err(RendererError::init("create window surface"))?;

        let loader = khr::Surface::new(entry, instance);
        resources.push(VkResource::Surface(loader.clone(), handle));

        Ok(Self { loader, handle })
    }

    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, family: u32) -> bool {
        // A failed query counts as "cannot present"
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, family, self.handle)
        }
        .unwrap_or(false)
    }

    pub fn support(&self, physical_device: vk::PhysicalDevice) -> VkResult<SurfaceSupport> {
        unsafe {
            let capabilities = self
                .loader
                .get_physical_device_surface_capabilities(physical_device, self.handle)?;
            let formats = self
                .loader
                .get_physical_device_surface_formats(physical_device, self.handle)?;
            let present_modes = self
                .loader
                .get_physical_device_surface_present_modes(physical_device, self.handle)?;

            Ok(SurfaceSupport {
                capabilities,
                formats,
                present_modes,
            })
        }
    }
}

/// What a physical device reports for one surface
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}
