// Swapchain - Window presentation
//
// Negotiates format, present mode and extent against the surface, then builds
// the chain of images we render to along with their views and framebuffers.
// The extent is fixed at creation; resizing is not handled.

use ash::extensions::khr;
use ash::vk;

use super::probe::QueueFamilies;
use super::resources::{ResourceStack, VkResource};
use super::session::Session;
use super::surface::{Surface, SurfaceSupport};
use crate::error::{RendererError, RendererResult};

/// Prefer BGRA sRGB with the nonlinear sRGB colour space, else the first entry
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX (triple buffering) if offered, otherwise FIFO which is always supported
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Use the surface's fixed extent, or clamp the window size into its bounds
/// when the surface leaves the choice to us (width == u32::MAX).
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    vk::Extent2D {
        width: clamp(width, caps.min_image_extent.width, caps.max_image_extent.width),
        height: clamp(height, caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

// Unlike `Ord::clamp` this never panics on inverted bounds
fn clamp(value: u32, min: u32, max: u32) -> u32 {
    value.max(min).min(max)
}

/// One more than the minimum, capped when the surface declares a maximum
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        caps.max_image_count
    } else {
        image_count
    }
}

/// Which queue families may touch swapchain images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSharing {
    Exclusive,
    Concurrent([u32; 2]),
}

impl ImageSharing {
    pub fn for_families(families: QueueFamilies) -> Self {
        if families.is_shared() {
            ImageSharing::Exclusive
        } else {
            ImageSharing::Concurrent([families.graphics, families.present])
        }
    }

    pub fn mode(&self) -> vk::SharingMode {
        match self {
            ImageSharing::Exclusive => vk::SharingMode::EXCLUSIVE,
            ImageSharing::Concurrent(_) => vk::SharingMode::CONCURRENT,
        }
    }

    pub fn family_indices(&self) -> &[u32] {
        match self {
            ImageSharing::Exclusive => &[],
            ImageSharing::Concurrent(indices) => indices,
        }
    }
}

/// Everything negotiated before the swapchain is created
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDescriptor {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing: ImageSharing,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainDescriptor {
    /// Returns `None` when the surface lists no formats
    pub fn negotiate(
        support: &SurfaceSupport,
        families: QueueFamilies,
        width: u32,
        height: u32,
    ) -> Option<Self> {
        Some(Self {
            surface_format: choose_surface_format(&support.formats)?,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, width, height),
            image_count: choose_image_count(&support.capabilities),
            sharing: ImageSharing::for_families(families),
            pre_transform: support.capabilities.current_transform,
        })
    }
}

/// Images, views and framebuffers, index-aligned
#[derive(Debug, Default)]
pub struct SwapchainImages {
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub loader: khr::Swapchain,
    pub images: SwapchainImages,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    pub fn new(
        session: &Session,
        surface: &Surface,
        descriptor: &SwapchainDescriptor,
        resources: &mut ResourceStack<VkResource>,
    ) -> RendererResult<Self> {
        let extent = descriptor.extent;
        log::info!(
            "Creating swapchain: {}x{}, {:?}, {:?}, {} images, {:?}",
            extent.width,
            extent.height,
            descriptor.surface_format.format,
            descriptor.present_mode,
            descriptor.image_count,
            descriptor.sharing.mode()
        );

        let loader = khr::Swapchain::new(&session.instance, &session.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle)
            .min_image_count(descriptor.image_count)
            .image_format(descriptor.surface_format.format)
            .image_color_space(descriptor.surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(descriptor.sharing.mode())
            .queue_family_indices(descriptor.sharing.family_indices())
            .pre_transform(descriptor.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(descriptor.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(RendererError::resource("swapchain"))?;
        resources.push(VkResource::Swapchain(loader.clone(), swapchain));

        let images = unsafe { loader.get_swapchain_images(swapchain) }
            .map_err(RendererError::resource("swapchain images"))?;

        log::info!("Created swapchain with {} images", images.len());

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            let view = create_image_view(&session.device, image, descriptor.surface_format.format)?;
            resources.push(VkResource::ImageView(view));
            views.push(view);
        }

        Ok(Self {
            swapchain,
            loader,
            images: SwapchainImages {
                images,
                views,
                framebuffers: Vec::new(),
            },
            format: descriptor.surface_format.format,
            extent,
        })
    }

    /// One framebuffer per image view, all bound to `render_pass`
    pub fn create_framebuffers(
        &mut self,
        device: &ash::Device,
        render_pass: vk::RenderPass,
        resources: &mut ResourceStack<VkResource>,
    ) -> RendererResult<()> {
        let mut framebuffers = Vec::with_capacity(self.images.views.len());

        for &view in &self.images.views {
            let attachments = [view];
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);

            let framebuffer = unsafe { device.create_framebuffer(&framebuffer_info, None) }
                .map_err(RendererError::resource("framebuffer"))?;
            resources.push(VkResource::Framebuffer(framebuffer));
            framebuffers.push(framebuffer);
        }

        self.images.framebuffers = framebuffers;
        debug_assert_eq!(self.images.framebuffers.len(), self.images.images.len());
        Ok(())
    }

    /// Acquire next image; `semaphore` is signalled once the image is free
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> ash::prelude::VkResult<u32> {
        let (index, suboptimal) = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        }?;

        if suboptimal {
            log::debug!("Swapchain is suboptimal for the surface");
        }
        Ok(index)
    }

    /// Present `image_index` once `wait_semaphores` are signalled
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> ash::prelude::VkResult<()> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let suboptimal = unsafe { self.loader.queue_present(queue, &present_info) }?;
        if suboptimal {
            log::debug!("Swapchain is suboptimal for the surface");
        }
        Ok(())
    }
}

fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> RendererResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None) }
        .map_err(RendererError::resource("image view"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn bounded_caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 64, height: 64 },
            max_image_extent: vk::Extent2D { width: 1920, height: 1080 },
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        }
    }

    #[test]
    fn surface_format_falls_back_to_first() {
        let only = [format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT)];
        let chosen = choose_surface_format(&only).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT);
    }

    #[test]
    fn surface_format_prefers_bgra_srgb() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn surface_format_needs_both_format_and_color_space() {
        let formats = [
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_prefers_mailbox() {
        assert_eq!(choose_present_mode(&[vk::PresentModeKHR::FIFO]), vk::PresentModeKHR::FIFO);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn fixed_current_extent_is_used_verbatim() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: 800, height: 600 },
            ..bounded_caps()
        };
        let extent = choose_extent(&caps, 4000, 10);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn undefined_extent_clamps_each_axis() {
        let caps = bounded_caps();

        let extent = choose_extent(&caps, 4000, 10);
        assert_eq!((extent.width, extent.height), (1920, 64));

        let extent = choose_extent(&caps, 800, 600);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn image_count_is_min_plus_one_within_max() {
        let mut caps = bounded_caps();
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);

        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn sharing_follows_queue_families() {
        let shared = ImageSharing::for_families(QueueFamilies { graphics: 0, present: 0 });
        assert_eq!(shared, ImageSharing::Exclusive);
        assert_eq!(shared.mode(), vk::SharingMode::EXCLUSIVE);
        assert!(shared.family_indices().is_empty());

        let split = ImageSharing::for_families(QueueFamilies { graphics: 0, present: 2 });
        assert_eq!(split.mode(), vk::SharingMode::CONCURRENT);
        assert_eq!(split.family_indices(), &[0, 2]);
    }

    #[test]
    fn descriptor_is_derived_from_capabilities() {
        let support = SurfaceSupport {
            capabilities: bounded_caps(),
            formats: vec![format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };
        let families = QueueFamilies { graphics: 1, present: 1 };

        let descriptor = SwapchainDescriptor::negotiate(&support, families, 10_000, 10_000).unwrap();
        assert_eq!(descriptor.surface_format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(descriptor.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!((descriptor.extent.width, descriptor.extent.height), (1920, 1080));
        assert_eq!(descriptor.image_count, 3);
        assert_eq!(descriptor.sharing, ImageSharing::Exclusive);

        let empty = SurfaceSupport {
            formats: Vec::new(),
            ..support
        };
        assert!(SwapchainDescriptor::negotiate(&empty, families, 800, 600).is_none());
    }
}
