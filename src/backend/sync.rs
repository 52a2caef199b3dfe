// Synchronization primitives and command recording state
//
// One of everything: the renderer keeps a single frame in flight, so the
// command buffer, both semaphores and the fence are created once and reused.

use ash::vk;

use super::resources::{ResourceStack, VkResource};
use super::session::Session;
use crate::error::{RendererError, RendererResult};

pub struct FrameSync {
    /// Freed with its pool, which lives on the resource stack
    pub command_buffer: vk::CommandBuffer,
    /// Signalled by acquire, waited on by submit
    pub image_available: vk::Semaphore,
    /// Signalled by submit, waited on by present
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(session: &Session, resources: &mut ResourceStack<VkResource>) -> RendererResult<Self> {
        let device = &session.device;

        // Command buffer is reset and re-recorded every frame
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(session.queue_families.graphics)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .map_err(RendererError::resource("command pool"))?;
        resources.push(VkResource::CommandPool(command_pool));

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe { device.allocate_command_buffers(&alloc_info) }
            .map_err(RendererError::resource("command buffer"))?
            .into_iter()
            .next()
            .ok_or(RendererError::ResourceCreation {
                what: "command buffer",
                result: vk::Result::ERROR_UNKNOWN,
            })?;

        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let image_available = unsafe { device.create_semaphore(&semaphore_info, None) }
            .map_err(RendererError::resource("image-available semaphore"))?;
        resources.push(VkResource::Semaphore(image_available));

        let render_finished = unsafe { device.create_semaphore(&semaphore_info, None) }
            .map_err(RendererError::resource("render-finished semaphore"))?;
        resources.push(VkResource::Semaphore(render_finished));

        // Start signaled so the first frame doesn't block
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);
        let in_flight_fence = unsafe { device.create_fence(&fence_info, None) }
            .map_err(RendererError::resource("in-flight fence"))?;
        resources.push(VkResource::Fence(in_flight_fence));

        Ok(Self {
            command_buffer,
            image_available,
            render_finished,
            in_flight_fence,
        })
    }
}
