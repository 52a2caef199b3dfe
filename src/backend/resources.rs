// Resource stack - ordered ownership of native handles
//
// Every handle created during bring-up is pushed here right after creation.
// Releasing pops from the top, so destruction is always the exact reverse of
// creation. If bring-up fails half way the stack is dropped and cleans up
// whatever was created so far.

use ash::extensions::{ext::DebugUtils, khr};
use ash::vk;

/// Kind of native object tracked by the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Instance,
    DebugMessenger,
    Surface,
    Device,
    Swapchain,
    ImageView,
    RenderPass,
    PipelineLayout,
    Pipeline,
    Framebuffer,
    CommandPool,
    Semaphore,
    Fence,
}

impl ResourceKind {
    /// Kinds that must still be alive while this kind is alive
    pub fn dependencies(self) -> &'static [ResourceKind] {
        use ResourceKind::*;
        match self {
            Instance => &[],
            DebugMessenger | Surface | Device => &[Instance],
            Swapchain => &[Device, Surface],
            ImageView => &[Device, Swapchain],
            RenderPass | PipelineLayout | CommandPool | Semaphore | Fence => &[Device],
            Pipeline => &[Device, RenderPass, PipelineLayout],
            Framebuffer => &[Device, RenderPass, ImageView],
        }
    }
}

/// A resource the stack can destroy
pub trait Release: Sized {
    fn kind(&self) -> ResourceKind;

    /// Destroy the resource. `alive` holds everything created before it
    /// that has not been released yet.
    fn release(self, alive: &[Self]);
}

pub struct ResourceStack<R: Release> {
    entries: Vec<R>,
}

impl<R: Release> ResourceStack<R> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, resource: R) {
        debug_assert!(
            resource
                .kind()
                .dependencies()
                .iter()
                .all(|dep| self.entries.iter().any(|r| r.kind() == *dep)),
            "{:?} pushed before its dependencies",
            resource.kind()
        );
        self.entries.push(resource);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release everything, newest first
    pub fn release_all(&mut self) {
        while let Some(top) = self.entries.pop() {
            top.release(&self.entries);
        }
    }
}

impl<R: Release> Default for ResourceStack<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Release> Drop for ResourceStack<R> {
    fn drop(&mut self) {
        if !self.is_empty() {
            log::debug!("Releasing {} resources left on the stack", self.len());
        }
        self.release_all();
    }
}

/// Vulkan handles owned by the renderer
pub enum VkResource {
    Instance(ash::Instance),
    DebugMessenger(DebugUtils, vk::DebugUtilsMessengerEXT),
    Surface(khr::Surface, vk::SurfaceKHR),
    Device(ash::Device),
    Swapchain(khr::Swapchain, vk::SwapchainKHR),
    ImageView(vk::ImageView),
    RenderPass(vk::RenderPass),
    PipelineLayout(vk::PipelineLayout),
    Pipeline(vk::Pipeline),
    Framebuffer(vk::Framebuffer),
    /// Destroying the pool also frees its command buffers
    CommandPool(vk::CommandPool),
    Semaphore(vk::Semaphore),
    Fence(vk::Fence),
}

impl Release for VkResource {
    fn kind(&self) -> ResourceKind {
        match self {
            VkResource::Instance(_) => ResourceKind::Instance,
            VkResource::DebugMessenger(..) => ResourceKind::DebugMessenger,
            VkResource::Surface(..) => ResourceKind::Surface,
            VkResource::Device(_) => ResourceKind::Device,
            VkResource::Swapchain(..) => ResourceKind::Swapchain,
            VkResource::ImageView(_) => ResourceKind::ImageView,
            VkResource::RenderPass(_) => ResourceKind::RenderPass,
            VkResource::PipelineLayout(_) => ResourceKind::PipelineLayout,
            VkResource::Pipeline(_) => ResourceKind::Pipeline,
            VkResource::Framebuffer(_) => ResourceKind::Framebuffer,
            VkResource::CommandPool(_) => ResourceKind::CommandPool,
            VkResource::Semaphore(_) => ResourceKind::Semaphore,
            VkResource::Fence(_) => ResourceKind::Fence,
        }
    }

    fn release(self, alive: &[Self]) {
        let device = alive.iter().rev().find_map(|r| match r {
            VkResource::Device(device) => Some(device),
            _ => None,
        });

        unsafe {
            match self {
                VkResource::Instance(instance) => {
                    log::debug!("Destroying instance");
                    instance.destroy_instance(None);
                }
                VkResource::DebugMessenger(loader, messenger) => {
                    loader.destroy_debug_utils_messenger(messenger, None);
                }
                VkResource::Surface(loader, surface) => {
                    loader.destroy_surface(surface, None);
                }
                VkResource::Device(device) => {
                    log::debug!("Destroying logical device");
                    device.destroy_device(None);
                }
                VkResource::Swapchain(loader, swapchain) => {
                    loader.destroy_swapchain(swapchain, None);
                }
                other => match device {
                    Some(device) => destroy_device_child(device, other),
                    None => log::error!("{:?} outlived its device", other.kind()),
                },
            }
        }
    }
}

unsafe fn destroy_device_child(device: &ash::Device, resource: VkResource) {
    match resource {
        VkResource::ImageView(view) => device.destroy_image_view(view, None),
        VkResource::RenderPass(pass) => device.destroy_render_pass(pass, None),
        VkResource::PipelineLayout(layout) => device.destroy_pipeline_layout(layout, None),
        VkResource::Pipeline(pipeline) => device.destroy_pipeline(pipeline, None),
        VkResource::Framebuffer(framebuffer) => device.destroy_framebuffer(framebuffer, None),
        VkResource::CommandPool(pool) => device.destroy_command_pool(pool, None),
        VkResource::Semaphore(semaphore) => device.destroy_semaphore(semaphore, None),
        VkResource::Fence(fence) => device.destroy_fence(fence, None),
        // Instance-level objects are released in `Release::release`
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<ResourceKind>>>;

    struct Tracked {
        kind: ResourceKind,
        log: Log,
    }

    impl Release for Tracked {
        fn kind(&self) -> ResourceKind {
            self.kind
        }

        fn release(self, alive: &[Self]) {
            for dep in self.kind.dependencies() {
                assert!(
                    alive.iter().any(|r| r.kind == *dep),
                    "{:?} released after its dependency {:?}",
                    self.kind,
                    dep
                );
            }
            self.log.borrow_mut().push(self.kind);
        }
    }

    fn bring_up_order(image_count: usize) -> Vec<ResourceKind> {
        use ResourceKind::*;
        let mut order = vec![Instance, DebugMessenger, Surface, Device, Swapchain];
        order.extend(std::iter::repeat(ImageView).take(image_count));
        order.extend([RenderPass, PipelineLayout, Pipeline]);
        order.extend(std::iter::repeat(Framebuffer).take(image_count));
        order.extend([CommandPool, Semaphore, Semaphore, Fence]);
        order
    }

    fn stack_of(kinds: &[ResourceKind], log: &Log) -> ResourceStack<Tracked> {
        let mut stack = ResourceStack::new();
        for &kind in kinds {
            stack.push(Tracked {
                kind,
                log: log.clone(),
            });
        }
        stack
    }

    #[test]
    fn full_teardown_is_reverse_of_creation() {
        let log = Log::default();
        let created = bring_up_order(3);
        let mut stack = stack_of(&created, &log);
        assert_eq!(stack.len(), created.len());

        stack.release_all();

        let mut expected = created.clone();
        expected.reverse();
        assert_eq!(*log.borrow(), expected);
        assert!(stack.is_empty());
    }

    #[test]
    fn dropping_a_partial_stack_releases_what_exists() {
        use ResourceKind::*;
        let log = Log::default();

        // Bring-up failed right after the render pass
        {
            let _stack = stack_of(&[Instance, Surface, Device, Swapchain, ImageView, ImageView, RenderPass], &log);
        }

        assert_eq!(
            *log.borrow(),
            vec![RenderPass, ImageView, ImageView, Swapchain, Device, Surface, Instance]
        );
    }

    #[test]
    fn release_all_is_idempotent() {
        let log = Log::default();
        let mut stack = stack_of(&bring_up_order(2), &log);
        stack.release_all();
        let released = log.borrow().len();

        stack.release_all();
        drop(stack);
        assert_eq!(log.borrow().len(), released);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "pushed before its dependencies")]
    fn pipeline_requires_render_pass() {
        use ResourceKind::*;
        let log = Log::default();
        let mut stack = stack_of(&[Instance, Device, PipelineLayout], &log);
        stack.push(Tracked {
            kind: Pipeline,
            log: log.clone(),
        });
    }

    #[test]
    fn dependencies_only_point_backwards_in_bring_up() {
        let order = bring_up_order(1);
        for (i, kind) in order.iter().enumerate() {
            for dep in kind.dependencies() {
                assert!(order[..i].contains(dep), "{:?} needs {:?} first", kind, dep);
            }
        }
    }
}
