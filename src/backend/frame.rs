// Frame executor
//
// One frame: wait fence -> reset fence -> acquire -> record -> submit -> present.
// The state machine lives in `FrameExecutor` and talks to the GPU only through
// `FrameCommands`; `VulkanFrame` is the real implementation.
//
// A failed frame is dropped, never retried. An image that was acquired but
// never drawn is still handed back: an empty submit consumes the
// image-available semaphore and signals the fence, then the image is
// presented as-is. If the fence was reset but nothing was submitted, nothing
// will ever signal it again, so the next frame must not wait on it (or reset
// it a second time).

use ash::prelude::VkResult;
use ash::vk;

use super::pipeline::GraphicsPipeline;
use super::session::Queues;
use super::swapchain::Swapchain;
use super::sync::FrameSync;
use crate::error::{FrameStage, RendererError, RendererResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Recording,
    /// Acquired image is being handed back after a failed record or submit
    Releasing,
    Submitted,
    Presented,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    /// Signalled, or will be once the last submit completes
    Pending,
    /// Reset and not yet handed to a submit
    Reset,
}

/// GPU-side operations of a single frame
pub trait FrameCommands {
    fn wait_for_fence(&mut self) -> VkResult<()>;
    fn reset_fence(&mut self) -> VkResult<()>;
    fn acquire_image(&mut self) -> VkResult<u32>;
    fn record(&mut self, image_index: u32) -> VkResult<()>;
    fn submit(&mut self) -> VkResult<()>;
    /// Submit no work: wait on image-available, signal render-finished and the fence
    fn submit_empty(&mut self) -> VkResult<()>;
    fn present(&mut self, image_index: u32) -> VkResult<()>;
}

pub struct FrameExecutor {
    state: FrameState,
    fence: FenceState,
    frames_presented: u64,
    frames_dropped: u64,
}

impl FrameExecutor {
    pub fn new() -> Self {
        Self {
            state: FrameState::Idle,
            // The fence is created signalled
            fence: FenceState::Pending,
            frames_presented: 0,
            frames_dropped: 0,
        }
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Run one full frame, returning the presented image index
    pub fn run<C: FrameCommands>(&mut self, commands: &mut C) -> RendererResult<u32> {
        debug_assert_eq!(self.state, FrameState::Idle);

        let result = self.cycle(commands);
        match result {
            Ok(_) => self.frames_presented += 1,
            Err(_) => {
                log::debug!("Frame abandoned in state {:?}", self.state);
                self.frames_dropped += 1;
            }
        }
        self.state = FrameState::Idle;
        result
    }

    fn cycle<C: FrameCommands>(&mut self, commands: &mut C) -> RendererResult<u32> {
        if self.fence == FenceState::Pending {
            commands
                .wait_for_fence()
                .map_err(RendererError::frame(FrameStage::WaitFence))?;
            commands
                .reset_fence()
                .map_err(RendererError::frame(FrameStage::ResetFence))?;
            self.fence = FenceState::Reset;
        }

        self.state = FrameState::Acquiring;
        let image_index = commands
            .acquire_image()
            .map_err(RendererError::frame(FrameStage::Acquire))?;

        self.state = FrameState::Recording;
        let drawn = commands
            .record(image_index)
            .map_err(RendererError::frame(FrameStage::Record))
            .and_then(|()| {
                commands
                    .submit()
                    .map_err(RendererError::frame(FrameStage::Submit))
            });
        if let Err(e) = drawn {
            self.release_image(commands, image_index);
            return Err(e);
        }
        self.fence = FenceState::Pending;
        self.state = FrameState::Submitted;

        commands
            .present(image_index)
            .map_err(RendererError::frame(FrameStage::Present))?;
        self.state = FrameState::Presented;

        Ok(image_index)
    }

    /// Give an acquired but undrawn image back to the presentation engine
    fn release_image<C: FrameCommands>(&mut self, commands: &mut C, image_index: u32) {
        self.state = FrameState::Releasing;

        if let Err(e) = commands.submit_empty() {
            log::warn!("Could not release image {}: {}", image_index, e);
            return;
        }
        self.fence = FenceState::Pending;

        if let Err(e) = commands.present(image_index) {
            log::warn!("Could not present released image {}: {}", image_index, e);
        }
    }
}

impl Default for FrameExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed view of everything a frame touches on the device
pub struct VulkanFrame<'a> {
    pub device: &'a ash::Device,
    pub queues: Queues,
    pub swapchain: &'a Swapchain,
    pub pipeline: &'a GraphicsPipeline,
    pub sync: &'a FrameSync,
}

impl FrameCommands for VulkanFrame<'_> {
    fn wait_for_fence(&mut self) -> VkResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.sync.in_flight_fence], true, u64::MAX)
        }
    }

    fn reset_fence(&mut self) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[self.sync.in_flight_fence]) }
    }

    fn acquire_image(&mut self) -> VkResult<u32> {
        self.swapchain.acquire_next_image(self.sync.image_available)
    }

    fn record(&mut self, image_index: u32) -> VkResult<()> {
        let framebuffer = *self
            .swapchain
            .images
            .framebuffers
            .get(image_index as usize)
            .ok_or(vk::Result::ERROR_UNKNOWN)?;
        let cmd = self.sync.command_buffer;

        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;

            let begin_info = vk::CommandBufferBeginInfo::builder();
            self.device.begin_command_buffer(cmd, &begin_info)?;

            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            }];
            let render_pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(self.pipeline.render_pass)
                .framebuffer(framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: self.swapchain.extent,
                })
                .clear_values(&clear_values);

            self.device
                .cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            self.device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.pipeline,
            );
            self.device.cmd_draw(cmd, 3, 1, 0, 0);
            self.device.cmd_end_render_pass(cmd);

            self.device.end_command_buffer(cmd)
        }
    }

    fn submit(&mut self) -> VkResult<()> {
        self.submit_with(&[self.sync.command_buffer])
    }

    fn submit_empty(&mut self) -> VkResult<()> {
        self.submit_with(&[])
    }

    fn present(&mut self, image_index: u32) -> VkResult<()> {
        self.swapchain
            .present(self.queues.present, image_index, &[self.sync.render_finished])
    }
}

impl VulkanFrame<'_> {
    fn submit_with(&self, command_buffers: &[vk::CommandBuffer]) -> VkResult<()> {
        let wait_semaphores = [self.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.sync.render_finished];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device.queue_submit(
                self.queues.graphics,
                &[submit_info],
                self.sync.in_flight_fence,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashSet;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Call {
        Wait,
        Reset,
        Acquire,
        Record,
        Submit,
        SubmitEmpty,
        Present,
    }

    /// Models the fence, the image-available semaphore and which images are
    /// held by the application. Fails each call listed in `failures` once.
    struct MockFrame {
        calls: Vec<Call>,
        failures: HashSet<Call>,
        fence_signaled: bool,
        image_available_signaled: bool,
        held_images: Vec<u32>,
        image_count: u32,
        next_image: u32,
        recorded: Vec<u32>,
        presented: Vec<u32>,
    }

    impl MockFrame {
        fn new(image_count: u32) -> Self {
            Self {
                calls: Vec::new(),
                failures: HashSet::new(),
                fence_signaled: true,
                image_available_signaled: false,
                held_images: Vec::new(),
                image_count,
                next_image: 0,
                recorded: Vec::new(),
                presented: Vec::new(),
            }
        }

        fn failing(mut self, call: Call) -> Self {
            self.failures.insert(call);
            self
        }

        fn call(&mut self, call: Call) -> VkResult<()> {
            self.calls.push(call);
            if self.failures.remove(&call) {
                Err(vk::Result::ERROR_DEVICE_LOST)
            } else {
                Ok(())
            }
        }

        fn queue_submit(&mut self, call: Call) -> VkResult<()> {
            assert!(!self.fence_signaled, "submitted with a signalled fence");
            assert!(self.image_available_signaled, "submit waits on an unsignalled semaphore");
            self.call(call)?;
            self.image_available_signaled = false;
            self.fence_signaled = true;
            Ok(())
        }

        /// Everything the frame touched is back where the next frame expects it
        fn assert_settled(&self) {
            assert!(!self.image_available_signaled, "image-available semaphore left signalled");
            assert!(self.held_images.is_empty(), "images never presented: {:?}", self.held_images);
        }
    }

    impl FrameCommands for MockFrame {
        fn wait_for_fence(&mut self) -> VkResult<()> {
            assert!(self.fence_signaled, "waiting on a fence nothing will signal");
            self.call(Call::Wait)
        }

        fn reset_fence(&mut self) -> VkResult<()> {
            assert!(self.fence_signaled, "fence reset twice");
            self.call(Call::Reset)?;
            self.fence_signaled = false;
            Ok(())
        }

        fn acquire_image(&mut self) -> VkResult<u32> {
            assert!(
                !self.image_available_signaled,
                "acquire with an already signalled image-available semaphore"
            );
            self.call(Call::Acquire)?;
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            self.image_available_signaled = true;
            self.held_images.push(index);
            Ok(index)
        }

        fn record(&mut self, image_index: u32) -> VkResult<()> {
            self.call(Call::Record)?;
            self.recorded.push(image_index);
            Ok(())
        }

        fn submit(&mut self) -> VkResult<()> {
            self.queue_submit(Call::Submit)
        }

        fn submit_empty(&mut self) -> VkResult<()> {
            self.queue_submit(Call::SubmitEmpty)
        }

        fn present(&mut self, image_index: u32) -> VkResult<()> {
            self.call(Call::Present)?;
            self.held_images.retain(|&held| held != image_index);
            self.presented.push(image_index);
            Ok(())
        }
    }

    const FULL_CYCLE: [Call; 6] = [
        Call::Wait,
        Call::Reset,
        Call::Acquire,
        Call::Record,
        Call::Submit,
        Call::Present,
    ];

    fn stage_of(err: RendererError) -> FrameStage {
        assert_eq!(err.kind(), ErrorKind::Frame);
        match err {
            RendererError::Frame { stage, .. } => stage,
            other => panic!("expected a frame error, got {:?}", other),
        }
    }

    #[test]
    fn single_frame_runs_every_stage_in_order() {
        let mut executor = FrameExecutor::new();
        let mut frame = MockFrame::new(3);

        let index = executor.run(&mut frame).unwrap();

        assert_eq!(index, 0);
        assert_eq!(frame.calls, FULL_CYCLE);
        assert_eq!(frame.recorded, vec![0]);
        assert_eq!(frame.presented, vec![0]);
        assert_eq!(executor.frames_presented(), 1);
        frame.assert_settled();
    }

    #[test]
    fn consecutive_frames_reuse_the_same_cycle() {
        let mut executor = FrameExecutor::new();
        let mut frame = MockFrame::new(3);

        for _ in 0..5 {
            executor.run(&mut frame).unwrap();
        }

        let expected: Vec<Call> = FULL_CYCLE.iter().copied().cycle().take(30).collect();
        assert_eq!(frame.calls, expected);
        assert_eq!(frame.presented, vec![0, 1, 2, 0, 1]);
        assert_eq!(executor.frames_presented(), 5);
        assert_eq!(executor.frames_dropped(), 0);
    }

    #[test]
    fn failed_record_hands_the_image_back() {
        let mut executor = FrameExecutor::new();
        let mut frame = MockFrame::new(2).failing(Call::Record);

        let err = executor.run(&mut frame).unwrap_err();
        assert_eq!(stage_of(err), FrameStage::Record);
        assert_eq!(
            frame.calls,
            [Call::Wait, Call::Reset, Call::Acquire, Call::Record, Call::SubmitEmpty, Call::Present]
        );
        assert!(!frame.calls.contains(&Call::Submit));
        frame.assert_settled();

        // Next acquire starts from an unsignalled semaphore and a signalled fence
        frame.calls.clear();
        assert_eq!(executor.run(&mut frame).unwrap(), 1);
        assert_eq!(frame.calls, FULL_CYCLE);
        frame.assert_settled();

        assert_eq!(executor.frames_dropped(), 1);
        assert_eq!(executor.frames_presented(), 1);
    }

    #[test]
    fn failed_submit_hands_the_image_back() {
        let mut executor = FrameExecutor::new();
        let mut frame = MockFrame::new(2).failing(Call::Submit);

        let err = executor.run(&mut frame).unwrap_err();
        assert_eq!(stage_of(err), FrameStage::Submit);
        assert_eq!(&frame.calls[4..], [Call::Submit, Call::SubmitEmpty, Call::Present]);
        frame.assert_settled();

        frame.calls.clear();
        executor.run(&mut frame).unwrap();
        assert_eq!(frame.calls, FULL_CYCLE);
        assert_eq!(frame.presented, vec![0, 1]);
    }

    #[test]
    fn failed_release_skips_wait_on_next_frame() {
        let mut executor = FrameExecutor::new();
        let mut frame = MockFrame::new(2)
            .failing(Call::Submit)
            .failing(Call::SubmitEmpty);

        let err = executor.run(&mut frame).unwrap_err();
        assert_eq!(stage_of(err), FrameStage::Submit);
        assert!(!frame.calls.contains(&Call::Present));

        // Only the fence bookkeeping is checked from here on
        frame.image_available_signaled = false;
        frame.held_images.clear();
        frame.calls.clear();
        executor.run(&mut frame).unwrap();
        assert_eq!(
            frame.calls,
            [Call::Acquire, Call::Record, Call::Submit, Call::Present]
        );

        frame.calls.clear();
        executor.run(&mut frame).unwrap();
        assert_eq!(frame.calls, FULL_CYCLE);
    }

    #[test]
    fn failed_acquire_drops_frame_and_resumes() {
        let mut executor = FrameExecutor::new();
        let mut frame = MockFrame::new(2).failing(Call::Acquire);

        let err = executor.run(&mut frame).unwrap_err();
        assert_eq!(stage_of(err), FrameStage::Acquire);
        assert!(frame.recorded.is_empty());
        frame.assert_settled();

        // Fence was reset without a submit, so no wait this time
        frame.calls.clear();
        assert_eq!(executor.run(&mut frame).unwrap(), 0);
        assert_eq!(
            frame.calls,
            [Call::Acquire, Call::Record, Call::Submit, Call::Present]
        );
    }

    #[test]
    fn failed_present_still_waits_on_next_frame() {
        let mut executor = FrameExecutor::new();
        let mut frame = MockFrame::new(2).failing(Call::Present);

        let err = executor.run(&mut frame).unwrap_err();
        assert_eq!(stage_of(err), FrameStage::Present);

        // The submit went through, so the fence will be signalled
        frame.calls.clear();
        executor.run(&mut frame).unwrap();
        assert_eq!(frame.calls, FULL_CYCLE);
    }

    #[test]
    fn failed_wait_retries_wait_on_next_frame() {
        let mut executor = FrameExecutor::new();
        let mut frame = MockFrame::new(2).failing(Call::Wait);

        let err = executor.run(&mut frame).unwrap_err();
        assert_eq!(stage_of(err), FrameStage::WaitFence);
        assert_eq!(frame.calls, [Call::Wait]);

        frame.calls.clear();
        executor.run(&mut frame).unwrap();
        assert_eq!(frame.calls, FULL_CYCLE);
    }
}
