/// VulkanFence / VulkanQueue - submission and CPU/GPU synchronization
///
/// A fence is a timeline semaphore. Queue signals are empty submissions that
/// signal the timeline, so they complete after everything submitted before.

use ash::vk;
use nebula_engine::nebula::Result;
use nebula_engine::nebula::device::{CommandList, CommandQueue, Fence, Surface};
use nebula_engine::{engine_err, engine_trace};
use std::sync::Arc;
use std::time::Duration;

use crate::vulkan_command_list::VulkanCommandList;
use crate::vulkan_context::GpuContext;
use crate::vulkan_swapchain::VulkanSurface;

/// Timeout in nanoseconds, saturating at "forever"
pub(crate) fn timeout_ns(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

// ===== FENCE =====

/// Timeline-semaphore fence
pub struct VulkanFence {
    ctx: Arc<GpuContext>,
    pub(crate) semaphore: vk::Semaphore,
}

impl VulkanFence {
    pub(crate) fn new(ctx: Arc<GpuContext>, initial_value: u64) -> Result<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

        let semaphore = unsafe { ctx.device.create_semaphore(&create_info, None) }
            .map_err(|e| engine_err!("nebula::vulkan", "Failed to create timeline semaphore: {:?}", e))?;

        Ok(Self { ctx, semaphore })
    }

    pub(crate) fn from_dyn(fence: &dyn Fence) -> &VulkanFence {
        unsafe { &*(fence as *const dyn Fence as *const VulkanFence) }
    }
}

impl Fence for VulkanFence {
    fn completed_value(&self) -> Result<u64> {
        unsafe { self.ctx.device.get_semaphore_counter_value(self.semaphore) }
            .map_err(|e| engine_err!("nebula::vulkan", "Failed to read timeline value: {:?}", e))
    }

    fn wait(&self, value: u64, timeout: Duration) -> Result<bool> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);

        match unsafe { self.ctx.device.wait_semaphores(&wait_info, timeout_ns(timeout)) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => {
                engine_trace!("nebula::vulkan", "Timeline wait for {} timed out", value);
                Ok(false)
            }
            Err(e) => Err(engine_err!("nebula::vulkan", "Timeline wait for {} failed: {:?}", value, e)),
        }
    }
}

impl Drop for VulkanFence {
    fn drop(&mut self) {
        unsafe { self.ctx.device.destroy_semaphore(self.semaphore, None) };
    }
}

// ===== QUEUE =====

/// The graphics queue
pub struct VulkanQueue {
    ctx: Arc<GpuContext>,
}

impl VulkanQueue {
    pub(crate) fn new(ctx: Arc<GpuContext>) -> Self {
        Self { ctx }
    }

    fn submit(&self, submit_info: vk::SubmitInfo2<'_>) -> Result<()> {
        let queue = self.ctx.queue()?;
        unsafe { self.ctx.device.queue_submit2(*queue, &[submit_info], vk::Fence::null()) }
            .map_err(|e| engine_err!("nebula::vulkan", "Failed to submit to the graphics queue: {:?}", e))
    }
}

impl CommandQueue for VulkanQueue {
    fn execute(&self, list: &dyn CommandList, surface: Option<&dyn Surface>) -> Result<()> {
        let list = VulkanCommandList::from_dyn(list);
        let command_buffers = [vk::CommandBufferSubmitInfo::default().command_buffer(list.command_buffer())];

        match surface {
            Some(surface) => {
                // Wait for the acquired image before writing it, and let present wait for us
                let (acquired, rendered) = VulkanSurface::from_dyn(surface).sync_info();
                let waits = [vk::SemaphoreSubmitInfo::default()
                    .semaphore(acquired)
                    .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)];
                let signals = [vk::SemaphoreSubmitInfo::default()
                    .semaphore(rendered)
                    .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];
                self.submit(
                    vk::SubmitInfo2::default()
                        .wait_semaphore_infos(&waits)
                        .command_buffer_infos(&command_buffers)
                        .signal_semaphore_infos(&signals),
                )
            }
            None => self.submit(vk::SubmitInfo2::default().command_buffer_infos(&command_buffers)),
        }
    }

    fn signal(&self, fence: &dyn Fence, value: u64) -> Result<()> {
        let fence = VulkanFence::from_dyn(fence);
        let signals = [vk::SemaphoreSubmitInfo::default()
            .semaphore(fence.semaphore)
            .value(value)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];
        self.submit(vk::SubmitInfo2::default().signal_semaphore_infos(&signals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_ns_converts_milliseconds() {
        assert_eq!(timeout_ns(Duration::from_millis(10)), 10_000_000);
    }

    #[test]
    fn test_timeout_ns_saturates() {
        assert_eq!(timeout_ns(Duration::MAX), u64::MAX);
    }
}
