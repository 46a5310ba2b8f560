//! Presentation synchronization, one bundle per swapchain image.
//!
//! ```text
//! 1. wait_and_reset   (CPU blocks on the bundle fence)
//! 2. acquire          (signals image_available)
//! 3. record into command_buffer
//! 4. submit           (waits image_available, signals render_finished + fence)
//! 5. present          (waits render_finished)
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use pathview_rhi::RhiResult;
use pathview_rhi::command::{CommandBuffer, CommandPool};
use pathview_rhi::device::Device;
use pathview_rhi::swapchain::Swapchain;
use pathview_rhi::sync::{Fence, Semaphore};

use crate::frame_loop::{AcquireOutcome, PresentOutcome};

pub struct SyncBundle {
    device: Arc<Device>,
    image_available: Semaphore,
    render_finished: Semaphore,
    fence: Fence,
    command_buffer: CommandBuffer,
    // Declared last: the command buffer above is freed with it.
    command_pool: CommandPool,
}

impl SyncBundle {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let command_pool = CommandPool::new(device.clone(), device.topology().graphics().family)?;
        let command_buffer = CommandBuffer::new(device.clone(), &command_pool)?;

        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            // Signaled so the first wait_and_reset returns immediately.
            fence: Fence::new(device.clone(), true)?,
            command_buffer,
            command_pool,
            device,
        })
    }

    /// Creates `count` bundles.
    pub fn create_set(device: &Arc<Device>, count: usize) -> RhiResult<Vec<Self>> {
        let bundles = (0..count)
            .map(|_| Self::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;
        debug!("Created {} sync bundle(s)", bundles.len());
        Ok(bundles)
    }

    /// Blocks until the last submission of this bundle finished, then makes
    /// its command buffer recordable again.
    ///
    /// The fence stays signaled until [`submit`](Self::submit).
    pub fn wait_and_reset(&self) -> RhiResult<()> {
        self.fence.wait(u64::MAX)?;
        self.command_buffer.reset()
    }

    /// Acquires the next swapchain image, signaling `image_available`.
    pub fn acquire(&self, swapchain: &Swapchain) -> Result<AcquireOutcome, vk::Result> {
        classify_acquire(swapchain.acquire_next_image(self.image_available.handle()))
    }

    /// Submits the recorded command buffer to the graphics queue.
    ///
    /// Always waits on `image_available` at colour output; `extra_waits` adds
    /// further semaphores (the cross-queue compute signal). Signals
    /// `render_finished` and re-arms then signals the bundle fence.
    pub fn submit(&self, extra_waits: &[(vk::Semaphore, vk::PipelineStageFlags)]) -> RhiResult<()> {
        let mut wait_semaphores = vec![self.image_available.handle()];
        let mut wait_stages = vec![vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        for &(semaphore, stage) in extra_waits {
            wait_semaphores.push(semaphore);
            wait_stages.push(stage);
        }

        let command_buffers = [self.command_buffer.handle()];
        let signal_semaphores = [self.render_finished.handle()];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        self.fence.reset()?;
        // SAFETY: the buffer was recorded since wait_and_reset and the fence
        // was just reset; no other submission references it.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], self.fence.handle())
        }
    }

    /// Presents `image_index` once `render_finished` signals.
    pub fn present(
        &self,
        swapchain: &Swapchain,
        queue: vk::Queue,
        image_index: u32,
    ) -> Result<PresentOutcome, vk::Result> {
        classify_present(swapchain.present(queue, image_index, self.render_finished.handle()))
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn fence(&self) -> &Fence {
        &self.fence
    }
}

/// Maps a raw acquire result: out of date is recoverable, everything other
/// than success or suboptimal is returned as an error.
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> Result<AcquireOutcome, vk::Result> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::Stale),
        Err(e) => Err(e),
    }
}

/// Maps a raw present result. Suboptimal counts as stale.
pub fn classify_present(result: Result<bool, vk::Result>) -> Result<PresentOutcome, vk::Result> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_acquire() {
        assert_eq!(
            classify_acquire(Ok((2, false))),
            Ok(AcquireOutcome::Acquired {
                image_index: 2,
                suboptimal: false
            })
        );
        assert_eq!(
            classify_acquire(Ok((0, true))),
            Ok(AcquireOutcome::Acquired {
                image_index: 0,
                suboptimal: true
            })
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Ok(AcquireOutcome::Stale)
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            Err(vk::Result::ERROR_SURFACE_LOST_KHR)
        );
    }

    #[test]
    fn test_classify_present() {
        assert_eq!(classify_present(Ok(false)), Ok(PresentOutcome::Presented));
        assert_eq!(classify_present(Ok(true)), Ok(PresentOutcome::Stale));
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Ok(PresentOutcome::Stale)
        );
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(vk::Result::ERROR_DEVICE_LOST)
        );
    }

    #[test]
    fn test_sync_bundle_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<SyncBundle>();
    }
}
