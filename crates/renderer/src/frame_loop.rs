//! The per-frame draw state machine.
//!
//! [`FrameLoop`] owns the frame counter, the sync-bundle cursor, the
//! in-flight table and the resize flag, and drives a [`FrameBackend`]
//! through the fixed step order of one frame:
//!
//! 1. start frame timing
//! 2. wait on the current frame slot's fence
//! 3. rewrite the slot's buffers
//! 4. record and submit compute work
//! 5. wait on the current sync bundle
//! 6. acquire a swapchain image (stale → rebuild, report out of date)
//! 7. record graphics work for that image
//! 8. wait on whatever fence last targeted that image, register ours
//! 9. submit graphics work and present
//! 10. rebuild on a stale/suboptimal present or a pending resize
//! 11. advance the frame index and stop frame timing
//!
//! Any error aborts the frame at the step that produced it. A rebuild the
//! surface cannot take yet (zero extent while minimizing) is not an error:
//! the resize flag stays set and the next draw retries.

use std::fmt;

use ash::vk;
use thiserror::Error;
use tracing::{debug, info, trace};

use pathview_core::FrameTimer;
use pathview_rhi::RhiError;

use crate::frame_slot::SlotBindings;
use crate::in_flight::ImagesInFlight;

/// Where in the frame an error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameStage {
    WaitSlot,
    WriteSlot,
    SubmitCompute,
    WaitBundle,
    Acquire,
    RecordGraphics,
    WaitInFlight,
    SubmitGraphics,
    Present,
    Rebuild,
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameStage::WaitSlot => "frame slot wait",
            FrameStage::WriteSlot => "frame slot upload",
            FrameStage::SubmitCompute => "compute submission",
            FrameStage::WaitBundle => "sync bundle wait",
            FrameStage::Acquire => "image acquisition",
            FrameStage::RecordGraphics => "graphics recording",
            FrameStage::WaitInFlight => "in-flight image wait",
            FrameStage::SubmitGraphics => "graphics submission",
            FrameStage::Present => "presentation",
            FrameStage::Rebuild => "swapchain rebuild",
        };
        f.write_str(name)
    }
}

/// Unrecoverable failure while drawing a frame.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("{stage} failed: {source}")]
    Gpu {
        stage: FrameStage,
        #[source]
        source: RhiError,
    },

    #[error("{stage} returned {result}")]
    Vulkan {
        stage: FrameStage,
        result: vk::Result,
    },
}

impl FrameError {
    pub fn stage(&self) -> FrameStage {
        match self {
            FrameError::Gpu { stage, .. } | FrameError::Vulkan { stage, .. } => *stage,
        }
    }

    /// Adapter for `map_err` that tags an [`RhiError`] with `stage`.
    pub fn at(stage: FrameStage) -> impl FnOnce(RhiError) -> Self {
        move |source| FrameError::Gpu { stage, source }
    }
}

/// Result of a completed [`FrameLoop::draw`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// The frame was submitted and presented.
    Success,
    /// Acquisition found a stale swapchain. It has been rebuilt and the frame
    /// was dropped; the frame index did not advance.
    SwapchainOutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    Stale,
}

/// Result of [`FrameBackend::rebuild_swapchain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    Rebuilt,
    /// The surface has a zero extent; the old swapchain was left in place.
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Out of date or suboptimal; the swapchain should be rebuilt.
    Stale,
}

/// Which frame slot, sync bundle and swapchain image a frame uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTarget {
    pub slot: usize,
    pub bundle: usize,
    pub image_index: u32,
}

/// Timing values handed to the overlay while recording.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameStats {
    pub frame_index: usize,
    pub since_last_frame: f64,
    pub average_frame_time: f64,
}

impl FrameStats {
    pub fn fps(&self) -> f64 {
        if self.average_frame_time > 0.0 {
            1.0 / self.average_frame_time
        } else {
            0.0
        }
    }
}

/// GPU operations the draw loop sequences.
///
/// The Vulkan implementation lives in [`crate::backend`]; tests substitute
/// a recording mock. All waits are unbounded.
pub trait FrameBackend {
    /// Identity of a sync-bundle fence, stored in the in-flight table.
    type Fence: Clone + PartialEq + fmt::Debug;

    /// Number of frame slots (frames in flight).
    fn slot_count(&self) -> usize;

    /// Number of swapchain images, which is also the number of sync bundles.
    fn image_count(&self) -> usize;

    /// Blocks until the slot's compute fence signals, then resets it.
    fn wait_slot(&mut self, slot: usize) -> Result<(), FrameError>;

    /// Overwrites the slot's uniform and storage buffers.
    fn write_slot(&mut self, slot: usize) -> Result<(), FrameError>;

    /// Records the slot's compute commands and submits them, signaling the
    /// slot fence.
    fn submit_compute(&mut self, slot: usize) -> Result<(), FrameError>;

    /// Blocks until the bundle's fence signals and resets its command buffer.
    fn wait_bundle(&mut self, bundle: usize) -> Result<(), FrameError>;

    fn acquire(&mut self, bundle: usize) -> Result<AcquireOutcome, FrameError>;

    fn record_graphics(&mut self, target: FrameTarget, stats: &FrameStats)
    -> Result<(), FrameError>;

    fn bundle_fence(&self, bundle: usize) -> Self::Fence;

    fn wait_fence(&mut self, fence: &Self::Fence) -> Result<(), FrameError>;

    /// Re-arms the bundle fence and submits the graphics commands.
    fn submit_graphics(&mut self, target: FrameTarget) -> Result<(), FrameError>;

    fn present(&mut self, target: FrameTarget) -> Result<PresentOutcome, FrameError>;

    /// Idles the queues and rebuilds swapchain, views, framebuffers and, when
    /// the image count changed, the sync bundles.
    ///
    /// Returns [`RebuildOutcome::Deferred`] without touching any of them while
    /// the surface extent is zero.
    fn rebuild_swapchain(&mut self) -> Result<RebuildOutcome, FrameError>;

    /// Handles bound to the slot's descriptor sets.
    fn slot_bindings(&self, slot: usize) -> SlotBindings;
}

pub struct FrameLoop<B: FrameBackend> {
    backend: B,
    frame_index: usize,
    bundle_cursor: usize,
    in_flight: ImagesInFlight<B::Fence>,
    resize_requested: bool,
    timer: FrameTimer,
    frames_drawn: u64,
}

impl<B: FrameBackend> FrameLoop<B> {
    pub fn new(backend: B) -> Self {
        let image_count = backend.image_count();
        info!(
            "Frame loop ready: {} frame slot(s), {} swapchain image(s)",
            backend.slot_count(),
            image_count
        );

        Self {
            backend,
            frame_index: 0,
            bundle_cursor: 0,
            in_flight: ImagesInFlight::new(image_count),
            resize_requested: false,
            timer: FrameTimer::new(),
            frames_drawn: 0,
        }
    }

    /// Draws one frame.
    ///
    /// # Errors
    ///
    /// A [`FrameError`] is fatal; the loop must not be driven further.
    pub fn draw(&mut self) -> Result<DrawOutcome, FrameError> {
        self.timer.frame_start();
        let slot = self.frame_index;

        self.backend.wait_slot(slot)?;
        self.backend.write_slot(slot)?;
        self.backend.submit_compute(slot)?;

        let bundle = self.bundle_cursor;
        self.backend.wait_bundle(bundle)?;

        let image_index = match self.backend.acquire(bundle)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    trace!("Acquired image {} from a suboptimal swapchain", image_index);
                }
                image_index
            }
            AcquireOutcome::Stale => {
                debug!("Swapchain out of date on acquire, rebuilding");
                self.rebuild()?;
                return Ok(DrawOutcome::SwapchainOutOfDate);
            }
        };

        let target = FrameTarget {
            slot,
            bundle,
            image_index,
        };
        let stats = self.stats();
        self.backend.record_graphics(target, &stats)?;

        let fence = self.backend.bundle_fence(bundle);
        if let Some(previous) = self.in_flight.replace(image_index as usize, fence) {
            self.backend.wait_fence(&previous)?;
        }

        self.backend.submit_graphics(target)?;
        self.bundle_cursor = (bundle + 1) % self.backend.image_count();

        let presented = self.backend.present(target)?;
        if presented == PresentOutcome::Stale || self.resize_requested {
            debug!(
                "Rebuilding swapchain after present ({:?}, resize requested: {})",
                presented, self.resize_requested
            );
            self.rebuild()?;
        }

        self.frame_index = (slot + 1) % self.backend.slot_count();
        self.frames_drawn += 1;
        self.timer.frame_stop();
        Ok(DrawOutcome::Success)
    }

    /// Flags the swapchain for rebuild after the next present.
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    pub fn resize_requested(&self) -> bool {
        self.resize_requested
    }

    /// Slot the next draw will use.
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn bundle_cursor(&self) -> usize {
        self.bundle_cursor
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn in_flight(&self) -> &ImagesInFlight<B::Fence> {
        &self.in_flight
    }

    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    fn stats(&self) -> FrameStats {
        FrameStats {
            frame_index: self.frame_index,
            since_last_frame: self.timer.since_last_frame(),
            average_frame_time: self.timer.average_frame_time(),
        }
    }

    fn rebuild(&mut self) -> Result<(), FrameError> {
        match self.backend.rebuild_swapchain()? {
            RebuildOutcome::Rebuilt => {
                self.resize_requested = false;

                // The backend idled every queue, so no registered fence is pending.
                let image_count = self.backend.image_count();
                self.in_flight.reset(image_count);
                self.bundle_cursor %= image_count.max(1);
                debug!("Frame loop now tracks {} swapchain image(s)", image_count);
            }
            RebuildOutcome::Deferred => {
                debug!("Surface has no area, swapchain rebuild deferred");
                self.resize_requested = true;
            }
        }
        Ok(())
    }
}
