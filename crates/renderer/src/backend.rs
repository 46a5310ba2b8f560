//! [`FrameBackend`] over real Vulkan objects.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use pathview_rhi::device::Device;
use pathview_rhi::render_pass::{Framebuffer, RenderPass};
use pathview_rhi::swapchain::{self, Swapchain};
use pathview_rhi::{RhiError, RhiResult};

use crate::frame_loop::{
    AcquireOutcome, FrameBackend, FrameError, FrameStage, FrameStats, FrameTarget, PresentOutcome,
    RebuildOutcome,
};
use crate::frame_slot::{FrameResources, SlotBindings};
use crate::overlay::{Overlay, StatsOverlay};
use crate::pipelines::FramePipelines;
use crate::recorder::{self, PresentTarget, SampledOutput};
use crate::scene::SceneState;
use crate::settings::RendererSettings;
use crate::sync_bundle::SyncBundle;

/// Every GPU object the frame loop drives.
///
/// Field order is drop order.
pub struct VulkanBackend {
    frames: FrameResources,
    pipelines: FramePipelines,
    overlay: Box<dyn Overlay>,
    render_pass: RenderPass,
    framebuffers: Vec<Framebuffer>,
    bundles: Vec<SyncBundle>,
    swapchain: Swapchain,
    scene: SceneState,
    settings: RendererSettings,
    /// Used when the surface leaves the swapchain extent to the application.
    window_extent: vk::Extent2D,
    device: Arc<Device>,
}

impl VulkanBackend {
    pub fn new(
        device: Arc<Device>,
        swapchain: Swapchain,
        shader_dir: &std::path::Path,
        settings: RendererSettings,
        window_extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let scene = SceneState::new();

        let frames = FrameResources::with_slots(
            device.clone(),
            settings.frames_in_flight,
            settings.output_extent,
            scene.sphere_buffer_size(),
        )?;

        let render_pass = RenderPass::new_present_pass(device.clone(), swapchain.format())?;
        let framebuffers = Framebuffer::for_swapchain(
            device.clone(),
            &render_pass,
            swapchain.image_views(),
            swapchain.extent(),
        )?;
        let bundles = SyncBundle::create_set(&device, swapchain.image_count())?;

        let pipelines = FramePipelines::new(
            device.clone(),
            shader_dir,
            frames.compute_layout(),
            frames.graphics_layout(),
            render_pass.handle(),
        )?;

        info!(
            "Backend ready: {} slot(s), {} swapchain image(s), {} topology",
            frames.len(),
            bundles.len(),
            if device.topology().is_dual() {
                "dual-queue"
            } else {
                "single-queue"
            }
        );

        Ok(Self {
            frames,
            pipelines,
            overlay: Box::new(StatsOverlay::default()),
            render_pass,
            framebuffers,
            bundles,
            swapchain,
            scene,
            settings,
            window_extent,
            device,
        })
    }

    pub fn set_overlay(&mut self, overlay: Box<dyn Overlay>) {
        self.overlay = overlay;
    }

    pub fn set_window_extent(&mut self, extent: vk::Extent2D) {
        self.window_extent = extent;
    }

    pub fn scene(&self) -> &SceneState {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut SceneState {
        &mut self.scene
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Swaps in pipelines rebuilt from the current shader binaries.
    pub fn reload_pipelines(&mut self) -> RhiResult<()> {
        self.device.wait_queues_idle()?;
        self.pipelines
            .reload(&self.device, self.render_pass.handle())
    }

    fn rebuild(&mut self) -> RhiResult<RebuildOutcome> {
        self.device.wait_queues_idle()?;

        // Nothing is pending now, so every recorded reader fence is stale.
        for slot in self.frames.slots_mut() {
            slot.clear_reader_fence();
        }

        let extent = self.swapchain.surface_extent(self.window_extent)?;
        if swapchain::is_zero_extent(extent) {
            return Ok(RebuildOutcome::Deferred);
        }

        self.framebuffers.clear();
        self.swapchain.rebuild(self.window_extent)?;
        self.framebuffers = Framebuffer::for_swapchain(
            self.device.clone(),
            &self.render_pass,
            self.swapchain.image_views(),
            self.swapchain.extent(),
        )?;

        if self.bundles.len() != self.swapchain.image_count() {
            debug!(
                "Swapchain image count changed {} -> {}, recreating sync bundles",
                self.bundles.len(),
                self.swapchain.image_count()
            );
            self.bundles.clear();
            self.bundles = SyncBundle::create_set(&self.device, self.swapchain.image_count())?;
        }
        Ok(RebuildOutcome::Rebuilt)
    }
}

impl FrameBackend for VulkanBackend {
    type Fence = vk::Fence;

    fn slot_count(&self) -> usize {
        self.frames.len()
    }

    fn image_count(&self) -> usize {
        self.bundles.len()
    }

    fn wait_slot(&mut self, slot: usize) -> Result<(), FrameError> {
        self.frames
            .slot_mut(slot)
            .wait_and_reset()
            .map_err(FrameError::at(FrameStage::WaitSlot))
    }

    fn write_slot(&mut self, slot: usize) -> Result<(), FrameError> {
        self.frames
            .slot(slot)
            .write(&self.scene)
            .map_err(FrameError::at(FrameStage::WriteSlot))
    }

    fn submit_compute(&mut self, slot: usize) -> Result<(), FrameError> {
        let tile = self.settings.workgroup_tile;
        self.frames
            .slot_mut(slot)
            .submit_compute(
                self.pipelines.compute(),
                self.pipelines.compute_layout(),
                tile,
            )
            .map_err(FrameError::at(FrameStage::SubmitCompute))
    }

    fn wait_bundle(&mut self, bundle: usize) -> Result<(), FrameError> {
        self.bundles[bundle]
            .wait_and_reset()
            .map_err(FrameError::at(FrameStage::WaitBundle))
    }

    fn acquire(&mut self, bundle: usize) -> Result<AcquireOutcome, FrameError> {
        self.bundles[bundle]
            .acquire(&self.swapchain)
            .map_err(|result| FrameError::Vulkan {
                stage: FrameStage::Acquire,
                result,
            })
    }

    fn record_graphics(
        &mut self,
        target: FrameTarget,
        stats: &FrameStats,
    ) -> Result<(), FrameError> {
        let slot = self.frames.slot(target.slot);
        let framebuffer = self
            .framebuffers
            .get(target.image_index as usize)
            .ok_or_else(|| FrameError::Gpu {
                stage: FrameStage::RecordGraphics,
                source: RhiError::InvalidHandle(format!(
                    "No framebuffer for swapchain image {}",
                    target.image_index
                )),
            })?;

        recorder::record_graphics(
            self.bundles[target.bundle].command_buffer(),
            PresentTarget {
                render_pass: self.render_pass.handle(),
                framebuffer: framebuffer.handle(),
                extent: self.swapchain.extent(),
            },
            SampledOutput {
                image: slot.output().image(),
                graphics_set: slot.graphics_set(),
            },
            self.pipelines.graphics(),
            self.pipelines.graphics_layout(),
            self.overlay.as_mut(),
            stats,
        )
        .map_err(FrameError::at(FrameStage::RecordGraphics))
    }

    fn bundle_fence(&self, bundle: usize) -> vk::Fence {
        self.bundles[bundle].fence().handle()
    }

    fn wait_fence(&mut self, fence: &vk::Fence) -> Result<(), FrameError> {
        let waited = unsafe {
            self.device
                .handle()
                .wait_for_fences(&[*fence], true, u64::MAX)
        };
        waited.map_err(|result| FrameError::Vulkan {
            stage: FrameStage::WaitInFlight,
            result,
        })
    }

    fn submit_graphics(&mut self, target: FrameTarget) -> Result<(), FrameError> {
        let slot = self.frames.slot_mut(target.slot);
        let waits: Vec<_> = slot.take_compute_wait().into_iter().collect();

        let bundle = &self.bundles[target.bundle];
        bundle
            .submit(&waits)
            .map_err(FrameError::at(FrameStage::SubmitGraphics))?;
        slot.set_reader_fence(bundle.fence().handle());
        Ok(())
    }

    fn present(&mut self, target: FrameTarget) -> Result<PresentOutcome, FrameError> {
        self.bundles[target.bundle]
            .present(
                &self.swapchain,
                self.device.present_queue().queue,
                target.image_index,
            )
            .map_err(|result| FrameError::Vulkan {
                stage: FrameStage::Present,
                result,
            })
    }

    fn rebuild_swapchain(&mut self) -> Result<RebuildOutcome, FrameError> {
        self.rebuild().map_err(FrameError::at(FrameStage::Rebuild))
    }

    fn slot_bindings(&self, slot: usize) -> SlotBindings {
        self.frames.slot(slot).bindings()
    }
}
