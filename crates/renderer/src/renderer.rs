//! Top-level renderer: Vulkan bootstrap, the frame loop and shader reload.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{error, info, warn};

use pathview_core::ProjectConfig;
use pathview_platform::{Surface, Window, required_instance_extensions};
use pathview_rhi::device::Device;
use pathview_rhi::instance::Instance;
use pathview_rhi::physical_device::select_physical_device;
use pathview_rhi::swapchain::Swapchain;
use pathview_rhi::{RhiError, RhiResult};

use crate::backend::VulkanBackend;
use crate::frame_loop::{DrawOutcome, FrameError, FrameLoop};
use crate::overlay::Overlay;
use crate::scene::SceneState;
use crate::settings::RendererSettings;
use crate::shader_reload::{self, ReloadOutcome};

pub struct Renderer {
    frame_loop: ManuallyDrop<FrameLoop<VulkanBackend>>,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,
    config: ProjectConfig,
}

impl Renderer {
    /// Brings up Vulkan for `window` and builds every per-frame resource.
    ///
    /// # Errors
    ///
    /// Any failure here is an initialization failure; objects created so far
    /// are released before returning.
    pub fn new(
        window: &Window,
        config: ProjectConfig,
        settings: RendererSettings,
    ) -> RhiResult<Self> {
        settings.validate()?;

        let extent = window.extent();
        info!(
            "Initializing renderer ({}x{}, {} frame(s) in flight)",
            extent.width, extent.height, settings.frames_in_flight
        );

        let display_handle = window
            .raw_display_handle()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let extensions = required_instance_extensions(display_handle)
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let instance = Instance::with_extensions(settings.validation, &extensions)?;
        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device_info)?;

        let swapchain = Swapchain::new(&instance, device.clone(), surface.handle(), extent)?;
        let backend = VulkanBackend::new(
            device.clone(),
            swapchain,
            &config.shader_dir(),
            settings,
            extent,
        )?;

        Ok(Self {
            frame_loop: ManuallyDrop::new(FrameLoop::new(backend)),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
            config,
        })
    }

    /// Draws one frame.
    ///
    /// # Errors
    ///
    /// A returned error is fatal for the renderer.
    pub fn draw(&mut self) -> Result<DrawOutcome, FrameError> {
        self.frame_loop.draw().inspect_err(|e| {
            error!("Fatal error during {}: {}", e.stage(), e);
        })
    }

    /// Records the new window size and schedules a swapchain rebuild after
    /// the next present.
    pub fn request_resize(&mut self, width: u32, height: u32) {
        self.frame_loop
            .backend_mut()
            .set_window_extent(vk::Extent2D { width, height });
        self.frame_loop.request_resize();
    }

    /// Regenerates per-frame scene inputs.
    pub fn update(&mut self) {
        self.frame_loop.backend_mut().scene_mut().update();
    }

    /// Runs the shader compile script, then rebuilds the pipelines if it
    /// succeeded.
    pub fn reload_shaders(&mut self) -> RhiResult<ReloadOutcome> {
        let outcome = shader_reload::compile_shaders(&self.config)
            .map_err(|e| RhiError::ShaderError(e.to_string()))?;

        if outcome.should_rebuild() {
            self.frame_loop.backend_mut().reload_pipelines()?;
        } else if let ReloadOutcome::ScriptFailed { status } = &outcome {
            warn!(
                "Keeping current pipelines, compile script exited with {:?}",
                status
            );
        }
        Ok(outcome)
    }

    pub fn set_overlay(&mut self, overlay: Box<dyn Overlay>) {
        self.frame_loop.backend_mut().set_overlay(overlay);
    }

    pub fn scene(&self) -> &SceneState {
        self.frame_loop.backend().scene()
    }

    pub fn scene_mut(&mut self) -> &mut SceneState {
        self.frame_loop.backend_mut().scene_mut()
    }

    pub fn frame_index(&self) -> usize {
        self.frame_loop.frame_index()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.frame_loop.backend().swapchain().extent()
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_queues_idle() {
            error!("Failed to idle queues during renderer drop: {}", e);
        }

        // SAFETY: each field is dropped exactly once, here, in dependency
        // order: GPU objects, then the device, surface and instance.
        unsafe {
            ManuallyDrop::drop(&mut self.frame_loop);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}
