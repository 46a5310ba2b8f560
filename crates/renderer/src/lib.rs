//! Compute ray-tracing presenter.
//!
//! Each frame a compute pass ray-traces the scene into an output image, and
//! a fullscreen-triangle pass samples that image onto the swapchain:
//!
//! - [`frame_loop`] sequences one frame against the [`FrameBackend`] trait
//! - [`backend`] implements that trait over Vulkan
//! - [`frame_slot`] and [`sync_bundle`] hold the per-frame and per-image
//!   GPU resources
//! - [`renderer`] ties bootstrap, the loop and shader reload together

pub mod backend;
pub mod bindings;
pub mod frame_loop;
pub mod frame_slot;
pub mod in_flight;
pub mod overlay;
pub mod pipelines;
pub mod recorder;
pub mod renderer;
pub mod scene;
pub mod settings;
pub mod shader_reload;
pub mod sync_bundle;

pub use frame_loop::{
    AcquireOutcome, DrawOutcome, FrameBackend, FrameError, FrameLoop, FrameStage, FrameStats,
    FrameTarget, PresentOutcome, RebuildOutcome,
};
pub use frame_slot::{ComputeHandoff, SlotBindings};
pub use in_flight::ImagesInFlight;
pub use overlay::{Overlay, StatsOverlay};
pub use renderer::Renderer;
pub use settings::{FRAMES_IN_FLIGHT, RendererSettings, SettingsError};
pub use shader_reload::ReloadOutcome;
