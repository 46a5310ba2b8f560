//! Thin RAII layer over Vulkan (`ash`) used by the pathview renderer.
//!
//! Covers instance and device bring-up, the swapchain, command recording,
//! buffers, the storage/sampled output image, descriptors, pipelines and
//! synchronization primitives. Queue layout is described by
//! [`device::QueueTopology`].

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
