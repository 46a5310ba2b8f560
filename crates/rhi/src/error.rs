//! Errors raised by the GPU abstraction layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load the Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// The allocator mutex was poisoned by a panicking thread
    #[error("Allocator lock poisoned")]
    AllocatorPoisoned,

    /// No GPU offers the required queues and features
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// A required device feature is missing
    #[error("Missing device feature: {0}")]
    MissingFeature(String),

    /// Shader module error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle or argument
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Caller-supplied parameters rejected before any GPU work
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

impl<T> From<std::sync::PoisonError<T>> for RhiError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        RhiError::AllocatorPoisoned
    }
}
