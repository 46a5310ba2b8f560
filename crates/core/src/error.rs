//! Error types for the application layers above the GPU abstraction.

use thiserror::Error;

/// Main error type for pathview.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors surfaced through the platform layer
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Shader reload errors (script launch, missing directories)
    #[error("Shader error: {0}")]
    Shader(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using pathview's Error type.
pub type Result<T> = std::result::Result<T, Error>;
