//! Core utilities shared by every pathview crate.
//!
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing
//! - Project configuration loading

mod config;
mod error;
mod logging;
mod timer;

pub use config::{CONFIG_FILE_NAME, ProjectConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::FrameTimer;
