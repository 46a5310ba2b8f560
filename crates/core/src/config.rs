//! Project configuration loaded from `project_configuration.json`.
//!
//! The only recognised field is `project_source_dir`, the directory that holds
//! `assets/shaders` and the shader compile scripts. Configuration is optional:
//! a missing file or field leaves shader reload disabled.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "project_configuration.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Root of the source tree. `None` disables shader reload.
    #[serde(default)]
    pub project_source_dir: Option<PathBuf>,
}

impl ProjectConfig {
    /// Parse a configuration from JSON text.
    ///
    /// An empty `project_source_dir` is treated as absent.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut config: Self =
            serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        if config
            .project_source_dir
            .as_ref()
            .is_some_and(|dir| dir.as_os_str().is_empty())
        {
            config.project_source_dir = None;
        }
        Ok(config)
    }

    /// Load the configuration at `path`.
    ///
    /// A missing file yields the default configuration with a warning.
    /// A file that exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} not found, shader reload disabled", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let config = Self::from_json(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        match &config.project_source_dir {
            Some(dir) => info!("Project source directory: {}", dir.display()),
            None => warn!(
                "{} has no project_source_dir, shader reload disabled",
                path.display()
            ),
        }

        Ok(config)
    }

    /// Load from [`CONFIG_FILE_NAME`] in the working directory, falling back
    /// to defaults on any error.
    pub fn load_or_default() -> Self {
        Self::load(Path::new(CONFIG_FILE_NAME)).unwrap_or_else(|e| {
            warn!("Ignoring project configuration: {}", e);
            Self::default()
        })
    }

    /// Directory holding the compiled shaders.
    ///
    /// Relative to the working directory when no source directory is set.
    pub fn shader_dir(&self) -> PathBuf {
        let dir = match &self.project_source_dir {
            Some(root) => root.join("assets").join("shaders"),
            None => PathBuf::from("assets").join("shaders"),
        };
        debug!("Shader directory: {}", dir.display());
        dir
    }
}
