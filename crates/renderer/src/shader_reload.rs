//! Recompiling shaders from the project source tree.
//!
//! The compile script lives at `<source>/scripts/compile_shaders.sh`
//! (`compile_shaders.bat` on Windows) and runs with `<source>/assets/shaders`
//! as its working directory.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{info, warn};

use pathview_core::{Error, ProjectConfig, Result};

/// What a reload request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// No source directory is configured.
    Disabled,
    /// The configured shader directory does not exist.
    MissingDirectory(PathBuf),
    /// The script exited successfully.
    Compiled,
    /// The script ran and exited with a failure status.
    ScriptFailed { status: Option<i32> },
}

impl ReloadOutcome {
    /// Whether pipelines should be rebuilt from the new binaries.
    pub fn should_rebuild(&self) -> bool {
        matches!(self, ReloadOutcome::Compiled)
    }
}

/// A fully resolved script invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileCommand {
    pub program: PathBuf,
    pub args: Vec<PathBuf>,
    pub current_dir: PathBuf,
}

impl CompileCommand {
    /// Invocation for the platform this binary was built for.
    pub fn for_source_dir(source_dir: &Path) -> Self {
        let scripts = source_dir.join("scripts");
        let current_dir = source_dir.join("assets").join("shaders");

        if cfg!(windows) {
            Self {
                program: PathBuf::from("cmd"),
                args: vec![PathBuf::from("/C"), scripts.join("compile_shaders.bat")],
                current_dir,
            }
        } else {
            Self {
                program: PathBuf::from("bash"),
                args: vec![scripts.join("compile_shaders.sh")],
                current_dir,
            }
        }
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).current_dir(&self.current_dir);
        command
    }
}

/// Runs the compile script for `config` and waits for it.
///
/// A missing configuration or directory is reported, not raised.
///
/// # Errors
///
/// [`Error::Shader`] when the script process cannot be started.
pub fn compile_shaders(config: &ProjectConfig) -> Result<ReloadOutcome> {
    let Some(source_dir) = &config.project_source_dir else {
        warn!("Shader reload requested but no project_source_dir is configured");
        return Ok(ReloadOutcome::Disabled);
    };

    let command = CompileCommand::for_source_dir(source_dir);
    if !command.current_dir.is_dir() {
        warn!(
            "Shader directory {} does not exist, skipping reload",
            command.current_dir.display()
        );
        return Ok(ReloadOutcome::MissingDirectory(command.current_dir));
    }

    info!(
        "Compiling shaders: {} {:?} in {}",
        command.program.display(),
        command.args,
        command.current_dir.display()
    );

    let status = command.to_command().status().map_err(|e| {
        Error::Shader(format!(
            "Failed to run {}: {}",
            command.program.display(),
            e
        ))
    })?;

    if status.success() {
        info!("Shader compilation finished");
        Ok(ReloadOutcome::Compiled)
    } else {
        warn!("Shader compilation failed with {}", status);
        Ok(ReloadOutcome::ScriptFailed {
            status: status.code(),
        })
    }
}
