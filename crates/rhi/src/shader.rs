//! SPIR-V loading and `VkShaderModule` ownership.
//!
//! # Overview
//!
//! - [`ShaderStage`] names the pipeline stage a module is built for
//! - [`Shader`] owns the module together with its stage and entry point
//!
//! The renderer rebuilds its pipelines from these on a shader reload, so a
//! module only has to outlive the pipeline creation call that uses it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use pathview_rhi::device::Device;
//! use pathview_rhi::shader::{Shader, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), pathview_rhi::RhiError> {
//! let trace = Shader::from_spirv_file(
//!     device,
//!     Path::new("assets/shaders/compute_pass.comp.spv"),
//!     ShaderStage::Compute,
//!     "main",
//! )?;
//! let _stage = trace.stage_create_info();
//! # Ok(())
//! # }
//! ```

use std::ffi::{CStr, CString};
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Pipeline stage a shader module is compiled for.
///
/// Only the stages the ray-tracing and presentation pipelines use exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex stage - emits the fullscreen triangle
    Vertex,
    /// Fragment stage - samples the ray-traced output image
    Fragment,
    /// Compute stage - traces one pixel per invocation
    Compute,
}

impl ShaderStage {
    /// Converts the stage to Vulkan shader stage flags.
    ///
    /// # Returns
    ///
    /// The single `vk::ShaderStageFlags` bit for this stage.
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }

    /// Lower-case stage name used in log lines.
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A shader module together with its stage and entry point.
///
/// The module is destroyed on drop. Pipelines created from it do not keep
/// it alive, so a `Shader` can be dropped right after pipeline creation.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
}

impl Shader {
    /// Reads a compiled SPIR-V file and creates a module from it.
    ///
    /// # Errors
    ///
    /// `ShaderError` if the file cannot be read or its contents are not
    /// word-aligned, `VulkanError` if module creation fails.
    pub fn from_spirv_file(
        device: Arc<Device>,
        path: &Path,
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        debug!("Loading {} shader from {:?}", stage, path);

        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
        })?;

        Self::from_spirv_bytes(device, &bytes, stage, entry_point)
    }

    /// Creates a module from SPIR-V already in memory.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Little-endian SPIR-V, a non-empty multiple of 4 bytes
    /// * `stage` - Stage the module will be bound to
    /// * `entry_point` - Name of the entry function, usually `"main"`
    ///
    /// # Errors
    ///
    /// `ShaderError` for misaligned code or an entry point containing a NUL
    /// byte, `VulkanError` if module creation fails.
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;
        let entry_point = CString::new(entry_point)
            .map_err(|e| RhiError::ShaderError(format!("Invalid entry point name: {}", e)))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        debug!(
            "Created {} shader module ({} words, entry '{}')",
            stage,
            code.len(),
            entry_point.to_string_lossy()
        );

        Ok(Self {
            device,
            module,
            stage,
            entry_point,
        })
    }

    /// Returns the raw Vulkan shader module handle.
    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Returns the stage this module was created for.
    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Returns the entry point as a C string.
    #[inline]
    pub fn entry_point(&self) -> &CStr {
        &self.entry_point
    }

    /// Stage description for pipeline creation; borrows from `self`.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

/// Reinterprets little-endian SPIR-V bytes as 32-bit words.
fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if bytes.is_empty() || !bytes.len().is_multiple_of(4) {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V code must be a non-empty multiple of 4 bytes, got {} bytes",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(
            ShaderStage::Compute.to_vk_stage(),
            vk::ShaderStageFlags::COMPUTE
        );
    }

    #[test]
    fn test_shader_stage_display() {
        assert_eq!(ShaderStage::Compute.to_string(), "compute");
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }

    #[test]
    fn test_spirv_words_rejects_misaligned() {
        assert!(matches!(
            spirv_words(&[0u8; 5]),
            Err(RhiError::ShaderError(_))
        ));
        assert!(matches!(spirv_words(&[]), Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_spirv_words_little_endian() {
        // SPIR-V magic number
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x01, 0x00, 0x00, 0x00];
        let words = spirv_words(&bytes).unwrap();
        assert_eq!(words, vec![0x0723_0203, 1]);
    }
}
