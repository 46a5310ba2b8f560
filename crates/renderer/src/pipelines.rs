//! The ray-tracing compute pipeline and the fullscreen presentation pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::info;

use pathview_rhi::RhiResult;
use pathview_rhi::descriptor::DescriptorSetLayout;
use pathview_rhi::device::Device;
use pathview_rhi::pipeline::{
    CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
};
use pathview_rhi::shader::{Shader, ShaderStage};

pub const FULLSCREEN_VERTEX_SHADER: &str = "fullscreen_tri.vert.spv";
pub const SAMPLE_FRAGMENT_SHADER: &str = "tex_sample.frag.spv";
pub const RAY_TRACE_COMPUTE_SHADER: &str = "compute_pass.comp.spv";

const ENTRY_POINT: &str = "main";

/// Compiled shader paths under `shader_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
    pub compute: PathBuf,
}

impl ShaderPaths {
    pub fn in_dir(shader_dir: &Path) -> Self {
        Self {
            vertex: shader_dir.join(FULLSCREEN_VERTEX_SHADER),
            fragment: shader_dir.join(SAMPLE_FRAGMENT_SHADER),
            compute: shader_dir.join(RAY_TRACE_COMPUTE_SHADER),
        }
    }
}

/// Pipelines plus their layouts. Layouts survive a shader reload.
pub struct FramePipelines {
    compute: Pipeline,
    graphics: Pipeline,
    compute_layout: PipelineLayout,
    graphics_layout: PipelineLayout,
    shader_dir: PathBuf,
}

impl FramePipelines {
    pub fn new(
        device: Arc<Device>,
        shader_dir: &Path,
        compute_set_layout: &DescriptorSetLayout,
        graphics_set_layout: &DescriptorSetLayout,
        render_pass: vk::RenderPass,
    ) -> RhiResult<Self> {
        let compute_layout =
            PipelineLayout::new(device.clone(), &[compute_set_layout.handle()], &[])?;
        let graphics_layout =
            PipelineLayout::new(device.clone(), &[graphics_set_layout.handle()], &[])?;

        let paths = ShaderPaths::in_dir(shader_dir);
        let compute = build_compute(&device, &paths, &compute_layout)?;
        let graphics = build_graphics(&device, &paths, &graphics_layout, render_pass)?;

        info!("Pipelines built from {}", shader_dir.display());

        Ok(Self {
            compute,
            graphics,
            compute_layout,
            graphics_layout,
            shader_dir: shader_dir.to_path_buf(),
        })
    }

    /// Rebuilds both pipelines from the shader binaries on disk.
    ///
    /// No submitted work may still reference the current pipelines. On
    /// failure the old pipelines stay in place.
    pub fn reload(&mut self, device: &Arc<Device>, render_pass: vk::RenderPass) -> RhiResult<()> {
        let paths = ShaderPaths::in_dir(&self.shader_dir);
        let compute = build_compute(device, &paths, &self.compute_layout)?;
        let graphics = build_graphics(device, &paths, &self.graphics_layout, render_pass)?;

        self.compute = compute;
        self.graphics = graphics;
        info!("Pipelines reloaded from {}", self.shader_dir.display());
        Ok(())
    }

    #[inline]
    pub fn compute(&self) -> &Pipeline {
        &self.compute
    }

    #[inline]
    pub fn graphics(&self) -> &Pipeline {
        &self.graphics
    }

    #[inline]
    pub fn compute_layout(&self) -> &PipelineLayout {
        &self.compute_layout
    }

    #[inline]
    pub fn graphics_layout(&self) -> &PipelineLayout {
        &self.graphics_layout
    }

    #[inline]
    pub fn shader_dir(&self) -> &Path {
        &self.shader_dir
    }
}

fn build_compute(
    device: &Arc<Device>,
    paths: &ShaderPaths,
    layout: &PipelineLayout,
) -> RhiResult<Pipeline> {
    let shader = Shader::from_spirv_file(
        device.clone(),
        &paths.compute,
        ShaderStage::Compute,
        ENTRY_POINT,
    )?;
    Pipeline::compute(device.clone(), &shader, layout)
}

fn build_graphics(
    device: &Arc<Device>,
    paths: &ShaderPaths,
    layout: &PipelineLayout,
    render_pass: vk::RenderPass,
) -> RhiResult<Pipeline> {
    let vertex = Shader::from_spirv_file(
        device.clone(),
        &paths.vertex,
        ShaderStage::Vertex,
        ENTRY_POINT,
    )?;
    let fragment = Shader::from_spirv_file(
        device.clone(),
        &paths.fragment,
        ShaderStage::Fragment,
        ENTRY_POINT,
    )?;

    GraphicsPipelineBuilder::new()
        .vertex_shader(&vertex)
        .fragment_shader(&fragment)
        .render_pass(render_pass, 0)
        .cull_mode(CullMode::None)
        .front_face(FrontFace::Clockwise)
        .build(device.clone(), layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_paths() {
        let paths = ShaderPaths::in_dir(Path::new("/src/assets/shaders"));
        assert_eq!(
            paths.vertex,
            Path::new("/src/assets/shaders/fullscreen_tri.vert.spv")
        );
        assert_eq!(
            paths.fragment,
            Path::new("/src/assets/shaders/tex_sample.frag.spv")
        );
        assert_eq!(
            paths.compute,
            Path::new("/src/assets/shaders/compute_pass.comp.spv")
        );
    }
}
