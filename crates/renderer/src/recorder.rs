//! Command recording for the compute and presentation passes.

use ash::vk;

use pathview_rhi::RhiResult;
use pathview_rhi::command::CommandBuffer;
use pathview_rhi::image::compute_to_fragment_barrier;
use pathview_rhi::pipeline::{Pipeline, PipelineLayout};

use crate::frame_loop::FrameStats;
use crate::overlay::Overlay;
use crate::settings::CLEAR_COLOR;

/// Workgroup counts covering `extent` with `tile`×`tile` groups.
pub fn dispatch_grid(extent: vk::Extent2D, tile: u32) -> (u32, u32, u32) {
    (extent.width.div_ceil(tile), extent.height.div_ceil(tile), 1)
}

/// Records the ray-tracing dispatch into `cmd`.
pub fn record_compute(
    cmd: &CommandBuffer,
    pipeline: &Pipeline,
    layout: &PipelineLayout,
    compute_set: vk::DescriptorSet,
    output_extent: vk::Extent2D,
    tile: u32,
) -> RhiResult<()> {
    let (x, y, z) = dispatch_grid(output_extent, tile);

    cmd.begin()?;
    cmd.bind_pipeline(vk::PipelineBindPoint::COMPUTE, pipeline.handle());
    cmd.bind_descriptor_sets(
        vk::PipelineBindPoint::COMPUTE,
        layout.handle(),
        0,
        &[compute_set],
    );
    cmd.dispatch(x, y, z);
    cmd.end()
}

/// Where the presentation pass draws.
#[derive(Debug, Clone, Copy)]
pub struct PresentTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
}

/// The output image being shown and the set that samples it.
#[derive(Debug, Clone, Copy)]
pub struct SampledOutput {
    pub image: vk::Image,
    pub graphics_set: vk::DescriptorSet,
}

/// Records the fullscreen blit of the output image onto the swapchain.
pub fn record_graphics(
    cmd: &CommandBuffer,
    target: PresentTarget,
    source: SampledOutput,
    pipeline: &Pipeline,
    layout: &PipelineLayout,
    overlay: &mut dyn Overlay,
    stats: &FrameStats,
) -> RhiResult<()> {
    cmd.begin()?;

    cmd.pipeline_barrier(
        vk::PipelineStageFlags::COMPUTE_SHADER,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
        &[compute_to_fragment_barrier(source.image)],
    );

    cmd.begin_render_pass(
        target.render_pass,
        target.framebuffer,
        target.extent,
        CLEAR_COLOR,
    );
    cmd.set_viewport_and_scissor(target.extent);
    cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipeline.handle());
    cmd.bind_descriptor_sets(
        vk::PipelineBindPoint::GRAPHICS,
        layout.handle(),
        0,
        &[source.graphics_set],
    );
    // Fullscreen triangle generated from gl_VertexIndex.
    cmd.draw(3, 1, 0, 0);

    overlay.record(cmd, stats);

    cmd.end_render_pass();
    cmd.end()
}
