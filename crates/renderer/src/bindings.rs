//! Descriptor binding contract shared with the shaders.
//!
//! Compute set:
//! - 0: storage image (output)
//! - 1: uniform camera
//! - 2: uniform random samples
//! - 3: uniform render settings
//! - 4: storage sphere array
//!
//! Graphics set:
//! - 0: combined image sampler (output)

use ash::vk;
use pathview_rhi::descriptor::DescriptorBindingBuilder;

pub const OUTPUT_IMAGE: u32 = 0;
pub const CAMERA: u32 = 1;
pub const RANDOM_SAMPLES: u32 = 2;
pub const SETTINGS: u32 = 3;
pub const SPHERES: u32 = 4;

pub const SAMPLED_OUTPUT: u32 = 0;

pub fn compute_set_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 5] {
    let stage = vk::ShaderStageFlags::COMPUTE;
    [
        DescriptorBindingBuilder::storage_image(OUTPUT_IMAGE, stage),
        DescriptorBindingBuilder::uniform_buffer(CAMERA, stage),
        DescriptorBindingBuilder::uniform_buffer(RANDOM_SAMPLES, stage),
        DescriptorBindingBuilder::uniform_buffer(SETTINGS, stage),
        DescriptorBindingBuilder::storage_buffer(SPHERES, stage),
    ]
}

pub fn graphics_set_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 1] {
    [DescriptorBindingBuilder::combined_image_sampler(
        SAMPLED_OUTPUT,
        vk::ShaderStageFlags::FRAGMENT,
    )]
}
