//! Descriptor set layouts, pools and writes.
//!
//! Pools are sized from the layout bindings they serve, so a pool created
//! for `n` sets of one layout holds exactly `n` sets and nothing more.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Descriptor set layout wrapper.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorSetLayout {
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding<'static>],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self {
            device,
            layout,
            bindings: bindings.to_vec(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    #[inline]
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Pool that allocates sets of a single layout.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    /// Creates a pool able to hold exactly `max_sets` sets of `layout`.
    pub fn for_layout(
        device: Arc<Device>,
        layout: &DescriptorSetLayout,
        max_sets: u32,
    ) -> RhiResult<Self> {
        let pool_sizes = pool_sizes_for(layout.bindings(), max_sets);
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Allocates one set per entry in `layouts`.
    pub fn allocate(&self, layouts: &[vk::DescriptorSetLayout]) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        Ok(sets)
    }

    /// Allocates a single set of `layout`.
    pub fn allocate_one(&self, layout: &DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        Ok(self.allocate(&[layout.handle()])?[0])
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool ({} sets)", self.max_sets);
    }
}

/// Pool sizes covering `sets` copies of a layout with `bindings`.
///
/// Bindings of the same type are merged into one entry.
pub fn pool_sizes_for(
    bindings: &[vk::DescriptorSetLayoutBinding],
    sets: u32,
) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
    for binding in bindings {
        let count = binding.descriptor_count * sets;
        match sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
            Some(size) => size.descriptor_count += count,
            None => sizes.push(
                vk::DescriptorPoolSize::default()
                    .ty(binding.descriptor_type)
                    .descriptor_count(count),
            ),
        }
    }
    sizes
}

pub fn update_descriptor_sets(device: &Device, writes: &[vk::WriteDescriptorSet]) {
    if writes.is_empty() {
        return;
    }

    unsafe {
        device.handle().update_descriptor_sets(writes, &[]);
    }

    debug!("Wrote {} descriptor binding(s)", writes.len());
}

/// Whole-buffer descriptor info.
#[inline]
pub fn buffer_info(buffer: vk::Buffer) -> vk::DescriptorBufferInfo {
    vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(0)
        .range(vk::WHOLE_SIZE)
}

#[inline]
pub fn image_info(
    sampler: vk::Sampler,
    image_view: vk::ImageView,
    image_layout: vk::ImageLayout,
) -> vk::DescriptorImageInfo {
    vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(image_view)
        .image_layout(image_layout)
}

/// Shorthand constructors for single-descriptor layout bindings.
pub struct DescriptorBindingBuilder;

impl DescriptorBindingBuilder {
    #[inline]
    pub fn uniform_buffer(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    #[inline]
    pub fn storage_buffer(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::STORAGE_BUFFER, stage_flags)
    }

    #[inline]
    pub fn combined_image_sampler(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            stage_flags,
        )
    }

    #[inline]
    pub fn storage_image(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::STORAGE_IMAGE, stage_flags)
    }

    fn single(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(descriptor_type)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_builder_types() {
        let cases = [
            (
                DescriptorBindingBuilder::uniform_buffer(1, vk::ShaderStageFlags::COMPUTE),
                vk::DescriptorType::UNIFORM_BUFFER,
            ),
            (
                DescriptorBindingBuilder::storage_buffer(4, vk::ShaderStageFlags::COMPUTE),
                vk::DescriptorType::STORAGE_BUFFER,
            ),
            (
                DescriptorBindingBuilder::storage_image(0, vk::ShaderStageFlags::COMPUTE),
                vk::DescriptorType::STORAGE_IMAGE,
            ),
            (
                DescriptorBindingBuilder::combined_image_sampler(
                    0,
                    vk::ShaderStageFlags::FRAGMENT,
                ),
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            ),
        ];

        for (binding, expected) in cases {
            assert_eq!(binding.descriptor_type, expected);
            assert_eq!(binding.descriptor_count, 1);
        }
    }

    #[test]
    fn test_pool_sizes_merge_same_type() {
        let bindings = [
            DescriptorBindingBuilder::storage_image(0, vk::ShaderStageFlags::COMPUTE),
            DescriptorBindingBuilder::uniform_buffer(1, vk::ShaderStageFlags::COMPUTE),
            DescriptorBindingBuilder::uniform_buffer(2, vk::ShaderStageFlags::COMPUTE),
            DescriptorBindingBuilder::uniform_buffer(3, vk::ShaderStageFlags::COMPUTE),
            DescriptorBindingBuilder::storage_buffer(4, vk::ShaderStageFlags::COMPUTE),
        ];

        let sizes = pool_sizes_for(&bindings, 2);
        let count_of = |ty| {
            sizes
                .iter()
                .find(|s| s.ty == ty)
                .map(|s| s.descriptor_count)
        };

        assert_eq!(sizes.len(), 3);
        assert_eq!(count_of(vk::DescriptorType::STORAGE_IMAGE), Some(2));
        assert_eq!(count_of(vk::DescriptorType::UNIFORM_BUFFER), Some(6));
        assert_eq!(count_of(vk::DescriptorType::STORAGE_BUFFER), Some(2));
    }

    #[test]
    fn test_buffer_info_covers_whole_buffer() {
        let info = buffer_info(vk::Buffer::null());
        assert_eq!(info.offset, 0);
        assert_eq!(info.range, vk::WHOLE_SIZE);
    }

    #[test]
    fn test_image_info_helper() {
        let info = image_info(
            vk::Sampler::null(),
            vk::ImageView::null(),
            vk::ImageLayout::GENERAL,
        );
        assert_eq!(info.image_layout, vk::ImageLayout::GENERAL);
    }
}
