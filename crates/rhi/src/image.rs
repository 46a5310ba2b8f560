//! Storage images written by compute and sampled by graphics.
//!
//! An [`OutputImage`] lives in `GENERAL` layout for its whole life. The
//! transition out of `UNDEFINED` happens once, right after creation, and
//! per-frame hand-off between the two stages only needs an access-mask
//! barrier (see [`compute_to_fragment_barrier`]).

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error, info};

use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Format of every output image.
pub const OUTPUT_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

/// A device-local colour image with a view and a linear sampler.
///
/// When the device runs compute and graphics on different queue families
/// the image is created with concurrent sharing across both, so no
/// ownership transfer is needed.
pub struct OutputImage {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    sampler: vk::Sampler,
    allocation: Option<Allocation>,
    extent: vk::Extent2D,
}

impl OutputImage {
    /// Creates the image in `UNDEFINED` layout.
    ///
    /// Callers must run [`transition_to_general`](Self::transition_to_general)
    /// before first use.
    pub fn new(device: Arc<Device>, extent: vk::Extent2D) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidHandle(
                "Output image dimensions must be greater than 0".to_string(),
            ));
        }

        let families = device.topology().sharing_families();
        let mut image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(OUTPUT_FORMAT)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::STORAGE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        image_info = if families.is_empty() {
            image_info.sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            image_info
                .sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families)
        };

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device.allocator().and_then(|mut allocator| {
            Ok(allocator.allocate(&AllocationCreateDesc {
                name: "output_image",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?)
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());
        let mut this = Self {
            device,
            image,
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            allocation: Some(allocation),
            extent,
        };

        unsafe {
            this.device
                .handle()
                .bind_image_memory(this.image, memory, offset)?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(this.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(OUTPUT_FORMAT)
            .subresource_range(COLOR_RANGE);
        this.view = unsafe { this.device.handle().create_image_view(&view_info, None)? };

        let sampler_info = sampler_create_info(this.device.max_sampler_anisotropy());
        this.sampler = unsafe { this.device.handle().create_sampler(&sampler_info, None)? };

        info!(
            "Created output image: {}x{} ({:?}, {} sharing)",
            extent.width,
            extent.height,
            OUTPUT_FORMAT,
            if families.is_empty() { "exclusive" } else { "concurrent" }
        );

        Ok(this)
    }

    /// Moves the image from `UNDEFINED` to `GENERAL` with a blocking
    /// one-shot submission on `queue`.
    pub fn transition_to_general(&self, pool: &CommandPool, queue: vk::Queue) -> RhiResult<()> {
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::GENERAL)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::SHADER_WRITE | vk::AccessFlags::SHADER_READ)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(COLOR_RANGE);

        pool.run_one_shot(queue, |cmd| {
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::COMPUTE_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER,
                &[barrier],
            );
        })?;

        debug!("Output image transitioned to GENERAL");
        Ok(())
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for OutputImage {
    fn drop(&mut self) {
        unsafe {
            let device = self.device.handle();
            if self.sampler != vk::Sampler::null() {
                device.destroy_sampler(self.sampler, None);
            }
            if self.view != vk::ImageView::null() {
                device.destroy_image_view(self.view, None);
            }
            device.destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free output image allocation: {:?}", e);
                    }
                }
                Err(e) => error!("Leaking output image allocation: {}", e),
            }
        }

        debug!("Destroyed output image");
    }
}

/// Barrier that makes compute writes to `image` visible to fragment reads.
///
/// Layout stays `GENERAL` on both sides.
pub fn compute_to_fragment_barrier(image: vk::Image) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .old_layout(vk::ImageLayout::GENERAL)
        .new_layout(vk::ImageLayout::GENERAL)
        .src_access_mask(vk::AccessFlags::SHADER_WRITE)
        .dst_access_mask(vk::AccessFlags::SHADER_READ)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(COLOR_RANGE)
}

fn sampler_create_info(max_anisotropy: f32) -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .anisotropy_enable(true)
        .max_anisotropy(max_anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .min_lod(0.0)
        .max_lod(0.0)
}
