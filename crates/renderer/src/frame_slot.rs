//! Per-frame GPU resources.
//!
//! Each [`FrameSlot`] owns everything one frame in flight touches on the
//! compute side: the output image, four host-visible buffers, a compute
//! command buffer and the fence guarding them. Descriptor sets are written
//! once at creation and never rebound.
//!
//! [`FrameResources`] holds the slots together with the shared set layouts
//! and the two descriptor pools, each sized for exactly `capacity` sets.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use pathview_rhi::buffer::{Buffer, BufferUsage};
use pathview_rhi::command::{CommandBuffer, CommandPool};
use pathview_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, buffer_info, image_info, update_descriptor_sets,
};
use pathview_rhi::device::Device;
use pathview_rhi::image::OutputImage;
use pathview_rhi::pipeline::{Pipeline, PipelineLayout};
use pathview_rhi::sync::{Fence, Semaphore};
use pathview_rhi::{RhiError, RhiResult};

use crate::bindings;
use crate::recorder;
use crate::scene::{CameraUniform, RandomSamples, RenderSettings, SceneState};

/// Signal state of a slot's compute-finished semaphore.
///
/// A binary semaphore must not be signaled again before a wait consumes it.
/// Normally the graphics submit consumes the signal; when a frame is dropped
/// after its compute submit, the next compute submit for the slot waits on
/// the semaphore first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComputeHandoff {
    enabled: bool,
    pending: bool,
}

impl ComputeHandoff {
    /// `enabled` is false when compute and graphics share a queue.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            pending: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Records a compute submit. Returns true when that submit has to wait on
    /// the semaphore to consume an earlier signal.
    pub fn on_compute_submit(&mut self) -> bool {
        let must_wait = self.pending;
        self.pending = self.enabled;
        must_wait
    }

    /// Returns true when the graphics submit has to wait on the semaphore,
    /// and marks the signal consumed.
    pub fn take_for_graphics(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }
}

/// Every handle a slot's descriptor sets point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotBindings {
    pub compute_set: vk::DescriptorSet,
    pub graphics_set: vk::DescriptorSet,
    pub output_image: vk::Image,
    pub output_view: vk::ImageView,
    pub camera: vk::Buffer,
    pub random: vk::Buffer,
    pub settings: vk::Buffer,
    pub spheres: vk::Buffer,
}

pub struct FrameSlot {
    device: Arc<Device>,
    output: OutputImage,
    camera: Buffer,
    random: Buffer,
    settings: Buffer,
    spheres: Buffer,
    fence: Fence,
    /// Present only with a dedicated compute queue.
    compute_finished: Option<Semaphore>,
    handoff: ComputeHandoff,
    /// Fence of the last graphics submission that sampled `output`.
    reader_fence: Option<vk::Fence>,
    compute_set: vk::DescriptorSet,
    graphics_set: vk::DescriptorSet,
    command_buffer: CommandBuffer,
    command_pool: CommandPool,
}

impl FrameSlot {
    #[inline]
    pub fn output(&self) -> &OutputImage {
        &self.output
    }

    #[inline]
    pub fn compute_set(&self) -> vk::DescriptorSet {
        self.compute_set
    }

    #[inline]
    pub fn graphics_set(&self) -> vk::DescriptorSet {
        self.graphics_set
    }

    #[inline]
    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    pub fn bindings(&self) -> SlotBindings {
        SlotBindings {
            compute_set: self.compute_set,
            graphics_set: self.graphics_set,
            output_image: self.output.image(),
            output_view: self.output.view(),
            camera: self.camera.handle(),
            random: self.random.handle(),
            settings: self.settings.handle(),
            spheres: self.spheres.handle(),
        }
    }

    /// Blocks until this slot's previous compute work and the last graphics
    /// pass reading its image have finished, then re-arms the compute fence.
    pub fn wait_and_reset(&mut self) -> RhiResult<()> {
        self.fence.wait(u64::MAX)?;
        if let Some(reader) = self.reader_fence.take() {
            unsafe {
                self.device
                    .handle()
                    .wait_for_fences(&[reader], true, u64::MAX)?;
            }
        }
        self.fence.reset()
    }

    /// Copies the scene into the slot's buffers.
    pub fn write(&self, scene: &SceneState) -> RhiResult<()> {
        self.camera
            .write_data(0, bytemuck::bytes_of(&scene.camera_uniform()))?;
        self.random
            .write_data(0, bytemuck::bytes_of(scene.random_samples()))?;
        self.settings
            .write_data(0, bytemuck::bytes_of(&scene.settings))?;
        self.spheres
            .write_data(0, bytemuck::cast_slice(scene.spheres()))
    }

    /// Records the dispatch and submits it to the compute queue.
    ///
    /// The fence must have been reset by [`wait_and_reset`](Self::wait_and_reset).
    pub fn submit_compute(
        &mut self,
        pipeline: &Pipeline,
        layout: &PipelineLayout,
        tile: u32,
    ) -> RhiResult<()> {
        self.command_buffer.reset()?;
        recorder::record_compute(
            &self.command_buffer,
            pipeline,
            layout,
            self.compute_set,
            self.output.extent(),
            tile,
        )?;

        let command_buffers = [self.command_buffer.handle()];
        let mut wait_semaphores = Vec::new();
        let mut signal_semaphores = Vec::new();
        let mut handoff = self.handoff;
        if let Some(semaphore) = &self.compute_finished {
            if handoff.on_compute_submit() {
                wait_semaphores.push(semaphore.handle());
            }
            signal_semaphores.push(semaphore.handle());
        }
        let wait_stages = vec![vk::PipelineStageFlags::COMPUTE_SHADER; wait_semaphores.len()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .submit_compute(&[submit_info], self.fence.handle())?;
        }
        // Only a submit that reached the queue changes the signal state.
        self.handoff = handoff;
        Ok(())
    }

    /// Semaphore the graphics submit must wait on, if any. Marks it consumed.
    pub fn take_compute_wait(&mut self) -> Option<(vk::Semaphore, vk::PipelineStageFlags)> {
        if !self.handoff.take_for_graphics() {
            return None;
        }
        self.compute_finished
            .as_ref()
            .map(|semaphore| (semaphore.handle(), vk::PipelineStageFlags::FRAGMENT_SHADER))
    }

    /// Records which graphics fence now reads the output image.
    pub fn set_reader_fence(&mut self, fence: vk::Fence) {
        self.reader_fence = Some(fence);
    }

    /// Drops the reader fence. Only valid once the queues are idle.
    pub fn clear_reader_fence(&mut self) {
        self.reader_fence = None;
    }
}

pub struct FrameResources {
    device: Arc<Device>,
    slots: Vec<FrameSlot>,
    compute_pool: DescriptorPool,
    graphics_pool: DescriptorPool,
    compute_layout: DescriptorSetLayout,
    graphics_layout: DescriptorSetLayout,
    setup_pool: CommandPool,
    capacity: usize,
    output_extent: vk::Extent2D,
    sphere_buffer_size: vk::DeviceSize,
}

impl FrameResources {
    /// Creates the layouts and pools for `capacity` slots. No slot exists yet.
    pub fn new(
        device: Arc<Device>,
        capacity: usize,
        output_extent: vk::Extent2D,
        sphere_buffer_size: usize,
    ) -> RhiResult<Self> {
        let max_sets = u32::try_from(capacity).map_err(|_| {
            RhiError::InvalidHandle(format!("Too many frame slots: {}", capacity))
        })?;

        let compute_layout =
            DescriptorSetLayout::new(device.clone(), &bindings::compute_set_bindings())?;
        let graphics_layout =
            DescriptorSetLayout::new(device.clone(), &bindings::graphics_set_bindings())?;
        let compute_pool = DescriptorPool::for_layout(device.clone(), &compute_layout, max_sets)?;
        let graphics_pool =
            DescriptorPool::for_layout(device.clone(), &graphics_layout, max_sets)?;
        let setup_pool = CommandPool::new(device.clone(), device.topology().graphics().family)?;

        Ok(Self {
            device,
            slots: Vec::with_capacity(capacity),
            compute_pool,
            graphics_pool,
            compute_layout,
            graphics_layout,
            setup_pool,
            capacity,
            output_extent,
            sphere_buffer_size: sphere_buffer_size as vk::DeviceSize,
        })
    }

    /// Creates `capacity` slots.
    pub fn with_slots(
        device: Arc<Device>,
        capacity: usize,
        output_extent: vk::Extent2D,
        sphere_buffer_size: usize,
    ) -> RhiResult<Self> {
        let mut resources = Self::new(device, capacity, output_extent, sphere_buffer_size)?;
        for _ in 0..capacity {
            resources.add_frame_slot()?;
        }
        info!(
            "{} frame slot(s) ready, output {}x{}",
            capacity, output_extent.width, output_extent.height
        );
        Ok(resources)
    }

    /// Allocates one more slot and writes its descriptor sets.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` once the pools are exhausted.
    pub fn add_frame_slot(&mut self) -> RhiResult<usize> {
        if self.slots.len() == self.capacity {
            return Err(RhiError::InvalidHandle(format!(
                "All {} frame slots are allocated",
                self.capacity
            )));
        }

        let device = self.device.clone();
        let topology = device.topology();

        let output = OutputImage::new(device.clone(), self.output_extent)?;
        output.transition_to_general(&self.setup_pool, topology.graphics().queue)?;

        let camera = Buffer::new(
            device.clone(),
            BufferUsage::Uniform,
            CameraUniform::SIZE as vk::DeviceSize,
        )?;
        let random = Buffer::new(
            device.clone(),
            BufferUsage::Uniform,
            RandomSamples::SIZE as vk::DeviceSize,
        )?;
        let settings = Buffer::new(
            device.clone(),
            BufferUsage::Uniform,
            RenderSettings::SIZE as vk::DeviceSize,
        )?;
        let spheres = Buffer::new(device.clone(), BufferUsage::Storage, self.sphere_buffer_size)?;

        let command_pool = CommandPool::new(device.clone(), topology.compute().family)?;
        let command_buffer = CommandBuffer::new(device.clone(), &command_pool)?;
        let compute_finished = if topology.is_dual() {
            Some(Semaphore::new(device.clone())?)
        } else {
            None
        };

        let compute_set = self.compute_pool.allocate_one(&self.compute_layout)?;
        let graphics_set = self.graphics_pool.allocate_one(&self.graphics_layout)?;

        let storage_image = [image_info(
            vk::Sampler::null(),
            output.view(),
            vk::ImageLayout::GENERAL,
        )];
        let sampled_image = [image_info(
            output.sampler(),
            output.view(),
            vk::ImageLayout::GENERAL,
        )];
        let camera_info = [buffer_info(camera.handle())];
        let random_info = [buffer_info(random.handle())];
        let settings_info = [buffer_info(settings.handle())];
        let spheres_info = [buffer_info(spheres.handle())];

        let writes = [
            vk::WriteDescriptorSet::default()
                .dst_set(compute_set)
                .dst_binding(bindings::OUTPUT_IMAGE)
                .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                .image_info(&storage_image),
            vk::WriteDescriptorSet::default()
                .dst_set(compute_set)
                .dst_binding(bindings::CAMERA)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&camera_info),
            vk::WriteDescriptorSet::default()
                .dst_set(compute_set)
                .dst_binding(bindings::RANDOM_SAMPLES)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&random_info),
            vk::WriteDescriptorSet::default()
                .dst_set(compute_set)
                .dst_binding(bindings::SETTINGS)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&settings_info),
            vk::WriteDescriptorSet::default()
                .dst_set(compute_set)
                .dst_binding(bindings::SPHERES)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .buffer_info(&spheres_info),
            vk::WriteDescriptorSet::default()
                .dst_set(graphics_set)
                .dst_binding(bindings::SAMPLED_OUTPUT)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&sampled_image),
        ];
        update_descriptor_sets(&device, &writes);

        let index = self.slots.len();
        self.slots.push(FrameSlot {
            fence: Fence::new(device.clone(), true)?,
            device,
            output,
            camera,
            random,
            settings,
            spheres,
            handoff: ComputeHandoff::new(compute_finished.is_some()),
            compute_finished,
            reader_fence: None,
            compute_set,
            graphics_set,
            command_buffer,
            command_pool,
        });

        debug!("Created frame slot {}", index);
        Ok(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    #[inline]
    pub fn slot_mut(&mut self, index: usize) -> &mut FrameSlot {
        &mut self.slots[index]
    }

    pub fn slots_mut(&mut self) -> impl Iterator<Item = &mut FrameSlot> {
        self.slots.iter_mut()
    }

    #[inline]
    pub fn compute_layout(&self) -> &DescriptorSetLayout {
        &self.compute_layout
    }

    #[inline]
    pub fn graphics_layout(&self) -> &DescriptorSetLayout {
        &self.graphics_layout
    }
}
