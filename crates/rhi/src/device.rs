//! Logical device, queues and the memory allocator.
//!
//! The device is created once per run. Queue layout is fixed at that point
//! and exposed as a [`QueueTopology`]: either one graphics queue that also
//! runs compute work, or a graphics queue plus a queue from a separate
//! compute family.
//!
//! # Example
//!
//! ```no_run
//! use pathview_rhi::instance::Instance;
//! use pathview_rhi::physical_device::select_physical_device;
//! use pathview_rhi::device::Device;
//! use ash::vk;
//!
//! # fn example() -> Result<(), pathview_rhi::RhiError> {
//! let instance = Instance::new(false)?;
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let info = select_physical_device(instance.handle(), surface, &surface_loader)?;
//! let device = Device::new(&instance, &info)?;
//!
//! let compute = device.topology().compute();
//! println!("compute work runs on family {}", compute.family);
//! # Ok(())
//! # }
//! ```

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::PhysicalDeviceInfo;

/// Required device extensions.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// A queue together with the family it was taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueHandle {
    pub queue: vk::Queue,
    pub family: u32,
}

/// How graphics and compute work map onto device queues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueTopology {
    /// Compute work shares the graphics queue.
    Single { graphics: QueueHandle },
    /// Compute work has its own queue from a family without graphics support.
    Dual {
        graphics: QueueHandle,
        compute: QueueHandle,
    },
}

impl QueueTopology {
    #[inline]
    pub fn graphics(&self) -> QueueHandle {
        match *self {
            QueueTopology::Single { graphics } | QueueTopology::Dual { graphics, .. } => graphics,
        }
    }

    /// Queue that compute dispatches are submitted to.
    #[inline]
    pub fn compute(&self) -> QueueHandle {
        match *self {
            QueueTopology::Single { graphics } => graphics,
            QueueTopology::Dual { compute, .. } => compute,
        }
    }

    #[inline]
    pub fn is_dual(&self) -> bool {
        matches!(self, QueueTopology::Dual { .. })
    }

    /// Families that must be listed for resources shared by compute and
    /// graphics. Empty when a single family owns both.
    pub fn sharing_families(&self) -> Vec<u32> {
        match *self {
            QueueTopology::Dual { graphics, compute } if graphics.family != compute.family => {
                vec![graphics.family, compute.family]
            }
            _ => Vec::new(),
        }
    }
}

/// Vulkan logical device wrapper.
///
/// Shared through `Arc`. Every GPU object in the workspace keeps an
/// `Arc<Device>`, so the device outlives all of them.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    allocator: ManuallyDrop<Mutex<Allocator>>,
    topology: QueueTopology,
    present: QueueHandle,
    max_sampler_anisotropy: f32,
}

impl Device {
    /// Creates the logical device, retrieves its queues and sets up the
    /// allocator.
    ///
    /// # Errors
    ///
    /// [`RhiError::NoSuitableGpu`] if the queue families are incomplete, or
    /// any error from device or allocator creation.
    pub fn new(instance: &Instance, info: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let queue_families = info.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

        let extension_names: Vec<*const i8> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(info.device, &create_info, None)?
        };

        info!("Logical device created on '{}'", info.device_name());

        let graphics = QueueHandle {
            queue: unsafe { device.get_device_queue(graphics_family, 0) },
            family: graphics_family,
        };
        let present = QueueHandle {
            queue: unsafe { device.get_device_queue(present_family, 0) },
            family: present_family,
        };

        let topology = match queue_families.dedicated_compute_family {
            Some(family) => {
                let compute = QueueHandle {
                    queue: unsafe { device.get_device_queue(family, 0) },
                    family,
                };
                info!(
                    "Dedicated compute queue from family {} (graphics family {})",
                    family, graphics_family
                );
                QueueTopology::Dual { graphics, compute }
            }
            None => {
                info!(
                    "No dedicated compute family, compute shares graphics family {}",
                    graphics_family
                );
                QueueTopology::Single { graphics }
            }
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            physical_device: info.device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            topology,
            present,
            max_sampler_anisotropy: info.properties.limits.max_sampler_anisotropy,
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn topology(&self) -> QueueTopology {
        self.topology
    }

    #[inline]
    pub fn present_queue(&self) -> QueueHandle {
        self.present
    }

    #[inline]
    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.max_sampler_anisotropy
    }

    /// Locks the allocator.
    pub fn allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        Ok(self.allocator.lock()?)
    }

    /// Idles compute (when dedicated), graphics and present queues in turn.
    pub fn wait_queues_idle(&self) -> RhiResult<()> {
        let mut queues = Vec::with_capacity(3);
        if let QueueTopology::Dual { compute, .. } = self.topology {
            queues.push(compute.queue);
        }
        queues.push(self.topology.graphics().queue);
        if !queues.contains(&self.present.queue) {
            queues.push(self.present.queue);
        }

        for queue in queues {
            unsafe { self.device.queue_wait_idle(queue)? };
        }
        Ok(())
    }

    /// Submits to the graphics queue.
    ///
    /// # Safety
    ///
    /// Command buffers must be fully recorded, and `fence` must be unsignaled
    /// and not referenced by another pending submission.
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.topology.graphics().queue, submit_infos, fence)?;
        }
        Ok(())
    }

    /// Submits to the compute queue of the current topology.
    ///
    /// # Safety
    ///
    /// Same requirements as [`submit_graphics`](Self::submit_graphics).
    pub unsafe fn submit_compute(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.topology.compute().queue, submit_infos, fence)?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // Allocator memory blocks belong to the device.
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device is Send + Sync, queue handles are plain values and the
// allocator sits behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn queue(raw: u64, family: u32) -> QueueHandle {
        QueueHandle {
            queue: vk::Queue::from_raw(raw),
            family,
        }
    }

    #[test]
    fn test_single_topology_routes_compute_to_graphics() {
        let topology = QueueTopology::Single {
            graphics: queue(1, 0),
        };
        assert_eq!(topology.compute(), topology.graphics());
        assert!(!topology.is_dual());
        assert!(topology.sharing_families().is_empty());
    }

    #[test]
    fn test_dual_topology_uses_dedicated_queue() {
        let topology = QueueTopology::Dual {
            graphics: queue(1, 0),
            compute: queue(2, 1),
        };
        assert_eq!(topology.graphics(), queue(1, 0));
        assert_eq!(topology.compute(), queue(2, 1));
        assert!(topology.is_dual());
        assert_eq!(topology.sharing_families(), vec![0, 1]);
    }

    #[test]
    fn test_device_extensions_defined() {
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
