//! Physical device (GPU) selection.
//!
//! Selection walks every GPU and keeps those that:
//! 1. expose a graphics family and a family that can present to the surface,
//! 2. support sampler anisotropy,
//! 3. report Vulkan 1.1 or newer.
//!
//! A compute-capable family without graphics support is recorded as the
//! dedicated compute family. Devices without one still qualify and run
//! compute work on the graphics queue.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};

/// Lowest Vulkan version accepted (major, minor).
pub const MIN_API_VERSION: (u32, u32) = (1, 1);

/// Queue family indices chosen for one physical device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
    /// Only set when the family is separate from graphics.
    pub dedicated_compute_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Graphics and present are mandatory; dedicated compute is not.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Distinct family indices, graphics first, for device queue creation.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(3);
        for family in [
            self.graphics_family,
            self.present_family,
            self.dedicated_compute_family,
        ]
        .into_iter()
        .flatten()
        {
            if !families.contains(&family) {
                families.push(family);
            }
        }
        families
    }
}

/// Picks queue families from a device's family list.
///
/// `supports_present` answers whether family `i` can present to the target
/// surface. Presentation prefers the graphics family so both usually share
/// one queue.
pub fn pick_queue_families(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();
    let mut compute_without_transfer = None;
    let mut compute_with_transfer = None;

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        let flags = family.queue_flags;
        let has_graphics = flags.contains(vk::QueueFlags::GRAPHICS);

        if has_graphics && indices.graphics_family.is_none() {
            indices.graphics_family = Some(i);
        }

        if flags.contains(vk::QueueFlags::COMPUTE) && !has_graphics {
            if flags.contains(vk::QueueFlags::TRANSFER) {
                compute_with_transfer.get_or_insert(i);
            } else {
                compute_without_transfer.get_or_insert(i);
            }
        }
    }

    indices.present_family = match indices.graphics_family {
        Some(graphics) if supports_present(graphics) => Some(graphics),
        _ => (0..families.len() as u32)
            .find(|&i| families[i as usize].queue_count > 0 && supports_present(i)),
    };

    indices.dedicated_compute_family = compute_without_transfer.or(compute_with_transfer);
    indices
}

/// Everything needed to create a logical device on a chosen GPU.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Total device-local heap size in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Why a GPU was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Rejection {
    QueueFamilies,
    SamplerAnisotropy,
    ApiVersion(u32, u32),
}

/// Selects the highest rated GPU that meets the requirements.
///
/// # Errors
///
/// - [`RhiError::MissingFeature`] when the only obstacle on every GPU was a
///   missing required feature.
/// - [`RhiError::NoSuitableGpu`] otherwise.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut candidates: Vec<(PhysicalDeviceInfo, u32)> = Vec::new();
    let mut rejections = Vec::new();

    for device in devices {
        match check_device_suitability(instance, device, surface, surface_loader) {
            Ok(info) => {
                let score = rate_device(&info);
                debug!(
                    "GPU '{}' ({}) - Score: {}",
                    info.device_name(),
                    info.device_type_name(),
                    score
                );
                candidates.push((info, score));
            }
            Err(reason) => rejections.push(reason),
        }
    }

    let Some((selected, score)) = candidates.into_iter().max_by_key(|(_, score)| *score) else {
        warn!("No suitable GPU found with required capabilities");
        if rejections
            .iter()
            .all(|reason| *reason == Rejection::SamplerAnisotropy)
        {
            return Err(RhiError::MissingFeature("samplerAnisotropy".to_string()));
        }
        return Err(RhiError::NoSuitableGpu);
    };

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, Score: {}, dedicated compute: {}",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch,
        score,
        selected.queue_families.dedicated_compute_family.is_some()
    );

    Ok(selected)
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, Rejection> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
    let family_properties =
        unsafe { instance.get_physical_device_queue_family_properties(device) };

    let device_name = unsafe {
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_str()
            .unwrap_or("Unknown")
    };

    let queue_families = pick_queue_families(&family_properties, |family| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, family, surface)
            .unwrap_or(false)
    });

    if !queue_families.is_complete() {
        debug!(
            "GPU '{}' skipped: missing queue families (graphics={}, present={})",
            device_name,
            queue_families.graphics_family.is_some(),
            queue_families.present_family.is_some()
        );
        return Err(Rejection::QueueFamilies);
    }

    if features.sampler_anisotropy == vk::FALSE {
        debug!("GPU '{}' skipped: sampler anisotropy not supported", device_name);
        return Err(Rejection::SamplerAnisotropy);
    }

    let major = vk::api_version_major(properties.api_version);
    let minor = vk::api_version_minor(properties.api_version);
    if !meets_min_version(major, minor) {
        debug!(
            "GPU '{}' skipped: Vulkan {}.{} is below {}.{}",
            device_name, major, minor, MIN_API_VERSION.0, MIN_API_VERSION.1
        );
        return Err(Rejection::ApiVersion(major, minor));
    }

    Ok(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
    })
}

fn meets_min_version(major: u32, minor: u32) -> bool {
    (major, minor) >= MIN_API_VERSION
}

fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    let mut score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };

    score += info.properties.limits.max_image_dimension2_d;

    let vram_mb = (info.device_local_memory() / (1024 * 1024)) as u32;
    score += vram_mb.min(16000);

    if info.queue_families.dedicated_compute_family.is_some() {
        score += 100;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_universal_family() {
        let families = [family(
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
        )];
        let indices = pick_queue_families(&families, |_| true);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(0));
        assert_eq!(indices.dedicated_compute_family, None);
        assert_eq!(indices.unique_families(), vec![0]);
    }

    #[test]
    fn test_dedicated_compute_family_detected() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = pick_queue_families(&families, |i| i == 0);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.dedicated_compute_family, Some(1));
        assert_eq!(indices.unique_families(), vec![0, 1]);
    }

    #[test]
    fn test_compute_only_family_preferred_over_compute_transfer() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE),
        ];
        let indices = pick_queue_families(&families, |_| true);
        assert_eq!(indices.dedicated_compute_family, Some(2));
    }

    #[test]
    fn test_present_falls_back_to_other_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = pick_queue_families(&families, |i| i == 1);
        assert_eq!(indices.present_family, Some(1));
        assert!(indices.is_complete());
    }

    #[test]
    fn test_empty_families_are_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];
        let indices = pick_queue_families(&families, |_| true);
        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(1));
    }

    #[test]
    fn test_no_present_support_is_incomplete() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = pick_queue_families(&families, |_| false);
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_min_version() {
        assert!(meets_min_version(1, 1));
        assert!(meets_min_version(1, 3));
        assert!(!meets_min_version(1, 0));
    }
}
