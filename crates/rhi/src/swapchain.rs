//! Swapchain management.
//!
//! [`Swapchain`] owns the presentable images' views and the `VkSwapchainKHR`.
//! A rebuild passes the current handle as `old_swapchain`, destroys it only
//! after the replacement exists, and releases every view of the previous set.
//! The extent always comes from the surface capabilities queried at build
//! time; the caller only supplies a fallback for surfaces that leave the
//! extent to the application.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use pathview_rhi::device::Device;
//! use pathview_rhi::instance::Instance;
//! use pathview_rhi::swapchain::Swapchain;
//!
//! # fn example(instance: &Instance, device: Arc<Device>, surface: vk::SurfaceKHR) -> Result<(), pathview_rhi::RhiError> {
//! let fallback = vk::Extent2D { width: 512, height: 512 };
//! let mut swapchain = Swapchain::new(instance, device, surface, fallback)?;
//!
//! // After a resize or a stale present:
//! swapchain.rebuild(fallback)?;
//! assert_eq!(swapchain.image_views().len(), swapchain.images().len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Surface capabilities, formats and present modes for one device.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, current extent {}x{}",
            formats.len(),
            present_modes.len(),
            capabilities.current_extent.width,
            capabilities.current_extent.height
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Presentable image chain.
pub struct Swapchain {
    device: Arc<Device>,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    /// Incremented on every successful build.
    generation: u64,
}

/// Handles and metadata produced by one build.
struct BuiltChain {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Builds the first swapchain for `surface`.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        fallback_extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let built = build_chain(
            &device,
            &surface_loader,
            &swapchain_loader,
            surface,
            fallback_extent,
            vk::SwapchainKHR::null(),
        )?;

        Ok(Self {
            device,
            surface,
            surface_loader,
            swapchain_loader,
            swapchain: built.swapchain,
            images: built.images,
            image_views: built.image_views,
            format: built.format,
            extent: built.extent,
            present_mode: built.present_mode,
            generation: 1,
        })
    }

    /// Rebuilds the chain against the surface's current capabilities.
    ///
    /// The caller must make sure no pending GPU work references the current
    /// images or views. On failure the previous chain stays intact.
    pub fn rebuild(&mut self, fallback_extent: vk::Extent2D) -> RhiResult<()> {
        let built = build_chain(
            &self.device,
            &self.surface_loader,
            &self.swapchain_loader,
            self.surface,
            fallback_extent,
            self.swapchain,
        )?;

        self.destroy_image_views();
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }

        self.swapchain = built.swapchain;
        self.images = built.images;
        self.image_views = built.image_views;
        self.format = built.format;
        self.extent = built.extent;
        self.present_mode = built.present_mode;
        self.generation += 1;

        info!(
            "Swapchain rebuilt: {}x{}, {} images (generation {})",
            self.extent.width,
            self.extent.height,
            self.images.len(),
            self.generation
        );
        Ok(())
    }

    /// Extent a rebuild issued now would use.
    ///
    /// Zero while the window is minimized; [`rebuild`](Self::rebuild) fails
    /// in that state.
    pub fn surface_extent(&self, fallback_extent: vk::Extent2D) -> RhiResult<vk::Extent2D> {
        let capabilities = unsafe {
            self.surface_loader.get_physical_device_surface_capabilities(
                self.device.physical_device(),
                self.surface,
            )?
        };
        Ok(choose_extent(&capabilities, fallback_extent))
    }

    /// Acquires the next image with an unbounded timeout.
    ///
    /// Returns `(image_index, suboptimal)`. Out-of-date and other failures are
    /// returned as the raw `vk::Result` so the caller can classify them.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Queues `image_index` for presentation once `wait_semaphore` signals.
    ///
    /// Returns `true` when the chain is suboptimal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of builds performed so far, starting at 1.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn destroy_image_views(&mut self) {
        for view in self.image_views.drain(..) {
            unsafe {
                self.device.handle().destroy_image_view(view, None);
            }
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

fn build_chain(
    device: &Device,
    surface_loader: &ash::khr::surface::Instance,
    swapchain_loader: &ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    fallback_extent: vk::Extent2D,
    old_swapchain: vk::SwapchainKHR,
) -> RhiResult<BuiltChain> {
    let support = SwapchainSupportDetails::query(device.physical_device(), surface, surface_loader)?;
    if !support.is_adequate() {
        return Err(RhiError::SwapchainError(
            "Surface reports no formats or present modes".to_string(),
        ));
    }

    let surface_format = choose_surface_format(&support.formats);
    let present_mode = choose_present_mode(&support.present_modes);
    let extent = choose_extent(&support.capabilities, fallback_extent);
    let image_count = determine_image_count(&support.capabilities);

    if is_zero_extent(extent) {
        return Err(RhiError::SwapchainError(format!(
            "Surface extent is {}x{}",
            extent.width, extent.height
        )));
    }

    let graphics_family = device.topology().graphics().family;
    let present_family = device.present_queue().family;
    let families = [graphics_family, present_family];
    let (sharing_mode, family_slice) = if graphics_family != present_family {
        (vk::SharingMode::CONCURRENT, &families[..])
    } else {
        (vk::SharingMode::EXCLUSIVE, &[][..])
    };

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(sharing_mode)
        .queue_family_indices(family_slice)
        .pre_transform(support.capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(old_swapchain);

    let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

    let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
        Ok(images) => images,
        Err(e) => {
            unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
            return Err(e.into());
        }
    };

    let image_views = match create_image_views(device, &images, surface_format.format) {
        Ok(views) => views,
        Err(e) => {
            unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
            return Err(e);
        }
    };

    debug!(
        "Built swapchain: {}x{}, {:?}, {:?}, {} images",
        extent.width,
        extent.height,
        surface_format.format,
        present_mode,
        images.len()
    );

    Ok(BuiltChain {
        swapchain,
        images,
        image_views,
        format: surface_format.format,
        extent,
        present_mode,
    })
}

/// Prefers B8G8R8A8_SRGB, then B8G8R8A8_UNORM, then whatever comes first.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let with_format = |format: vk::Format| {
        formats
            .iter()
            .copied()
            .find(|f| f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
    };

    if let Some(format) = with_format(vk::Format::B8G8R8A8_SRGB) {
        return format;
    }
    if let Some(format) = with_format(vk::Format::B8G8R8A8_UNORM) {
        warn!("Using fallback surface format B8G8R8A8_UNORM");
        return format;
    }

    warn!("Using first available surface format: {:?}", formats[0].format);
    formats[0]
}

/// MAILBOX when offered, otherwise FIFO (always available).
fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// A surface with no area cannot back a swapchain.
pub fn is_zero_extent(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

/// Uses the surface's current extent; `u32::MAX` means the application picks,
/// in which case the fallback is clamped to the allowed range.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    fallback: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: fallback.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: fallback.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum when there is one.
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );

        match unsafe { device.handle().create_image_view(&create_info, None) } {
            Ok(view) => views.push(view),
            Err(e) => {
                for view in views {
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(RhiError::SwapchainError(format!(
                    "Failed to create image view {}: {:?}",
                    i, e
                )));
            }
        }
    }

    Ok(views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_choose_surface_format_falls_back_to_first() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_present_mode() {
        let with_mailbox = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&with_mailbox), vk::PresentModeKHR::MAILBOX);

        let fifo_only = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&fifo_only), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_extent_follows_current_capabilities() {
        let fallback = vk::Extent2D {
            width: 512,
            height: 512,
        };
        let extent = choose_extent(&capabilities((1280, 720)), fallback);
        assert_eq!((extent.width, extent.height), (1280, 720));

        // A later query after a resize wins over the original fallback.
        let extent = choose_extent(&capabilities((640, 480)), fallback);
        assert_eq!((extent.width, extent.height), (640, 480));
    }

    #[test]
    fn test_minimized_surface_has_zero_extent() {
        let minimized = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 0,
                height: 0,
            },
            ..Default::default()
        };
        let extent = choose_extent(
            &minimized,
            vk::Extent2D {
                width: 800,
                height: 800,
            },
        );
        assert!(is_zero_extent(extent));
        assert!(is_zero_extent(vk::Extent2D {
            width: 640,
            height: 0,
        }));
        assert!(!is_zero_extent(vk::Extent2D {
            width: 1,
            height: 1,
        }));
    }

    #[test]
    fn test_extent_fallback_is_clamped() {
        let caps = capabilities((u32::MAX, u32::MAX));
        let big = choose_extent(
            &caps,
            vk::Extent2D {
                width: 3000,
                height: 50,
            },
        );
        assert_eq!((big.width, big.height), (2000, 100));

        let inside = choose_extent(
            &caps,
            vk::Extent2D {
                width: 800,
                height: 600,
            },
        );
        assert_eq!((inside.width, inside.height), (800, 600));
    }

    #[test]
    fn test_determine_image_count() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 2);

        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unbounded), 3);
    }

    #[test]
    fn test_support_details_adequacy() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_modes = SwapchainSupportDetails {
            present_modes: vec![],
            ..adequate
        };
        assert!(!no_modes.is_adequate());
    }
}
