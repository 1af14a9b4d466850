/// Surface - Vulkan implementation of the PresentSurface trait
///
/// Wraps the platform surface and its VkSwapchainKHR. Handles image
/// acquisition, presentation, and swap-resource recreation on resize,
/// reporting the platform's out-of-date / suboptimal / lost tri-state to
/// the composed swapchain instead of acting on it here.
use ash::vk;
use ash::vk::Handle;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

use vega_present::vega::present::{
    AcquireStatus, Extent, GpuSignal, ImageInfo, PresentStatus, PresentSurface, PresentableImage,
    SurfaceConfig, SwapchainFlags,
};
use vega_present::vega::{Error, Result};
use vega_present::{vega_bail, vega_debug, vega_err, vega_error};

use crate::vulkan_context::Context;
use crate::vulkan_image::{vk_to_format, Image};

const SOURCE: &str = "vega::vulkan::Surface";

/// Vulkan platform surface wrapper
pub struct Surface {
    context: Arc<Context>,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    surface_format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    prefer_srgb: bool,
}

impl Surface {
    /// Wrap the native window in a Vulkan surface.
    ///
    /// The window handle is borrowed only for surface creation; the caller
    /// keeps it alive until after the swapchain is torn down.
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(
        context: Arc<Context>,
        window: &W,
        flags: SwapchainFlags,
    ) -> Result<Self> {
        unsafe {
            let display_handle = window.display_handle().map_err(|e| {
                vega_error!(SOURCE, "Failed to get display handle: {}", e);
                Error::InitializationFailed(format!("Failed to get display handle: {}", e))
            })?;
            let window_handle = window.window_handle().map_err(|e| {
                vega_error!(SOURCE, "Failed to get window handle: {}", e);
                Error::InitializationFailed(format!("Failed to get window handle: {}", e))
            })?;

            let surface = ash_window::create_surface(
                context.entry(),
                context.instance(),
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| {
                vega_error!(SOURCE, "Failed to create surface: {:?}", e);
                Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
            })?;

            let surface_loader =
                ash::khr::surface::Instance::new(context.entry(), context.instance());
            let swapchain_loader =
                ash::khr::swapchain::Device::new(context.instance(), context.device());

            Ok(Self {
                context,
                surface,
                surface_loader,
                swapchain_loader,
                swapchain: vk::SwapchainKHR::null(),
                surface_format: vk::SurfaceFormatKHR::default(),
                extent: vk::Extent2D::default(),
                prefer_srgb: flags.contains(SwapchainFlags::SRGB_COLORSPACE),
            })
        }
    }

    fn map_platform_error(&self, e: vk::Result, what: &str) -> Error {
        match e {
            vk::Result::ERROR_SURFACE_LOST_KHR => {
                vega_error!(SOURCE, "Surface lost while {}", what);
                Error::SurfaceLost(format!("surface lost while {}", what))
            }
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                vega_error!(SOURCE, "Out of memory while {}", what);
                Error::OutOfMemory
            }
            _ => {
                vega_error!(SOURCE, "Failed while {}: {:?}", what, e);
                Error::InitializationFailed(format!("failed while {}: {:?}", what, e))
            }
        }
    }

    fn query_capabilities(&self) -> Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(
                    self.context.physical_device(),
                    self.surface,
                )
                .map_err(|e| self.map_platform_error(e, "querying surface capabilities"))
        }
    }

    fn choose_format(&self) -> Result<vk::SurfaceFormatKHR> {
        unsafe {
            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(self.context.physical_device(), self.surface)
                .map_err(|e| self.map_platform_error(e, "querying surface formats"))?;
            if formats.is_empty() {
                return Err(Error::InitializationFailed(
                    "surface reports no formats".to_string(),
                ));
            }

            let preferred = if self.prefer_srgb {
                [vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_SRGB]
            } else {
                [vk::Format::B8G8R8A8_UNORM, vk::Format::R8G8B8A8_UNORM]
            };
            Ok(formats
                .iter()
                .find(|f| preferred.contains(&f.format))
                .copied()
                .unwrap_or(formats[0]))
        }
    }
}

impl PresentSurface for Surface {
    fn configure(&mut self, requested: Extent) -> Result<SurfaceConfig> {
        unsafe {
            let device = self.context.device().clone();
            let capabilities = self.query_capabilities()?;
            self.surface_format = self.choose_format()?;

            // The platform's extent wins when it reports one; otherwise
            // clamp the requested size into the supported range.
            let extent = if capabilities.current_extent.width != u32::MAX {
                capabilities.current_extent
            } else {
                vk::Extent2D {
                    width: requested.width.clamp(
                        capabilities.min_image_extent.width,
                        capabilities.max_image_extent.width,
                    ),
                    height: requested.height.clamp(
                        capabilities.min_image_extent.height,
                        capabilities.max_image_extent.height,
                    ),
                }
            };

            let image_count = capabilities.min_image_count + 1;
            let image_count = if capabilities.max_image_count > 0 {
                image_count.min(capabilities.max_image_count)
            } else {
                image_count
            };

            // Readback support when the platform allows it.
            let mut usage = vk::ImageUsageFlags::COLOR_ATTACHMENT;
            if capabilities
                .supported_usage_flags
                .contains(vk::ImageUsageFlags::TRANSFER_SRC)
            {
                usage |= vk::ImageUsageFlags::TRANSFER_SRC;
            }

            let old_swapchain = self.swapchain;
            let swapchain_create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(self.surface)
                .min_image_count(image_count)
                .image_format(self.surface_format.format)
                .image_color_space(self.surface_format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(usage)
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(vk::PresentModeKHR::FIFO)
                .clipped(true)
                .old_swapchain(old_swapchain);

            let swapchain = self
                .swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(|e| self.map_platform_error(e, "creating swapchain"))?;

            if old_swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(old_swapchain, None);
            }
            self.swapchain = swapchain;
            self.extent = extent;

            let swapchain_images = self
                .swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(|e| self.map_platform_error(e, "querying swapchain images"))?;

            let format = vk_to_format(self.surface_format.format);
            let core_extent = Extent::new(extent.width, extent.height);
            let mut images: Vec<Arc<dyn PresentableImage>> =
                Vec::with_capacity(swapchain_images.len());
            for &image in &swapchain_images {
                let view_create_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(self.surface_format.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                let view = device
                    .create_image_view(&view_create_info, None)
                    .map_err(|e| vega_err!(SOURCE, "Failed to create image view: {:?}", e))?;

                images.push(Arc::new(Image {
                    image,
                    view,
                    allocation: None,
                    device: device.clone(),
                    allocator: self.context.allocator(),
                    info: ImageInfo {
                        extent: core_extent,
                        format,
                    },
                    // The platform swapchain owns these VkImages.
                    owned: false,
                }));
            }

            vega_debug!(
                SOURCE,
                "configured swap resources: {}x{}, {} images, {:?}",
                extent.width,
                extent.height,
                images.len(),
                self.surface_format.format
            );

            Ok(SurfaceConfig {
                extent: core_extent,
                format,
                start_index: 0,
                images,
            })
        }
    }

    fn current_extent(&mut self) -> Result<Extent> {
        let capabilities = self.query_capabilities()?;
        // Width of u32::MAX means the platform lets the application choose;
        // report the configured extent so no spurious rebuild triggers.
        if capabilities.current_extent.width == u32::MAX {
            return Ok(Extent::new(self.extent.width, self.extent.height));
        }
        Ok(Extent::new(
            capabilities.current_extent.width,
            capabilities.current_extent.height,
        ))
    }

    fn acquire_image(&mut self, signal: &dyn GpuSignal) -> Result<AcquireStatus> {
        unsafe {
            let semaphore = vk::Semaphore::from_raw(signal.raw());
            match self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            ) {
                Ok((index, false)) => Ok(AcquireStatus::Ready(index)),
                Ok((index, true)) => Ok(AcquireStatus::Suboptimal(index)),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireStatus::OutOfDate),
                Err(vk::Result::ERROR_SURFACE_LOST_KHR) => Ok(AcquireStatus::Lost),
                Err(e) => {
                    vega_bail!(SOURCE, "Failed to acquire next swapchain image: {:?}", e)
                }
            }
        }
    }

    fn present_image(&mut self, index: u32, wait_signal: u64) -> Result<PresentStatus> {
        unsafe {
            let swapchains = [self.swapchain];
            let image_indices = [index];
            let wait_semaphores: Vec<vk::Semaphore> = if wait_signal != 0 {
                vec![vk::Semaphore::from_raw(wait_signal)]
            } else {
                Vec::new()
            };

            let present_info = vk::PresentInfoKHR::default()
                .wait_semaphores(&wait_semaphores)
                .swapchains(&swapchains)
                .image_indices(&image_indices);

            match self
                .swapchain_loader
                .queue_present(self.context.present_queue(), &present_info)
            {
                Ok(false) => Ok(PresentStatus::Presented),
                Ok(true) => Ok(PresentStatus::Suboptimal),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
                Err(vk::Result::ERROR_SURFACE_LOST_KHR) => Ok(PresentStatus::Lost),
                Err(e) => {
                    vega_bail!(SOURCE, "Failed to present swapchain image: {:?}", e)
                }
            }
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            // Wait for the device to finish; image views are destroyed by
            // their SwapImage owners before this runs.
            self.context.device().device_wait_idle().ok();

            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
