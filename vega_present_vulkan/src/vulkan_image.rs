/// Image - Vulkan implementation of the PresentableImage trait
use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::{Allocation, Allocator};
use std::sync::{Arc, Mutex};

use vega_present::vega::present::{ImageFormat, ImageInfo, ImageLayout, PresentableImage};

/// Vulkan presentable image
///
/// Either allocator-backed (headless ring slots, depth buffers) or wrapping
/// an image the platform swapchain owns. Platform-owned images are released
/// by destroying the swapchain, so only the view is destroyed here.
pub struct Image {
    /// Vulkan image
    pub(crate) image: vk::Image,
    /// Vulkan image view
    pub(crate) view: vk::ImageView,
    /// GPU memory allocation; None for platform-owned images
    pub(crate) allocation: Option<Allocation>,
    /// Vulkan device (for cleanup)
    pub(crate) device: ash::Device,
    /// GPU allocator (for cleanup)
    pub(crate) allocator: Arc<Mutex<Allocator>>,
    /// Read-only image properties
    pub(crate) info: ImageInfo,
    /// False when the platform swapchain owns the vk::Image
    pub(crate) owned: bool,
}

impl PresentableImage for Image {
    fn info(&self) -> &ImageInfo {
        &self.info
    }

    fn native_handle(&self) -> u64 {
        self.image.as_raw()
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            // Destroy image view
            self.device.destroy_image_view(self.view, None);

            // Free GPU memory
            if let Some(allocation) = self.allocation.take() {
                self.allocator.lock().unwrap().free(allocation).ok();
            }

            // Destroy image (platform-owned images die with the swapchain)
            if self.owned {
                self.device.destroy_image(self.image, None);
            }
        }
    }
}

/// Convert an engine format to a Vulkan format
pub(crate) fn format_to_vk(format: ImageFormat) -> vk::Format {
    match format {
        ImageFormat::R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
        ImageFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        ImageFormat::B8G8R8A8_SRGB => vk::Format::B8G8R8A8_SRGB,
        ImageFormat::B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        ImageFormat::D32_FLOAT => vk::Format::D32_SFLOAT,
    }
}

/// Convert a Vulkan format to an engine format
pub(crate) fn vk_to_format(vk_format: vk::Format) -> ImageFormat {
    match vk_format {
        vk::Format::R8G8B8A8_SRGB => ImageFormat::R8G8B8A8_SRGB,
        vk::Format::R8G8B8A8_UNORM => ImageFormat::R8G8B8A8_UNORM,
        vk::Format::B8G8R8A8_SRGB => ImageFormat::B8G8R8A8_SRGB,
        vk::Format::B8G8R8A8_UNORM => ImageFormat::B8G8R8A8_UNORM,
        vk::Format::D32_SFLOAT => ImageFormat::D32_FLOAT,
        _ => ImageFormat::B8G8R8A8_UNORM, // Fallback
    }
}

/// Vulkan layout plus the access and stage masks a barrier needs on each
/// side of a transition.
pub(crate) fn layout_sync(layout: ImageLayout) -> (vk::ImageLayout, vk::AccessFlags, vk::PipelineStageFlags) {
    match layout {
        ImageLayout::Undefined => (
            vk::ImageLayout::UNDEFINED,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::TOP_OF_PIPE,
        ),
        ImageLayout::ColorAttachment => (
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        ImageLayout::DepthAttachment => (
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        ImageLayout::TransferSrc => (
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::TRANSFER,
        ),
        ImageLayout::PresentSrc => (
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        ),
    }
}

/// Aspect mask for a format
pub(crate) fn aspect_mask(format: ImageFormat) -> vk::ImageAspectFlags {
    if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}
