/// Device - Vulkan implementation of the PresentDevice trait
///
/// Image and signal factory: allocator-backed off-screen images for the
/// headless ring, the shared depth image, and semaphore-backed readiness
/// signals.
use ash::vk;
use ash::vk::Handle;
use std::sync::Arc;

use vega_present::vega::present::{
    Extent, GpuSignal, ImageFormat, ImageInfo, PresentDevice, PresentableImage,
};
use vega_present::vega::{Error, Result};
use vega_present::{vega_err, vega_error};

use crate::vulkan_context::Context;
use crate::vulkan_image::{aspect_mask, format_to_vk, Image};

const SOURCE: &str = "vega::vulkan::Device";

/// Readiness signal backed by a binary semaphore
pub(crate) struct Signal {
    semaphore: vk::Semaphore,
    device: ash::Device,
}

impl GpuSignal for Signal {
    fn raw(&self) -> u64 {
        self.semaphore.as_raw()
    }
}

impl Drop for Signal {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan image/signal factory
pub struct Device {
    context: Arc<Context>,
}

impl Device {
    pub fn new(context: Arc<Context>) -> Arc<Self> {
        Arc::new(Self { context })
    }

    fn create_image(
        &self,
        extent: Extent,
        format: ImageFormat,
        usage: vk::ImageUsageFlags,
    ) -> Result<Arc<dyn PresentableImage>> {
        unsafe {
            let device = self.context.device();
            let vk_format = format_to_vk(format);

            let image_create_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(vk_format)
                .extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = device
                .create_image(&image_create_info, None)
                .map_err(|e| vega_err!(SOURCE, "Failed to create image: {:?}", e))?;

            let requirements = device.get_image_memory_requirements(image);
            let allocator = self.context.allocator();
            let allocation = allocator
                .lock()
                .unwrap()
                .allocate(&gpu_allocator::vulkan::AllocationCreateDesc {
                    name: "swapchain image",
                    requirements,
                    location: gpu_allocator::MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: gpu_allocator::vulkan::AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|_e| {
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    vega_error!(
                        SOURCE,
                        "Out of GPU memory for swapchain image ({}x{}, {:.2} MB)",
                        extent.width,
                        extent.height,
                        size_mb
                    );
                    device.destroy_image(image, None);
                    Error::OutOfMemory
                })?;

            device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .map_err(|e| vega_err!(SOURCE, "Failed to bind image memory: {:?}", e))?;

            let view_create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(vk_format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: aspect_mask(format),
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = device
                .create_image_view(&view_create_info, None)
                .map_err(|e| vega_err!(SOURCE, "Failed to create image view: {:?}", e))?;

            Ok(Arc::new(Image {
                image,
                view,
                allocation: Some(allocation),
                device: device.clone(),
                allocator,
                info: ImageInfo { extent, format },
                owned: true,
            }))
        }
    }
}

impl PresentDevice for Device {
    fn create_color_image(
        &self,
        extent: Extent,
        format: ImageFormat,
    ) -> Result<Arc<dyn PresentableImage>> {
        self.create_image(
            extent,
            format,
            vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST,
        )
    }

    fn create_depth_image(&self, extent: Extent) -> Result<Arc<dyn PresentableImage>> {
        self.create_image(
            extent,
            ImageFormat::D32_FLOAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    fn create_signal(&self) -> Result<Arc<dyn GpuSignal>> {
        unsafe {
            let semaphore_create_info = vk::SemaphoreCreateInfo::default();
            let semaphore = self
                .context
                .device()
                .create_semaphore(&semaphore_create_info, None)
                .map_err(|e| vega_err!(SOURCE, "Failed to create semaphore: {:?}", e))?;
            Ok(Arc::new(Signal {
                semaphore,
                device: self.context.device().clone(),
            }))
        }
    }
}
