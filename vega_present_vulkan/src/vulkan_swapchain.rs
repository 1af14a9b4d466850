/// VulkanSwapchain - assembles the composed swapchain on the Vulkan backend
///
/// Ties the backend pieces together: the shared context (device, allocator,
/// queues), the command stream, the staging pool for capture, and either a
/// platform surface or the headless image ring.
use ash::vk;
use ash::vk::Handle;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

use vega_present::vega::present::{
    CommandStream, Extent, PresentSurface, Swapchain, SwapchainFlags,
};
use vega_present::vega::Result;

use crate::vulkan_commands::Commands;
use crate::vulkan_context::Context;
use crate::vulkan_device::Device;
use crate::vulkan_stage_pool::StagePool;
use crate::vulkan_surface::Surface;

/// Composed swapchain plus the backend handles capture needs.
pub struct VulkanSwapchain {
    /// The presentation state machine; drive acquire/present through this.
    pub swapchain: Swapchain,
    commands: Arc<Commands>,
    stage_pool: Arc<StagePool>,
}

impl VulkanSwapchain {
    /// Build a swapchain for `window`, or a headless one when `window` is
    /// `None` or [`SwapchainFlags::HEADLESS`] is set.
    ///
    /// A zero `requested_extent` falls back to the platform extent (surface)
    /// or the headless default.
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(
        context: Arc<Context>,
        commands: Arc<Commands>,
        stage_pool: Arc<StagePool>,
        window: Option<&W>,
        flags: SwapchainFlags,
        requested_extent: Extent,
    ) -> Result<Self> {
        let surface: Option<Box<dyn PresentSurface>> = match window {
            Some(window) if !flags.contains(SwapchainFlags::HEADLESS) => Some(Box::new(
                Surface::new(Arc::clone(&context), window, flags)?,
            )),
            _ => None,
        };

        let device = Device::new(context);
        let swapchain = Swapchain::new(
            device,
            Arc::clone(&commands) as Arc<dyn CommandStream>,
            surface,
            flags,
            requested_extent,
        )?;

        Ok(Self {
            swapchain,
            commands,
            stage_pool,
        })
    }

    /// Read back the acquired color image as tightly packed pixels.
    ///
    /// Call after rendering and before present. Blocks until the copy
    /// retires; the staging buffer is recycled through the pool, so
    /// steady-state capture allocates nothing.
    pub fn read_pixels(&mut self) -> Result<Vec<u8>> {
        let (extent, bytes_per_pixel, image_handle) = {
            let image = self.swapchain.prepare_capture()?;
            let info = *image.info();
            (
                info.extent,
                info.format.bytes_per_pixel(),
                image.resource().native_handle(),
            )
        };

        let size = extent.width as u64 * extent.height as u64 * bytes_per_pixel as u64;
        let stage = self.stage_pool.acquire(size)?;
        let buffer = stage.buffer();

        self.commands.record_with(|device, command_buffer| unsafe {
            let region = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                image_extent: vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                },
            };
            device.cmd_copy_image_to_buffer(
                command_buffer,
                vk::Image::from_raw(image_handle),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                buffer,
                &[region],
            );
        })?;

        let epoch = self.commands.submit(&[], &[])?;
        self.commands.wait_for_epoch(epoch)?;

        let data = stage.mapped()?[..size as usize].to_vec();
        self.stage_pool.recycle(stage, epoch);
        self.stage_pool.gc(self.commands.completed_epoch());
        Ok(data)
    }
}
