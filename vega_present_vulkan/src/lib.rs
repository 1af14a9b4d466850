/*!
# Vega Presentation - Vulkan Backend

Vulkan implementation of the Vega presentation seams.

This crate provides the Vulkan backend behind the `vega_present` trait
boundaries using the Ash library for Vulkan bindings and gpu-allocator for
memory management: the instance/device context, the platform surface
wrapper with out-of-date/suboptimal/lost discrimination, the fence-epoch
command stream, allocator-backed images for headless rings, and a staging
pool for pixel readback.
*/

// Vulkan implementation modules
mod vulkan_commands;
mod vulkan_context;
mod vulkan_device;
mod vulkan_image;
mod vulkan_stage_pool;
mod vulkan_surface;
mod vulkan_swapchain;

#[cfg(feature = "vulkan-validation")]
mod vulkan_debug;

pub use vulkan_commands::Commands as VulkanCommands;
pub use vulkan_context::{Config, Context as VulkanContext};
pub use vulkan_device::Device as VulkanDevice;
pub use vulkan_image::Image as VulkanImage;
pub use vulkan_stage_pool::StagePool as VulkanStagePool;
pub use vulkan_surface::Surface as VulkanSurface;
pub use vulkan_swapchain::VulkanSwapchain;
