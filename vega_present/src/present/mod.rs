//! Presentation module - swapchain, image resources, and backend seams.
//!
//! The composed [`Swapchain`] selects between a headless image ring and a
//! platform surface at construction and exposes one acquire/present
//! contract to the renderer. Backends plug in through [`PresentSurface`],
//! [`PresentDevice`] and [`CommandStream`].

// Module declarations
mod commands;
mod headless;
mod image;
mod platform;
mod surface;
mod swapchain;
mod sync;
mod types;

#[cfg(test)]
pub(crate) mod mock;

// Re-export the public surface
pub use commands::CommandStream;
pub use image::SwapImage;
pub use platform::{
    AcquireStatus, GpuSignal, PresentDevice, PresentStatus, PresentSurface, PresentableImage,
    SurfaceConfig,
};
pub use swapchain::{AcquiredFrame, SwapTarget, Swapchain};
pub use sync::ReadySignal;
pub use types::{Extent, ImageFormat, ImageInfo, ImageLayout, SwapchainFlags};
