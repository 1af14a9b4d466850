//! Backend trait seams: platform surface, image/signal factory.
//!
//! The swapchain never talks to a windowing system or a GPU API directly.
//! Everything platform-specific sits behind these traits, implemented per
//! backend (Vulkan) and mocked for tests.

use std::sync::Arc;

use crate::error::Result;
use crate::present::{Extent, ImageFormat, ImageInfo};

/// Backend synchronization token signaled when an acquired image is ready
/// for GPU writes.
///
/// The swapchain hands one of these out per acquire; the caller must make
/// the first GPU operation targeting the image wait on it.
pub trait GpuSignal: Send + Sync {
    /// Backend-defined raw handle (a Vulkan semaphore, for instance).
    ///
    /// A value of 0 means no backend wait is required - headless rings
    /// synchronize on the CPU before handing the image out.
    fn raw(&self) -> u64;
}

impl std::fmt::Debug for dyn GpuSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuSignal")
            .field("raw", &self.raw())
            .finish()
    }
}

/// One presentable GPU image owned by a backend.
pub trait PresentableImage: Send + Sync {
    /// Read-only image properties
    fn info(&self) -> &ImageInfo;

    /// Backend-defined native handle (a Vulkan image, for instance), used
    /// by the command stream to record layout transitions.
    fn native_handle(&self) -> u64;
}

/// Outcome of asking the platform for the next presentable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    /// This image index is ready for rendering.
    Ready(u32),
    /// This image is usable for one more frame, but the swap resources no
    /// longer match the window; a rebuild should follow.
    Suboptimal(u32),
    /// The swap resources must be rebuilt before any image can be acquired.
    OutOfDate,
    /// The surface itself is gone. No rebuild is possible with this native
    /// handle.
    Lost,
}

/// Outcome of handing an image back to the platform for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    /// The image was queued for display.
    Presented,
    /// Queued, but the swap resources no longer match the window.
    Suboptimal,
    /// The image could not be queued; the swap resources must be rebuilt.
    OutOfDate,
    /// The surface itself is gone.
    Lost,
}

/// Swap-resource configuration reported by the platform after
/// [`PresentSurface::configure`].
pub struct SurfaceConfig {
    /// Extent of the created images
    pub extent: Extent,
    /// Format of the created images
    pub format: ImageFormat,
    /// Rotation index the platform expects the first acquire to start from
    pub start_index: u32,
    /// The presentable images, in rotation order
    pub images: Vec<Arc<dyn PresentableImage>>,
}

/// Platform presentation boundary.
///
/// Wraps the windowing-system surface and its swap resources. The native
/// surface handle is created outside this layer and borrowed for the
/// lifetime of the implementation; image count, extent and validity are
/// platform-owned and can change between frames.
pub trait PresentSurface: Send {
    /// Tear down any existing swap resources and create new ones.
    ///
    /// A zero `requested` extent means "use the platform's current extent".
    /// Returns the resulting configuration including the new image set.
    fn configure(&mut self, requested: Extent) -> Result<SurfaceConfig>;

    /// Query the platform's current extent without reconfiguring.
    fn current_extent(&mut self) -> Result<Extent>;

    /// Ask the platform for the next image index.
    ///
    /// `signal` is armed by the platform and fires when the returned image
    /// is actually ready for GPU writes. May block the calling thread until
    /// an image is free.
    fn acquire_image(&mut self, signal: &dyn GpuSignal) -> Result<AcquireStatus>;

    /// Queue the image for display.
    ///
    /// `wait_signal` is the backend handle returned by
    /// [`CommandStream::flush`](crate::present::CommandStream::flush); the
    /// presentation engine must wait on it before reading the image. Zero
    /// means no wait is required.
    fn present_image(&mut self, index: u32, wait_signal: u64) -> Result<PresentStatus>;
}

/// Backend image and signal factory.
///
/// Creates the synthesized color ring for headless operation, the depth
/// image shared across all color images, and readiness signals.
pub trait PresentDevice: Send + Sync {
    /// Create an off-screen color image (headless ring slot).
    fn create_color_image(
        &self,
        extent: Extent,
        format: ImageFormat,
    ) -> Result<Arc<dyn PresentableImage>>;

    /// Create a depth image.
    fn create_depth_image(&self, extent: Extent) -> Result<Arc<dyn PresentableImage>>;

    /// Create a readiness signal.
    fn create_signal(&self) -> Result<Arc<dyn GpuSignal>>;
}
