//! Plain data types shared across the presentation layer.

use bitflags::bitflags;

/// Pixel dimensions of a presentable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Extent {
    /// Zero extent; construction treats it as "unspecified".
    pub const ZERO: Extent = Extent { width: 0, height: 0 };

    /// Create an extent from width and height in pixels.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero (e.g. a minimized window).
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

bitflags! {
    /// Construction flag bits for swapchain creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SwapchainFlags: u32 {
        /// Force the headless variant even when a window handle is given.
        const HEADLESS = 1 << 0;
        /// Prefer an sRGB color space for the presentable images.
        const SRGB_COLORSPACE = 1 << 1;
        /// Request protected-content images from the platform.
        const PROTECTED_CONTENT = 1 << 2;
    }
}

/// Pixel format of a presentable image.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    R8G8B8A8_SRGB,
    R8G8B8A8_UNORM,
    B8G8R8A8_SRGB,
    B8G8R8A8_UNORM,
    D32_FLOAT,
}

impl ImageFormat {
    /// True for depth formats.
    pub fn is_depth(self) -> bool {
        matches!(self, ImageFormat::D32_FLOAT)
    }

    /// Size of one pixel in bytes.
    pub fn bytes_per_pixel(self) -> u32 {
        4
    }
}

/// GPU-side usage state of a presentable image.
///
/// Within one frame the tracked layout only moves forward: undefined, then
/// an attachment layout, then transfer-source (readback) or present-source.
/// The tracked state is reset at every acquire because the presentation
/// engine may have altered the real layout in the meantime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLayout {
    /// Contents and layout unknown; the only valid starting point.
    Undefined,
    /// Writable as a color render target.
    ColorAttachment,
    /// Writable as a depth attachment.
    DepthAttachment,
    /// Readable as a transfer source (capture/readback).
    TransferSrc,
    /// Handed to the presentation engine.
    PresentSrc,
}

impl ImageLayout {
    /// Ordering rank used to enforce monotonic transitions within a frame.
    pub(crate) fn rank(self) -> u8 {
        match self {
            ImageLayout::Undefined => 0,
            ImageLayout::ColorAttachment | ImageLayout::DepthAttachment => 1,
            ImageLayout::TransferSrc => 2,
            ImageLayout::PresentSrc => 3,
        }
    }
}

/// Read-only properties of a presentable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    /// Pixel dimensions
    pub extent: Extent,
    /// Pixel format
    pub format: ImageFormat,
}
