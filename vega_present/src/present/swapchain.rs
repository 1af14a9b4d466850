//! Swapchain - composed acquire/present abstraction.
//!
//! Selects between a headless image ring and a platform surface at
//! construction and exposes one contract to the render loop: acquire an
//! image, render into it gated by the readiness signal, present it back.
//! Surface invalidation (resize, out-of-date, suboptimal) is healed
//! internally through the rebuild path; only surface loss and resource
//! exhaustion surface to the caller, after which the swapchain is defunct.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::{vega_debug, vega_error, vega_info, vega_warn};

use crate::present::headless::{
    HeadlessBacking, HEADLESS_FALLBACK_HEIGHT, HEADLESS_FALLBACK_WIDTH, HEADLESS_RING_SIZE,
};
use crate::present::surface::SurfaceBacking;
use crate::present::sync::NoopSignal;
use crate::present::{
    AcquireStatus, CommandStream, Extent, GpuSignal, ImageFormat, ImageLayout, PresentDevice,
    PresentStatus, PresentSurface, ReadySignal, SwapImage, SwapchainFlags,
};

const SOURCE: &str = "vega::Swapchain";

/// How many times one acquire call may rebuild before giving up.
const MAX_REBUILD_ATTEMPTS: u32 = 2;

/// Presentation target backing, chosen once at construction.
///
/// A sum type instead of a trait object: the acquire/present path runs once
/// per frame and has exactly two implementations, so the dispatch stays a
/// jump on the tag and the renderer keeps a single call site.
enum Backing {
    Headless(HeadlessBacking),
    Surface(SurfaceBacking),
}

/// Non-owning handle to a swapchain image slot, valid for one frame.
///
/// Carries the generation it was issued under; resolving a handle from
/// before a rebuild fails instead of touching a released image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapTarget {
    slot: u32,
    generation: u64,
    is_depth: bool,
}

impl SwapTarget {
    /// Rotation slot this handle points at (0 for the depth image).
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Swapchain generation the handle was issued under.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True when the handle points at the shared depth image.
    pub fn is_depth(&self) -> bool {
        self.is_depth
    }
}

/// Result of a successful acquire.
#[derive(Debug, Clone, Copy)]
pub struct AcquiredFrame {
    /// Color image to render into this frame
    pub color: SwapTarget,
    /// Shared depth image, when the swapchain carries one
    pub depth: Option<SwapTarget>,
    /// True when the swap resources were rebuilt during this acquire; every
    /// previously issued target handle is invalid from here on
    pub resized: bool,
}

/// Rotating set of presentable images plus the logic to acquire and present
/// them.
///
/// Single-thread-owned: one render thread calls `acquire` and `present` in
/// strict alternation. GPU execution is asynchronous; the readiness signal
/// handed out per acquire must gate the first GPU write into the image, and
/// that wait is injected by the caller, never assumed.
pub struct Swapchain {
    device: Arc<dyn PresentDevice>,
    commands: Arc<dyn CommandStream>,
    /// Color images, indexed by rotation slot. Declared before `backing`:
    /// the image views must be released before the platform swap resources.
    colors: Vec<SwapImage>,
    /// Depth image shared across all color images; only one frame is in
    /// flight on the depth buffer at a time
    depth: Option<SwapImage>,
    backing: Backing,
    extent: Extent,
    /// Rotation index, always in `[0, colors.len())`
    current: u32,
    /// An image is acquired and not yet presented
    acquired: bool,
    /// No render pass has targeted the current images since construction or
    /// the last rebuild
    first_render_pass: bool,
    /// Bumped on every rebuild; invalidates outstanding `SwapTarget`s
    generation: u64,
    ready: ReadySignal,
    /// Set after a fatal error; every further call is rejected
    defunct: bool,
    /// Last present failed transiently (frame dropped, rebuild scheduled)
    present_failed: bool,
}

impl std::fmt::Debug for Swapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swapchain")
            .field("extent", &self.extent)
            .field("current", &self.current)
            .field("acquired", &self.acquired)
            .field("generation", &self.generation)
            .field("defunct", &self.defunct)
            .field("present_failed", &self.present_failed)
            .finish()
    }
}

impl Swapchain {
    /// Create a swapchain over `surface`, or a headless one when `surface`
    /// is `None` or [`SwapchainFlags::HEADLESS`] is set.
    ///
    /// A zero `requested_extent` falls back to the platform-queried extent
    /// (surface) or a small synthetic default (headless). Fails when the
    /// platform cannot produce any presentable image for the surface.
    pub fn new(
        device: Arc<dyn PresentDevice>,
        commands: Arc<dyn CommandStream>,
        surface: Option<Box<dyn PresentSurface>>,
        flags: SwapchainFlags,
        requested_extent: Extent,
    ) -> Result<Self> {
        match surface {
            Some(surface) if !flags.contains(SwapchainFlags::HEADLESS) => {
                Self::new_surface(device, commands, surface, requested_extent)
            }
            _ => Self::new_headless(device, commands, flags, requested_extent),
        }
    }

    fn new_headless(
        device: Arc<dyn PresentDevice>,
        commands: Arc<dyn CommandStream>,
        flags: SwapchainFlags,
        requested_extent: Extent,
    ) -> Result<Self> {
        let extent = if requested_extent.is_zero() {
            Extent::new(HEADLESS_FALLBACK_WIDTH, HEADLESS_FALLBACK_HEIGHT)
        } else {
            requested_extent
        };
        let format = if flags.contains(SwapchainFlags::SRGB_COLORSPACE) {
            ImageFormat::R8G8B8A8_SRGB
        } else {
            ImageFormat::R8G8B8A8_UNORM
        };

        let mut colors = Vec::with_capacity(HEADLESS_RING_SIZE);
        for _ in 0..HEADLESS_RING_SIZE {
            colors.push(SwapImage::new(device.create_color_image(extent, format)?));
        }
        let depth = SwapImage::new(device.create_depth_image(extent)?);

        vega_info!(
            SOURCE,
            "created headless swapchain: {}x{}, ring of {}",
            extent.width,
            extent.height,
            HEADLESS_RING_SIZE
        );

        Ok(Self {
            device,
            commands,
            backing: Backing::Headless(HeadlessBacking::new(HEADLESS_RING_SIZE)),
            colors,
            depth: Some(depth),
            extent,
            // First acquire advances to slot 0.
            current: (HEADLESS_RING_SIZE - 1) as u32,
            acquired: false,
            first_render_pass: true,
            generation: 0,
            ready: ReadySignal::new(Arc::new(NoopSignal)),
            defunct: false,
            present_failed: false,
        })
    }

    fn new_surface(
        device: Arc<dyn PresentDevice>,
        commands: Arc<dyn CommandStream>,
        mut surface: Box<dyn PresentSurface>,
        requested_extent: Extent,
    ) -> Result<Self> {
        let config = surface.configure(requested_extent)?;
        if config.images.is_empty() {
            vega_error!(SOURCE, "platform produced no presentable images for the surface");
            return Err(Error::InitializationFailed(
                "platform produced no presentable images".to_string(),
            ));
        }

        let colors: Vec<SwapImage> = config.images.into_iter().map(SwapImage::new).collect();
        let depth = SwapImage::new(device.create_depth_image(config.extent)?);
        let ready = ReadySignal::new(device.create_signal()?);

        vega_info!(
            SOURCE,
            "created surface swapchain: {}x{}, {} images, format {:?}",
            config.extent.width,
            config.extent.height,
            colors.len(),
            config.format
        );

        Ok(Self {
            device,
            commands,
            backing: Backing::Surface(SurfaceBacking::new(surface, config.format)),
            colors,
            depth: Some(depth),
            extent: config.extent,
            current: config.start_index,
            acquired: false,
            first_render_pass: true,
            generation: 0,
            ready,
            defunct: false,
            present_failed: false,
        })
    }

    /// Acquire the next image for rendering.
    ///
    /// Blocks until the platform has a free image (surface) or until prior
    /// GPU work on the recycled slot retires (headless). Out-of-date swap
    /// resources and extent changes are healed by an internal rebuild,
    /// reported through [`AcquiredFrame::resized`]; surface loss is fatal
    /// and leaves the swapchain defunct.
    pub fn acquire(&mut self) -> Result<AcquiredFrame> {
        if self.defunct {
            return Err(Error::InvalidState(
                "swapchain is defunct after a fatal error".to_string(),
            ));
        }
        if self.acquired {
            return Err(Error::InvalidState(
                "acquire() called twice without an intervening present()".to_string(),
            ));
        }
        self.present_failed = false;

        let resized = if self.is_headless() {
            self.acquire_headless()?;
            false
        } else {
            self.acquire_surface()?
        };

        // Re-assert layouts from Undefined: the presentation engine may have
        // altered the image since its last present.
        let commands = Arc::clone(&self.commands);
        let slot = self.current as usize;
        self.colors[slot].reset_layout();
        self.colors[slot].transition_to(commands.as_ref(), ImageLayout::ColorAttachment)?;
        if let Some(depth) = self.depth.as_mut() {
            depth.transition_to(commands.as_ref(), ImageLayout::DepthAttachment)?;
        }

        self.acquired = true;
        Ok(AcquiredFrame {
            color: SwapTarget {
                slot: self.current,
                generation: self.generation,
                is_depth: false,
            },
            depth: self.depth.as_ref().map(|_| SwapTarget {
                slot: 0,
                generation: self.generation,
                is_depth: true,
            }),
            resized,
        })
    }

    fn acquire_headless(&mut self) -> Result<()> {
        let commands = Arc::clone(&self.commands);
        let next = match &self.backing {
            Backing::Headless(h) => h.acquire(self.current, commands.as_ref())?,
            Backing::Surface(_) => unreachable!(),
        };
        self.current = next;
        self.ready.rearm();
        Ok(())
    }

    fn acquire_surface(&mut self) -> Result<bool> {
        let mut rebuilt = false;

        // Deferred rebuild from a prior suboptimal report, or a platform
        // extent change that never surfaced through an acquire status.
        let needs = {
            let extent = self.extent;
            let result = match &mut self.backing {
                Backing::Surface(s) => s.needs_rebuild(extent),
                Backing::Headless(_) => unreachable!(),
            };
            match result {
                Ok(needs) => needs,
                Err(e) => {
                    self.defunct = true;
                    return Err(e);
                }
            }
        };
        if needs {
            self.rebuild()?;
            rebuilt = true;
        }

        for attempt in 0..MAX_REBUILD_ATTEMPTS {
            self.ready.rearm();
            let status = {
                let signal = self.ready.backend();
                let result = match &mut self.backing {
                    Backing::Surface(s) => s.surface.acquire_image(signal),
                    Backing::Headless(_) => unreachable!(),
                };
                match result {
                    Ok(status) => status,
                    Err(e) => {
                        self.defunct = true;
                        return Err(e);
                    }
                }
            };

            match status {
                AcquireStatus::Ready(index) => {
                    self.current = index;
                    return Ok(rebuilt);
                }
                AcquireStatus::Suboptimal(index) => {
                    // Usable this frame; rebuild on the next acquire.
                    if let Backing::Surface(s) = &mut self.backing {
                        s.pending_rebuild = true;
                    }
                    vega_debug!(SOURCE, "acquire reported suboptimal; rebuild scheduled");
                    self.current = index;
                    return Ok(rebuilt);
                }
                AcquireStatus::OutOfDate => {
                    if attempt + 1 == MAX_REBUILD_ATTEMPTS {
                        break;
                    }
                    self.rebuild()?;
                    rebuilt = true;
                }
                AcquireStatus::Lost => {
                    self.defunct = true;
                    vega_error!(SOURCE, "platform surface was lost during acquire");
                    return Err(Error::SurfaceLost(
                        "platform surface was lost during acquire".to_string(),
                    ));
                }
            }
        }

        self.defunct = true;
        vega_error!(
            SOURCE,
            "surface still out of date after {} rebuilds",
            MAX_REBUILD_ATTEMPTS
        );
        Err(Error::BackendError(
            "surface still out of date after rebuild".to_string(),
        ))
    }

    /// Tear down and recreate all swap resources.
    ///
    /// The wait-for-idle here is the one allowed blocking point outside of
    /// acquire: all GPU work referencing the outgoing images must retire
    /// before they are released.
    fn rebuild(&mut self) -> Result<()> {
        self.commands.wait_idle()?;

        // Release our image wrappers before the platform swap resources.
        self.colors.clear();

        let config = match &mut self.backing {
            Backing::Surface(s) => {
                s.pending_rebuild = false;
                s.surface.configure(Extent::ZERO)
            }
            Backing::Headless(_) => unreachable!("headless swapchains never rebuild"),
        };
        let config = match config {
            Ok(config) => config,
            Err(e) => {
                self.defunct = true;
                return Err(e);
            }
        };
        if config.images.is_empty() {
            self.defunct = true;
            vega_error!(SOURCE, "platform produced no presentable images on rebuild");
            return Err(Error::InitializationFailed(
                "platform produced no presentable images".to_string(),
            ));
        }

        let old_extent = self.extent;
        self.extent = config.extent;
        if let Backing::Surface(s) = &mut self.backing {
            s.format = config.format;
        }
        self.colors = config.images.into_iter().map(SwapImage::new).collect();

        // Depth is shared across the ring; only a size change invalidates it.
        if self.extent != old_extent {
            let depth = match self.device.create_depth_image(self.extent) {
                Ok(depth) => depth,
                Err(e) => {
                    self.defunct = true;
                    return Err(e);
                }
            };
            self.depth = Some(SwapImage::new(depth));
        }

        self.current = config.start_index;
        self.generation = self.generation.wrapping_add(1);
        self.first_render_pass = true;

        let signal = match self.device.create_signal() {
            Ok(signal) => signal,
            Err(e) => {
                self.defunct = true;
                return Err(e);
            }
        };
        self.ready.replace(signal);

        vega_info!(
            SOURCE,
            "rebuilt swap resources: {}x{}, {} images",
            self.extent.width,
            self.extent.height,
            self.colors.len()
        );
        Ok(())
    }

    /// Hand the acquired image back for display.
    ///
    /// Surface variant: queues the image with the platform. Headless: a
    /// no-op rotation point that records the submission epoch gating the
    /// slot's reuse. Must be called at most once per acquire; the image
    /// must not be written again until it is reacquired.
    pub fn present(&mut self) -> Result<()> {
        if self.defunct {
            return Err(Error::InvalidState(
                "swapchain is defunct after a fatal error".to_string(),
            ));
        }
        if !self.acquired {
            return Err(Error::InvalidState(
                "present() called without a matching acquire()".to_string(),
            ));
        }

        let commands = Arc::clone(&self.commands);
        let slot = self.current as usize;
        let is_surface = matches!(self.backing, Backing::Surface(_));

        if is_surface {
            self.colors[slot].transition_to(commands.as_ref(), ImageLayout::PresentSrc)?;
        }

        // Flush so the frame's recorded work (including the hand-off
        // transition) reaches the GPU before the platform reads the image.
        // Only the surface variant needs the completion handle.
        let (epoch, finished) = commands.flush(is_surface)?;

        let status = match &mut self.backing {
            Backing::Headless(h) => {
                h.mark_presented(self.current, epoch);
                None
            }
            Backing::Surface(s) => match s.surface.present_image(self.current, finished) {
                Ok(status) => Some(status),
                Err(e) => {
                    self.defunct = true;
                    self.acquired = false;
                    return Err(e);
                }
            },
        };

        self.acquired = false;

        match status {
            None | Some(PresentStatus::Presented) => {}
            Some(PresentStatus::Suboptimal) => {
                if let Backing::Surface(s) = &mut self.backing {
                    s.pending_rebuild = true;
                }
                vega_debug!(SOURCE, "present reported suboptimal; rebuild scheduled");
            }
            Some(PresentStatus::OutOfDate) => {
                if let Backing::Surface(s) = &mut self.backing {
                    s.pending_rebuild = true;
                }
                self.present_failed = true;
                vega_warn!(SOURCE, "present reported out-of-date; frame dropped, rebuild scheduled");
            }
            Some(PresentStatus::Lost) => {
                self.defunct = true;
                vega_error!(SOURCE, "platform surface was lost during present");
                return Err(Error::SurfaceLost(
                    "platform surface was lost during present".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Readiness signal for the currently acquired image.
    ///
    /// The caller must make the first GPU operation targeting the image
    /// wait on it. Consumable exactly once per acquire.
    pub fn take_ready_signal(&mut self) -> Result<Arc<dyn GpuSignal>> {
        if !self.acquired {
            return Err(Error::InvalidState(
                "no acquired image; the readiness signal is not armed".to_string(),
            ));
        }
        self.ready.consume()
    }

    /// Transition the acquired color image for readback.
    ///
    /// Used by capture/screenshot paths after rendering and before present;
    /// the image moves to the transfer-source layout and the hand-off to
    /// the presentation engine happens from there.
    pub fn prepare_capture(&mut self) -> Result<&SwapImage> {
        if !self.acquired {
            return Err(Error::InvalidState(
                "prepare_capture() called with no acquired image".to_string(),
            ));
        }
        let commands = Arc::clone(&self.commands);
        let slot = self.current as usize;
        self.colors[slot].transition_to(commands.as_ref(), ImageLayout::TransferSrc)?;
        Ok(&self.colors[slot])
    }

    /// Color image for the currently acquired frame.
    ///
    /// Fails fast when no image is acquired; calling this before the first
    /// acquire is a renderer logic error, not a runtime condition.
    pub fn current_color(&self) -> Result<&SwapImage> {
        if !self.acquired {
            return Err(Error::InvalidState(
                "current_color() called with no acquired image".to_string(),
            ));
        }
        Ok(&self.colors[self.current as usize])
    }

    /// Depth image shared across the ring.
    pub fn depth(&self) -> Result<&SwapImage> {
        if !self.acquired {
            return Err(Error::InvalidState(
                "depth() called with no acquired image".to_string(),
            ));
        }
        self.depth
            .as_ref()
            .ok_or_else(|| Error::InvalidState("swapchain has no depth image".to_string()))
    }

    /// Resolve a target handle, rejecting handles issued before a rebuild.
    pub fn resolve(&self, target: SwapTarget) -> Result<&SwapImage> {
        if target.generation != self.generation {
            return Err(Error::InvalidState(format!(
                "stale swap target: generation {} but swapchain is at {}",
                target.generation, self.generation
            )));
        }
        if target.is_depth {
            self.depth
                .as_ref()
                .ok_or_else(|| Error::InvalidState("swapchain has no depth image".to_string()))
        } else {
            self.colors
                .get(target.slot as usize)
                .ok_or_else(|| Error::InvalidState(format!("slot {} out of range", target.slot)))
        }
    }

    /// True until the first render pass targets the current images.
    ///
    /// Consumers use this to decide between a full clear and a
    /// load-preserving pass; it resets whenever the swapchain rebuilds.
    pub fn is_first_render_pass(&self) -> bool {
        self.first_render_pass
    }

    /// Record that a render pass has targeted the current images.
    pub fn mark_first_render_pass(&mut self) {
        self.first_render_pass = false;
    }

    /// Current pixel dimensions, reflecting the post-rebuild state.
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Number of images in the rotation.
    pub fn image_count(&self) -> usize {
        self.colors.len()
    }

    /// Pixel format of the color images.
    pub fn format(&self) -> ImageFormat {
        match &self.backing {
            Backing::Surface(s) => s.format,
            Backing::Headless(_) => self.colors[0].info().format,
        }
    }

    /// True for swapchains with no platform surface.
    pub fn is_headless(&self) -> bool {
        matches!(self.backing, Backing::Headless(_))
    }

    /// Current rebuild generation; bumps whenever swap resources are
    /// recreated.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True when the last present dropped the frame transiently. Cleared on
    /// the next acquire.
    pub fn present_failed(&self) -> bool {
        self.present_failed
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        // Outstanding GPU work - including capture requests still reading
        // these images - must drain before the backing resources go away.
        if !self.defunct {
            self.commands.wait_idle().ok();
        }
    }
}

#[cfg(test)]
#[path = "swapchain_tests.rs"]
mod tests;
