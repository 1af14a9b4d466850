//! Surface backing - platform swap resources plus rebuild scheduling.
//!
//! The platform reports three distinct invalidation conditions and they must
//! not be conflated: *out-of-date* forces a rebuild before the frame can
//! proceed, *suboptimal* keeps the current frame valid and defers the
//! rebuild to the next acquire, and *lost* is fatal - the native handle is
//! gone and no reconstruction is possible here.

use crate::error::Result;
use crate::present::{Extent, ImageFormat, PresentSurface};

/// Surface-backed presentation state.
pub(crate) struct SurfaceBacking {
    /// Platform surface wrapper (borrowed native handle inside)
    pub(crate) surface: Box<dyn PresentSurface>,
    /// A rebuild was scheduled (suboptimal report) but not yet performed
    pub(crate) pending_rebuild: bool,
    /// Format the platform chose for the current swap resources
    pub(crate) format: ImageFormat,
}

impl SurfaceBacking {
    pub(crate) fn new(surface: Box<dyn PresentSurface>, format: ImageFormat) -> Self {
        Self {
            surface,
            pending_rebuild: false,
            format,
        }
    }

    /// True when the next acquire must rebuild before asking for an image.
    ///
    /// Either a rebuild is already scheduled, or the platform's extent has
    /// drifted from `extent` without an out-of-date report (some platforms
    /// resize silently). A zero platform extent (minimized window) never
    /// triggers a rebuild; the swap resources stay at their old size until
    /// the window is restored.
    pub(crate) fn needs_rebuild(&mut self, extent: Extent) -> Result<bool> {
        if self.pending_rebuild {
            return Ok(true);
        }
        let platform = self.surface.current_extent()?;
        Ok(!platform.is_zero() && platform != extent)
    }
}
