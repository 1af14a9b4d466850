//! Headless backing - synthesized image ring with no platform surface.
//!
//! Used for contexts with no display: automated testing, offscreen capture,
//! automation-driven screenshot export. Presentation is a no-op rotation
//! point; the only wait acquire can perform is for prior GPU work that still
//! references the recycled slot.

use crate::error::Result;
use crate::present::CommandStream;

/// Number of images in a headless ring.
pub(crate) const HEADLESS_RING_SIZE: usize = 3;

/// Extent used when construction requests a zero extent.
pub(crate) const HEADLESS_FALLBACK_WIDTH: u32 = 640;
pub(crate) const HEADLESS_FALLBACK_HEIGHT: u32 = 480;

/// Off-screen image ring state.
pub(crate) struct HeadlessBacking {
    /// Epoch of the submission batch that last "presented" each slot.
    ///
    /// Zero means the slot has never been written and can be handed out
    /// immediately.
    last_present: Vec<u64>,
}

impl HeadlessBacking {
    pub(crate) fn new(ring_size: usize) -> Self {
        Self {
            last_present: vec![0; ring_size],
        }
    }

    /// Advance the rotation and return the next slot.
    ///
    /// Blocks only when GPU work from the slot's last present has not yet
    /// retired; an idle slot is returned immediately.
    pub(crate) fn acquire(&self, current: u32, commands: &dyn CommandStream) -> Result<u32> {
        let next = (current as usize + 1) % self.last_present.len();
        let pending = self.last_present[next];
        if pending > commands.completed_epoch() {
            commands.wait_for_epoch(pending)?;
        }
        Ok(next as u32)
    }

    /// Record the epoch whose retirement gates the slot's reuse.
    pub(crate) fn mark_presented(&mut self, slot: u32, epoch: u64) {
        self.last_present[slot as usize] = epoch;
    }
}
