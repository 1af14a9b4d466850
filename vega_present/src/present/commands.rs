//! CommandStream trait - opaque handle to the backend's in-flight work.

use std::sync::Arc;

use crate::error::Result;
use crate::present::{ImageLayout, PresentableImage};

/// Opaque reference to the backend's command submission system.
///
/// The swapchain does not own the stream and never submits through it; it
/// only synchronizes against it. In-flight work is tracked as monotonically
/// increasing *epochs*: every submission batch carries the epoch that was
/// current when it was recorded, and an epoch is *retired* once all GPU
/// work submitted under it has completed.
pub trait CommandStream: Send + Sync {
    /// Epoch of the submission batch currently being recorded.
    fn current_epoch(&self) -> u64;

    /// Most recent epoch whose GPU work has fully retired.
    fn completed_epoch(&self) -> u64;

    /// Block until `epoch` has retired.
    fn wait_for_epoch(&self, epoch: u64) -> Result<()>;

    /// Block until every pending submission has retired.
    fn wait_idle(&self) -> Result<()>;

    /// Flush recorded work to the GPU.
    ///
    /// Called by present so the frame's final layout transitions reach the
    /// GPU before the image is handed to the presentation engine. Returns
    /// the flushed batch's epoch and, when `need_signal` is set, a backend
    /// handle signaled on batch completion for the presentation engine to
    /// wait on. The caller must actually wait on a requested handle -
    /// backends may recycle it. Zero when `need_signal` is false or the
    /// backend has no such handle.
    fn flush(&self, need_signal: bool) -> Result<(u64, u64)>;

    /// Record a layout transition for `image` into the current batch.
    fn transition_image(
        &self,
        image: &Arc<dyn PresentableImage>,
        from: ImageLayout,
        to: ImageLayout,
    ) -> Result<()>;
}
