//! SwapImage - one presentable image plus layout-transition bookkeeping.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::present::{CommandStream, ImageInfo, ImageLayout, PresentableImage};

/// One presentable image together with the metadata needed to request
/// GPU-side layout transitions before it is rendered to or presented.
///
/// The swapchain owns these exclusively while they are resident; consumers
/// see the underlying resource only as a shared handle for the duration of
/// one frame.
pub struct SwapImage {
    /// Backend image resource (shared with the render-target consumer)
    image: Arc<dyn PresentableImage>,
    /// Layout the presentation layer last transitioned the image to
    layout: ImageLayout,
}

impl std::fmt::Debug for SwapImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapImage")
            .field("info", self.image.info())
            .field("layout", &self.layout)
            .finish()
    }
}

impl SwapImage {
    pub(crate) fn new(image: Arc<dyn PresentableImage>) -> Self {
        Self {
            image,
            layout: ImageLayout::Undefined,
        }
    }

    /// Read-only image properties
    pub fn info(&self) -> &ImageInfo {
        self.image.info()
    }

    /// Layout the image was last transitioned to
    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    /// Shared handle to the backend resource
    pub fn resource(&self) -> &Arc<dyn PresentableImage> {
        &self.image
    }

    /// Forget the tracked layout.
    ///
    /// Called at acquire time: the presentation engine may have altered the
    /// real layout since the last present, so it must be re-asserted from
    /// Undefined.
    pub(crate) fn reset_layout(&mut self) {
        self.layout = ImageLayout::Undefined;
    }

    /// Record a transition to `target` through the command stream.
    ///
    /// Transitions are monotonic within a frame; a no-op when the image is
    /// already in `target`.
    pub(crate) fn transition_to(
        &mut self,
        commands: &dyn CommandStream,
        target: ImageLayout,
    ) -> Result<()> {
        if target == self.layout {
            return Ok(());
        }
        if target.rank() <= self.layout.rank() {
            return Err(Error::InvalidState(format!(
                "non-monotonic layout transition {:?} -> {:?}",
                self.layout, target
            )));
        }
        commands.transition_image(&self.image, self.layout, target)?;
        self.layout = target;
        Ok(())
    }
}

#[cfg(test)]
#[path = "image_tests.rs"]
mod tests;
