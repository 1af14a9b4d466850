/*!
# Vega Presentation Core

Backend-agnostic presentation layer for the Vega renderer.

This crate owns the swapchain abstraction that bridges a graphics backend's
command-submission pipeline with the presentation surface of a windowing
system, or with an off-screen image ring when no surface exists. Backend
implementations (Vulkan today) plug in through trait seams and are selected
at construction time.

## Architecture

- **Swapchain**: composed acquire/present state machine over a headless or
  surface-backed image ring
- **SwapImage**: one presentable image plus its layout-transition bookkeeping
- **PresentSurface**: platform presentation boundary (implemented per backend)
- **PresentDevice**: backend image/signal factory
- **CommandStream**: opaque handle to the backend's in-flight submissions

Backend crates provide concrete types that implement these traits.
*/

// Internal modules
mod error;
pub mod log;
pub mod present;

// Main vega namespace module
pub mod vega {
    // Error types
    pub use crate::error::{Error, Result};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{DefaultLogger, Log, LogEntry, LogSeverity, Logger};
        // Note: vega_* macros are NOT re-exported here - they are exported at the crate root
    }

    // Presentation sub-module with all swapchain types
    pub mod present {
        pub use crate::present::*;
    }
}
