//! Error types for the Vega presentation core
//!
//! One taxonomy covers the whole layer: fatal conditions (surface lost,
//! allocator exhaustion, construction failure) that leave the swapchain
//! inert, and fail-fast misuse errors that indicate a logic bug in the
//! caller. Transient platform conditions (out-of-date, suboptimal) are
//! handled internally and never appear here.

use std::fmt;

/// Result type for presentation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Presentation layer errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (Vulkan, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Initialization failed (context, surface, swap resources)
    InitializationFailed(String),

    /// The platform surface is gone. No rebuild is possible without a new
    /// native handle; the swapchain becomes defunct.
    SurfaceLost(String),

    /// Caller misuse: present without acquire, accessors before the first
    /// acquire, double-consuming the readiness signal, stale target handles.
    InvalidState(String),
}

impl Error {
    /// True for conditions the caller cannot recover from without
    /// reconstructing the swapchain from a new native handle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::OutOfMemory | Error::SurfaceLost(_) | Error::InitializationFailed(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::SurfaceLost(msg) => write!(f, "Surface lost: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Log an ERROR and produce a `BackendError` with the same message.
///
/// # Example
///
/// ```no_run
/// # use vega_present::vega_err;
/// let err = vega_err!("vega::vulkan", "queue submit failed: {}", 3);
/// ```
#[macro_export]
macro_rules! vega_err {
    ($source:expr, $($arg:tt)*) => {{
        $crate::vega_error!($source, $($arg)*);
        $crate::vega::Error::BackendError(format!($($arg)*))
    }};
}

/// Log an ERROR and return early with a `BackendError`.
#[macro_export]
macro_rules! vega_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::vega_err!($source, $($arg)*))
    };
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
