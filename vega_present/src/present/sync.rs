//! ReadySignal - single-use readiness token for the acquired image.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::present::GpuSignal;

/// Signal with no backend payload; used by headless rings, which gate image
/// reuse on the CPU instead.
pub(crate) struct NoopSignal;

impl GpuSignal for NoopSignal {
    fn raw(&self) -> u64 {
        0
    }
}

/// Single-use synchronization token gating GPU writes to a newly acquired
/// image.
///
/// Re-armed at every acquire, consumed exactly once by the caller (who
/// injects the GPU-side wait), and invalid to consume again until the next
/// acquire.
pub struct ReadySignal {
    signal: Arc<dyn GpuSignal>,
    consumed: bool,
}

impl ReadySignal {
    pub(crate) fn new(signal: Arc<dyn GpuSignal>) -> Self {
        Self {
            signal,
            consumed: false,
        }
    }

    /// Re-arm for a new acquire.
    pub(crate) fn rearm(&mut self) {
        self.consumed = false;
    }

    /// Swap in a freshly created backend signal (rebuild path) and re-arm.
    pub(crate) fn replace(&mut self, signal: Arc<dyn GpuSignal>) {
        self.signal = signal;
        self.consumed = false;
    }

    /// Borrow the backend signal without consuming (platform acquire arms it).
    pub(crate) fn backend(&self) -> &dyn GpuSignal {
        self.signal.as_ref()
    }

    /// Hand the signal to the caller, marking it consumed.
    pub(crate) fn consume(&mut self) -> Result<Arc<dyn GpuSignal>> {
        if self.consumed {
            return Err(Error::InvalidState(
                "readiness signal already consumed for this frame".to_string(),
            ));
        }
        self.consumed = true;
        Ok(Arc::clone(&self.signal))
    }

    /// True once the caller has taken the signal for this frame.
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
