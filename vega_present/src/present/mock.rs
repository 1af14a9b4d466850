//! Mock backend for unit tests (no GPU required)
//!
//! Scripted implementations of the backend seams so the full
//! acquire/present/rebuild contract can be exercised without a GPU or a
//! window. Tests drive platform behavior by mutating the shared
//! [`SurfaceState`] and advancing epochs on the [`MockCommandStream`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::present::{
    AcquireStatus, CommandStream, Extent, GpuSignal, ImageFormat, ImageInfo, ImageLayout,
    PresentDevice, PresentStatus, PresentSurface, PresentableImage, SurfaceConfig,
};

// ============================================================================
// Mock image & signal
// ============================================================================

pub struct MockImage {
    pub id: u64,
    info: ImageInfo,
}

impl MockImage {
    pub fn new(id: u64, extent: Extent, format: ImageFormat) -> Self {
        Self {
            id,
            info: ImageInfo { extent, format },
        }
    }
}

impl PresentableImage for MockImage {
    fn info(&self) -> &ImageInfo {
        &self.info
    }

    fn native_handle(&self) -> u64 {
        self.id
    }
}

pub struct MockSignal {
    raw: u64,
}

impl GpuSignal for MockSignal {
    fn raw(&self) -> u64 {
        self.raw
    }
}

// ============================================================================
// Mock device
// ============================================================================

pub struct MockDevice {
    next_image_id: AtomicU64,
    next_signal_raw: AtomicU64,
    /// When set, image creation fails with OutOfMemory.
    pub fail_image_creation: Mutex<bool>,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_image_id: AtomicU64::new(1),
            next_signal_raw: AtomicU64::new(1),
            fail_image_creation: Mutex::new(false),
        })
    }

    fn next_image(&self, extent: Extent, format: ImageFormat) -> Result<Arc<dyn PresentableImage>> {
        if *self.fail_image_creation.lock().unwrap() {
            return Err(Error::OutOfMemory);
        }
        let id = self.next_image_id.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MockImage::new(id, extent, format)))
    }
}

impl PresentDevice for MockDevice {
    fn create_color_image(
        &self,
        extent: Extent,
        format: ImageFormat,
    ) -> Result<Arc<dyn PresentableImage>> {
        self.next_image(extent, format)
    }

    fn create_depth_image(&self, extent: Extent) -> Result<Arc<dyn PresentableImage>> {
        self.next_image(extent, ImageFormat::D32_FLOAT)
    }

    fn create_signal(&self) -> Result<Arc<dyn GpuSignal>> {
        let raw = self.next_signal_raw.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MockSignal { raw }))
    }
}

// ============================================================================
// Mock command stream
// ============================================================================

pub struct MockCommandStream {
    current: AtomicU64,
    completed: AtomicU64,
    /// Every wait_for_epoch call, in order
    pub epoch_waits: Mutex<Vec<u64>>,
    /// Number of wait_idle calls
    pub idle_waits: AtomicU64,
    /// Number of flush calls
    pub flushes: AtomicU64,
    /// Recorded transitions as (native_handle, from, to)
    pub transitions: Mutex<Vec<(u64, ImageLayout, ImageLayout)>>,
}

impl MockCommandStream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            current: AtomicU64::new(1),
            completed: AtomicU64::new(0),
            epoch_waits: Mutex::new(Vec::new()),
            idle_waits: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            transitions: Mutex::new(Vec::new()),
        })
    }

    /// Pretend a submission batch was handed to the GPU.
    pub fn submit(&self) {
        self.current.fetch_add(1, Ordering::Relaxed);
    }

    /// Pretend all GPU work up to and including `epoch` retired.
    pub fn retire(&self, epoch: u64) {
        self.completed.fetch_max(epoch, Ordering::Relaxed);
    }
}

impl CommandStream for MockCommandStream {
    fn current_epoch(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    fn completed_epoch(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    fn wait_for_epoch(&self, epoch: u64) -> Result<()> {
        self.epoch_waits.lock().unwrap().push(epoch);
        // The "wait" succeeds instantly in tests.
        self.completed.fetch_max(epoch, Ordering::Relaxed);
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        self.idle_waits.fetch_add(1, Ordering::Relaxed);
        self.completed
            .store(self.current.load(Ordering::Relaxed), Ordering::Relaxed);
        Ok(())
    }

    fn flush(&self, need_signal: bool) -> Result<(u64, u64)> {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        let epoch = self.current.fetch_add(1, Ordering::Relaxed);
        // Synthetic "batch finished" handle, distinct per flush.
        let signal = if need_signal { 0x9000 + epoch } else { 0 };
        Ok((epoch, signal))
    }

    fn transition_image(
        &self,
        image: &Arc<dyn PresentableImage>,
        from: ImageLayout,
        to: ImageLayout,
    ) -> Result<()> {
        self.transitions
            .lock()
            .unwrap()
            .push((image.native_handle(), from, to));
        Ok(())
    }
}

// ============================================================================
// Mock surface
// ============================================================================

/// Shared, scriptable platform state. Tests keep a clone of the
/// `Arc<Mutex<SurfaceState>>` and mutate it between frames.
pub struct SurfaceState {
    pub extent: Extent,
    pub image_count: usize,
    pub format: ImageFormat,
    /// Scripted acquire outcomes; an empty queue falls back to round-robin
    /// Ready indices
    pub acquire_results: VecDeque<AcquireStatus>,
    /// Scripted present outcomes; empty falls back to Presented
    pub present_results: VecDeque<PresentStatus>,
    /// When set, configure reports an empty image set
    pub produce_no_images: bool,
    pub configure_calls: u32,
    pub acquire_calls: u32,
    pub present_calls: u32,
    /// Raw handles of the signals armed by acquire, in order
    pub armed_signals: Vec<u64>,
    /// Wait handles passed to present, in order
    pub present_waits: Vec<u64>,
    next_image_id: u64,
    rotation: u32,
}

impl SurfaceState {
    fn new(extent: Extent, image_count: usize) -> Self {
        Self {
            extent,
            image_count,
            format: ImageFormat::B8G8R8A8_SRGB,
            acquire_results: VecDeque::new(),
            present_results: VecDeque::new(),
            produce_no_images: false,
            configure_calls: 0,
            acquire_calls: 0,
            present_calls: 0,
            armed_signals: Vec::new(),
            present_waits: Vec::new(),
            // Mock swap images get ids from a high range so they never
            // collide with MockDevice ids.
            next_image_id: 1000,
            rotation: 0,
        }
    }
}

pub struct MockSurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl MockSurface {
    pub fn new(extent: Extent, image_count: usize) -> (Self, Arc<Mutex<SurfaceState>>) {
        let state = Arc::new(Mutex::new(SurfaceState::new(extent, image_count)));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl PresentSurface for MockSurface {
    fn configure(&mut self, _requested: Extent) -> Result<SurfaceConfig> {
        let mut state = self.state.lock().unwrap();
        state.configure_calls += 1;
        state.rotation = 0;

        let images: Vec<Arc<dyn PresentableImage>> = if state.produce_no_images {
            Vec::new()
        } else {
            (0..state.image_count)
                .map(|_| {
                    state.next_image_id += 1;
                    Arc::new(MockImage::new(state.next_image_id, state.extent, state.format))
                        as Arc<dyn PresentableImage>
                })
                .collect()
        };

        Ok(SurfaceConfig {
            extent: state.extent,
            format: state.format,
            start_index: 0,
            images,
        })
    }

    fn current_extent(&mut self) -> Result<Extent> {
        Ok(self.state.lock().unwrap().extent)
    }

    fn acquire_image(&mut self, signal: &dyn GpuSignal) -> Result<AcquireStatus> {
        let mut state = self.state.lock().unwrap();
        state.acquire_calls += 1;
        state.armed_signals.push(signal.raw());
        if let Some(scripted) = state.acquire_results.pop_front() {
            return Ok(scripted);
        }
        let index = state.rotation;
        state.rotation = (state.rotation + 1) % state.image_count as u32;
        Ok(AcquireStatus::Ready(index))
    }

    fn present_image(&mut self, _index: u32, wait_signal: u64) -> Result<PresentStatus> {
        let mut state = self.state.lock().unwrap();
        state.present_calls += 1;
        state.present_waits.push(wait_signal);
        Ok(state
            .present_results
            .pop_front()
            .unwrap_or(PresentStatus::Presented))
    }
}
