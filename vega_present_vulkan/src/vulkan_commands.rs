/// Commands - Vulkan implementation of the CommandStream trait
///
/// Tracks in-flight GPU work as fence-backed epochs over a small ring of
/// command buffers. The swapchain synchronizes against this stream (epoch
/// waits, wait-idle, layout barriers); the renderer records into it and
/// submits through it.
use ash::vk;
use ash::vk::Handle;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use vega_present::vega::present::{CommandStream, ImageLayout, PresentableImage};
use vega_present::vega::{Error, Result};
use vega_present::vega_error;

use crate::vulkan_context::Context;
use crate::vulkan_image::{aspect_mask, layout_sync};

const SOURCE: &str = "vega::vulkan::Commands";

/// Number of submission batches that may be in flight at once.
const MAX_SUBMITS_IN_FLIGHT: usize = 2;

struct Slot {
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    /// Signaled by a flushed batch; the presentation engine waits on it.
    /// Safe to recycle because every requested signal is waited exactly
    /// once by the following present.
    finished: vk::Semaphore,
}

struct Inner {
    command_pool: vk::CommandPool,
    slots: Vec<Slot>,
    /// Submitted batches not yet observed as retired, oldest first
    pending: VecDeque<(u64, usize)>,
    /// Ring index the current batch records into
    slot: usize,
    recording: bool,
    current_epoch: u64,
    completed_epoch: u64,
}

/// Vulkan command stream
pub struct Commands {
    context: Arc<Context>,
    inner: Mutex<Inner>,
}

impl Commands {
    /// Create a command stream on the context's graphics queue.
    pub fn new(context: Arc<Context>) -> Result<Arc<Self>> {
        unsafe {
            let device = context.device();

            let pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(context.graphics_queue_family())
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let command_pool = device.create_command_pool(&pool_create_info, None).map_err(|e| {
                vega_error!(SOURCE, "Failed to create command pool: {:?}", e);
                Error::InitializationFailed(format!("Failed to create command pool: {:?}", e))
            })?;

            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(MAX_SUBMITS_IN_FLIGHT as u32);
            let command_buffers = device.allocate_command_buffers(&allocate_info).map_err(|e| {
                vega_error!(SOURCE, "Failed to allocate command buffers: {:?}", e);
                Error::InitializationFailed(format!("Failed to allocate command buffers: {:?}", e))
            })?;

            let fence_create_info = vk::FenceCreateInfo::default();
            let semaphore_create_info = vk::SemaphoreCreateInfo::default();
            let mut slots = Vec::with_capacity(MAX_SUBMITS_IN_FLIGHT);
            for command_buffer in command_buffers {
                let fence = device.create_fence(&fence_create_info, None).map_err(|e| {
                    vega_error!(SOURCE, "Failed to create submit fence: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create fence: {:?}", e))
                })?;
                let finished = device
                    .create_semaphore(&semaphore_create_info, None)
                    .map_err(|e| {
                        vega_error!(SOURCE, "Failed to create batch semaphore: {:?}", e);
                        Error::InitializationFailed(format!("Failed to create semaphore: {:?}", e))
                    })?;
                slots.push(Slot {
                    command_buffer,
                    fence,
                    finished,
                });
            }

            Ok(Arc::new(Self {
                context,
                inner: Mutex::new(Inner {
                    command_pool,
                    slots,
                    pending: VecDeque::new(),
                    slot: 0,
                    recording: false,
                    current_epoch: 1,
                    completed_epoch: 0,
                }),
            }))
        }
    }

    /// Record into the current batch.
    ///
    /// Begins the batch lazily; the closure gets the device and the live
    /// command buffer.
    pub fn record_with<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let mut inner = self.inner.lock().unwrap();
        let command_buffer = self.ensure_recording(&mut inner)?;
        f(self.context.device(), command_buffer);
        Ok(())
    }

    /// Submit the current batch and advance the epoch.
    ///
    /// `wait` pairs each semaphore with the pipeline stage that must block
    /// on it (the swapchain readiness signal gates the color attachment
    /// stage); `signal` semaphores fire when the batch completes (the
    /// surface's render-finished semaphore, so present can wait on it).
    /// Returns the submitted epoch. An empty batch is a valid sync point.
    pub fn submit(
        &self,
        wait: &[(vk::Semaphore, vk::PipelineStageFlags)],
        signal: &[vk::Semaphore],
    ) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let (epoch, _) = self.submit_locked(&mut inner, wait, signal, false)?;
        Ok(epoch)
    }

    fn submit_locked(
        &self,
        inner: &mut Inner,
        wait: &[(vk::Semaphore, vk::PipelineStageFlags)],
        signal: &[vk::Semaphore],
        signal_finished: bool,
    ) -> Result<(u64, vk::Semaphore)> {
        let command_buffer = self.ensure_recording(inner)?;
        let device = self.context.device();
        let slot = inner.slot;
        let fence = inner.slots[slot].fence;
        let finished = inner.slots[slot].finished;

        let wait_semaphores: Vec<vk::Semaphore> = wait.iter().map(|(s, _)| *s).collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = wait.iter().map(|(_, st)| *st).collect();
        let mut signal_semaphores: Vec<vk::Semaphore> = signal.to_vec();
        if signal_finished {
            signal_semaphores.push(finished);
        }
        let command_buffers = [command_buffer];

        unsafe {
            device.end_command_buffer(command_buffer).map_err(|e| {
                vega_error!(SOURCE, "Failed to end command buffer: {:?}", e);
                Error::BackendError(format!("Failed to end command buffer: {:?}", e))
            })?;

            let submit_info = vk::SubmitInfo::default()
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .command_buffers(&command_buffers)
                .signal_semaphores(&signal_semaphores);

            device
                .queue_submit(self.context.graphics_queue(), &[submit_info], fence)
                .map_err(|e| {
                    vega_error!(SOURCE, "Failed to submit command buffer: {:?}", e);
                    Error::BackendError(format!("Failed to submit command buffer: {:?}", e))
                })?;
        }

        let epoch = inner.current_epoch;
        inner.pending.push_back((epoch, slot));
        inner.current_epoch += 1;
        inner.slot = (slot + 1) % inner.slots.len();
        inner.recording = false;
        Ok((epoch, finished))
    }

    /// Begin the current batch if nothing is recording yet.
    fn ensure_recording(&self, inner: &mut Inner) -> Result<vk::CommandBuffer> {
        let slot = inner.slot;
        let command_buffer = inner.slots[slot].command_buffer;
        if inner.recording {
            return Ok(command_buffer);
        }

        // The ring wraps onto a slot whose previous submission may still be
        // in flight; its fence gates the buffer reset.
        if let Some(&(epoch, _)) = inner.pending.iter().find(|&&(_, s)| s == slot) {
            self.wait_through(inner, epoch)?;
        }

        let device = self.context.device();
        unsafe {
            device
                .reset_fences(&[inner.slots[slot].fence])
                .map_err(|e| Error::BackendError(format!("Failed to reset fence: {:?}", e)))?;
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| {
                    Error::BackendError(format!("Failed to reset command buffer: {:?}", e))
                })?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(command_buffer, &begin_info).map_err(|e| {
                Error::BackendError(format!("Failed to begin command buffer: {:?}", e))
            })?;
        }

        inner.recording = true;
        Ok(command_buffer)
    }

    /// Update completed_epoch from fence status without blocking.
    fn poll(&self, inner: &mut Inner) {
        let device = self.context.device();
        while let Some(&(epoch, slot)) = inner.pending.front() {
            let signaled = unsafe {
                device
                    .get_fence_status(inner.slots[slot].fence)
                    .unwrap_or(false)
            };
            if !signaled {
                break;
            }
            inner.completed_epoch = epoch;
            inner.pending.pop_front();
        }
    }

    /// Block until every pending batch up to and including `epoch` retires.
    fn wait_through(&self, inner: &mut Inner, epoch: u64) -> Result<()> {
        let device = self.context.device();
        while let Some(&(pending_epoch, slot)) = inner.pending.front() {
            if pending_epoch > epoch {
                break;
            }
            unsafe {
                device
                    .wait_for_fences(&[inner.slots[slot].fence], true, u64::MAX)
                    .map_err(|e| {
                        vega_error!(SOURCE, "Failed to wait for submit fence: {:?}", e);
                        Error::BackendError(format!("Failed to wait for fence: {:?}", e))
                    })?;
            }
            inner.completed_epoch = pending_epoch;
            inner.pending.pop_front();
        }
        Ok(())
    }
}

impl CommandStream for Commands {
    fn current_epoch(&self) -> u64 {
        self.inner.lock().unwrap().current_epoch
    }

    fn completed_epoch(&self) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        self.poll(&mut inner);
        inner.completed_epoch
    }

    fn wait_for_epoch(&self, epoch: u64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        self.poll(&mut inner);
        if epoch <= inner.completed_epoch {
            return Ok(());
        }
        // Waiting on the epoch still being recorded flushes it first.
        if epoch >= inner.current_epoch {
            self.submit_locked(&mut inner, &[], &[], false)?;
        }
        self.wait_through(&mut inner, epoch)
    }

    fn wait_idle(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.recording {
            self.submit_locked(&mut inner, &[], &[], false)?;
        }
        unsafe {
            self.context.device().device_wait_idle().map_err(|e| {
                vega_error!(SOURCE, "Failed to wait for device idle: {:?}", e);
                Error::BackendError(format!("Failed to wait for device idle: {:?}", e))
            })?;
        }
        inner.completed_epoch = inner.current_epoch - 1;
        inner.pending.clear();
        Ok(())
    }

    fn flush(&self, need_signal: bool) -> Result<(u64, u64)> {
        let mut inner = self.inner.lock().unwrap();
        let (epoch, finished) = self.submit_locked(&mut inner, &[], &[], need_signal)?;
        let raw = if need_signal { finished.as_raw() } else { 0 };
        Ok((epoch, raw))
    }

    fn transition_image(
        &self,
        image: &Arc<dyn PresentableImage>,
        from: ImageLayout,
        to: ImageLayout,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let command_buffer = self.ensure_recording(&mut inner)?;

        let (old_layout, src_access, src_stage) = layout_sync(from);
        let (new_layout, dst_access, dst_stage) = layout_sync(to);
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(vk::Image::from_raw(image.native_handle()))
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_mask(image.info().format),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(src_access)
            .dst_access_mask(dst_access);

        unsafe {
            self.context.device().cmd_pipeline_barrier(
                command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
        Ok(())
    }
}

impl Drop for Commands {
    fn drop(&mut self) {
        unsafe {
            let device = self.context.device();
            device.device_wait_idle().ok();

            let inner = self.inner.get_mut().unwrap();
            for slot in &inner.slots {
                device.destroy_fence(slot.fence, None);
                device.destroy_semaphore(slot.finished, None);
            }
            device.destroy_command_pool(inner.command_pool, None);
        }
    }
}
