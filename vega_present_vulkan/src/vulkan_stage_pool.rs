/// StagePool - recycled host-visible staging buffers
///
/// Readback (screenshot/capture) and upload paths borrow a staging buffer
/// sized to the transfer, then hand it back tagged with the epoch of the
/// submission that used it. Buffers are bucketed by rounded-up size and
/// reused once their epoch retires, so steady-state capture allocates
/// nothing.
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};

use vega_present::vega::{Error, Result};
use vega_present::vega_error;

use crate::vulkan_context::Context;

const SOURCE: &str = "vega::vulkan::StagePool";

/// One host-visible staging buffer
pub struct StageBuffer {
    pub(crate) buffer: vk::Buffer,
    allocation: Option<Allocation>,
    /// Bucketed capacity, not the requested size
    capacity: u64,
}

impl StageBuffer {
    /// Raw Vulkan buffer handle
    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    /// Mapped host memory of the buffer
    pub fn mapped(&self) -> Result<&[u8]> {
        self.allocation
            .as_ref()
            .and_then(|a| a.mapped_slice())
            .ok_or_else(|| Error::BackendError("staging buffer is not host-visible".to_string()))
    }
}

struct Inner {
    /// Free buffers keyed by bucketed capacity
    free: FxHashMap<u64, Vec<StageBuffer>>,
    /// Buffers still referenced by in-flight submissions
    in_flight: Vec<(u64, StageBuffer)>,
}

/// Recycling pool of host-visible staging buffers
pub struct StagePool {
    context: Arc<Context>,
    inner: Mutex<Inner>,
}

impl StagePool {
    pub fn new(context: Arc<Context>) -> Arc<Self> {
        Arc::new(Self {
            context,
            inner: Mutex::new(Inner {
                free: FxHashMap::default(),
                in_flight: Vec::new(),
            }),
        })
    }

    /// Borrow a buffer with at least `size` bytes of capacity.
    pub fn acquire(&self, size: u64) -> Result<StageBuffer> {
        let capacity = size.max(64).next_power_of_two();

        if let Some(buffer) = self
            .inner
            .lock()
            .unwrap()
            .free
            .get_mut(&capacity)
            .and_then(Vec::pop)
        {
            return Ok(buffer);
        }

        unsafe {
            let device = self.context.device();
            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(capacity)
                .usage(vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::TRANSFER_SRC)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            let buffer = device
                .create_buffer(&buffer_create_info, None)
                .map_err(|e| Error::BackendError(format!("Failed to create buffer: {:?}", e)))?;

            let requirements = device.get_buffer_memory_requirements(buffer);
            let allocator = self.context.allocator();
            let allocation = allocator
                .lock()
                .unwrap()
                .allocate(&gpu_allocator::vulkan::AllocationCreateDesc {
                    name: "staging buffer",
                    requirements,
                    location: gpu_allocator::MemoryLocation::GpuToCpu,
                    linear: true,
                    allocation_scheme: gpu_allocator::vulkan::AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|_e| {
                    vega_error!(
                        SOURCE,
                        "Out of memory for staging buffer ({} bytes)",
                        capacity
                    );
                    device.destroy_buffer(buffer, None);
                    Error::OutOfMemory
                })?;

            device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .map_err(|e| {
                    Error::BackendError(format!("Failed to bind buffer memory: {:?}", e))
                })?;

            Ok(StageBuffer {
                buffer,
                allocation: Some(allocation),
                capacity,
            })
        }
    }

    /// Return a buffer whose last use was submitted under `epoch`.
    pub fn recycle(&self, buffer: StageBuffer, epoch: u64) {
        self.inner.lock().unwrap().in_flight.push((epoch, buffer));
    }

    /// Move buffers whose submissions retired back into the free lists.
    pub fn gc(&self, completed_epoch: u64) {
        let mut inner = self.inner.lock().unwrap();
        let mut index = 0;
        while index < inner.in_flight.len() {
            if inner.in_flight[index].0 <= completed_epoch {
                let (_, buffer) = inner.in_flight.swap_remove(index);
                inner.free.entry(buffer.capacity).or_default().push(buffer);
            } else {
                index += 1;
            }
        }
    }

    fn destroy_buffer(&self, mut buffer: StageBuffer) {
        unsafe {
            if let Some(allocation) = buffer.allocation.take() {
                self.context.allocator().lock().unwrap().free(allocation).ok();
            }
            self.context.device().destroy_buffer(buffer.buffer, None);
        }
    }
}

impl Drop for StagePool {
    fn drop(&mut self) {
        let inner = std::mem::replace(
            self.inner.get_mut().unwrap(),
            Inner {
                free: FxHashMap::default(),
                in_flight: Vec::new(),
            },
        );
        for (_, buffers) in inner.free {
            for buffer in buffers {
                self.destroy_buffer(buffer);
            }
        }
        for (_, buffer) in inner.in_flight {
            self.destroy_buffer(buffer);
        }
    }
}
