//! Vulkan backend.
//!
//! Maps the RHI seams onto Vulkan 1.2 objects:
//!
//! - [`TimelineFence`] - a timeline semaphore, whose counter value is exactly
//!   the fence value the frame scheduler tags slots with
//! - [`VulkanQueue`] - a `VkQueue` whose submissions signal the timeline
//! - [`VulkanCommandAllocator`] - a command pool with one primary buffer per
//!   frame slot, reset wholesale when the slot is reused
//! - [`VulkanUploadMemory`] - a host-visible buffer allocated through
//!   gpu-allocator and mapped for its whole lifetime
//!
//! Instance, device and queue creation belong to the windowing/device layer;
//! these types borrow clones of the `ash::Device` it created. The device must
//! have the `timelineSemaphore` feature enabled.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use tracing::{debug, error};

use crate::buffer::MappedMemory;
use crate::command::{CommandAllocator, DrawIndexed, Queue};
use crate::error::{RhiError, RhiResult};
use crate::sync::Fence;

/// Timeline semaphore used as a CPU/GPU fence.
pub struct TimelineFence {
    device: ash::Device,
    semaphore: vk::Semaphore,
}

impl TimelineFence {
    /// Creates a timeline semaphore starting at `initial_value`.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: ash::Device, initial_value: u64) -> RhiResult<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

        let semaphore = unsafe { device.create_semaphore(&create_info, None) }
            .map_err(RhiError::from_vk)?;

        debug!("Created timeline fence (initial value {})", initial_value);

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Fence for TimelineFence {
    fn completed_value(&self) -> RhiResult<u64> {
        unsafe { self.device.get_semaphore_counter_value(self.semaphore) }
            .map_err(RhiError::from_vk)
    }

    fn wait_for_value(&self, value: u64, timeout: Option<Duration>) -> RhiResult<()> {
        if self.completed_value()? >= value {
            return Ok(());
        }

        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        let timeout_ns = timeout
            .map(|t| u64::try_from(t.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(u64::MAX);

        match unsafe { self.device.wait_semaphores(&wait_info, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(RhiError::Timeout {
                value,
                completed: self.completed_value()?,
            }),
            Err(e) => Err(RhiError::from_vk(e)),
        }
    }
}

impl Drop for TimelineFence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed timeline fence");
    }
}

/// A device queue that signals a timeline fence on every submission.
///
/// # Thread Safety
///
/// Vulkan requires external synchronization of queue submission; the queue
/// must only be submitted to through this wrapper.
pub struct VulkanQueue {
    device: ash::Device,
    queue: vk::Queue,
    fence: TimelineFence,
}

impl VulkanQueue {
    /// Wraps `queue` and creates its timeline fence.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeline semaphore cannot be created.
    pub fn new(device: ash::Device, queue: vk::Queue) -> RhiResult<Self> {
        let fence = TimelineFence::new(device.clone(), 0)?;
        Ok(Self {
            device,
            queue,
            fence,
        })
    }

    /// Returns the Vulkan queue handle.
    #[inline]
    pub fn handle(&self) -> vk::Queue {
        self.queue
    }
}

impl Queue for VulkanQueue {
    type Commands = vk::CommandBuffer;
    type Fence = TimelineFence;

    fn fence(&self) -> &TimelineFence {
        &self.fence
    }

    fn submit(&self, commands: vk::CommandBuffer, signal_value: u64) -> RhiResult<()> {
        let command_buffers = [commands];
        let signal_semaphores = [self.fence.handle()];
        let signal_values = [signal_value];

        let mut timeline_info =
            vk::TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&signal_values);
        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info);

        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info], vk::Fence::null())
        }
        .map_err(RhiError::from_vk)
    }
}

/// Records pipeline and descriptor bindings before a frame's draws.
///
/// The prologue must leave the index buffer bound. Vertex buffers and the
/// material binding are the [`DrawBinder`]'s job.
pub type RecordPrologue = Box<dyn Fn(&ash::Device, vk::CommandBuffer) + Send>;

/// Binds the vertex buffer for `draw.vertices` and selects
/// `draw.material_index` before the draw is recorded.
///
/// Only called when either differs from the previous draw in the frame.
pub type DrawBinder = Box<dyn Fn(&ash::Device, vk::CommandBuffer, &DrawIndexed) + Send>;

/// Whether `draw` reads different vertices or a different material than
/// `previous`.
fn needs_rebind(previous: Option<&DrawIndexed>, draw: &DrawIndexed) -> bool {
    previous.is_none_or(|p| p.vertices != draw.vertices || p.material_index != draw.material_index)
}

/// Command pool owning a single primary command buffer.
pub struct VulkanCommandAllocator {
    device: ash::Device,
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    prologue: Option<RecordPrologue>,
    binder: Option<DrawBinder>,
}

impl VulkanCommandAllocator {
    /// Creates a command pool for `queue_family_index` and allocates its
    /// primary command buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation or allocation fails.
    pub fn new(device: ash::Device, queue_family_index: u32) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(queue_family_index);
        let pool = unsafe { device.create_command_pool(&create_info, None) }
            .map_err(RhiError::from_vk)?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers,
            Err(e) => {
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(RhiError::from_vk(e));
            }
        };

        debug!("Created command allocator for queue family {}", queue_family_index);

        Ok(Self {
            device,
            pool,
            command_buffer: buffers[0],
            prologue: None,
            binder: None,
        })
    }

    /// Installs the callback recorded ahead of every frame's draws.
    pub fn with_prologue(mut self, prologue: RecordPrologue) -> Self {
        self.prologue = Some(prologue);
        self
    }

    /// Installs the callback that binds each draw's vertices and material.
    pub fn with_binder(mut self, binder: DrawBinder) -> Self {
        self.binder = Some(binder);
        self
    }
}

impl CommandAllocator for VulkanCommandAllocator {
    type Commands = vk::CommandBuffer;

    fn reset(&mut self) -> RhiResult<()> {
        unsafe {
            self.device
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())
        }
        .map_err(RhiError::from_vk)
    }

    /// Records one `vkCmdDrawIndexed` per draw.
    ///
    /// The object index is passed as the first instance so shaders can
    /// locate the draw's constants from the instance index. Without a binder
    /// every draw uses whatever the prologue bound.
    fn record(&mut self, draws: &[DrawIndexed]) -> RhiResult<vk::CommandBuffer> {
        let cmd = self.command_buffer;
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .begin_command_buffer(cmd, &begin_info)
                .map_err(RhiError::from_vk)?;

            if let Some(prologue) = &self.prologue {
                prologue(&self.device, cmd);
            }

            let mut previous = None;
            for draw in draws {
                if let Some(binder) = &self.binder
                    && needs_rebind(previous, draw)
                {
                    binder(&self.device, cmd, draw);
                }
                previous = Some(draw);

                self.device.cmd_draw_indexed(
                    cmd,
                    draw.index_count,
                    1,
                    draw.start_index,
                    draw.base_vertex,
                    draw.object_index,
                );
            }

            self.device
                .end_command_buffer(cmd)
                .map_err(RhiError::from_vk)?;
        }

        Ok(cmd)
    }
}

impl Drop for VulkanCommandAllocator {
    fn drop(&mut self) {
        unsafe {
            // Frees the command buffer along with the pool.
            self.device.destroy_command_pool(self.pool, None);
        }
        debug!("Destroyed command allocator");
    }
}

/// Persistently mapped host-visible buffer.
pub struct VulkanUploadMemory {
    device: ash::Device,
    allocator: Arc<Mutex<Allocator>>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: usize,
}

impl VulkanUploadMemory {
    /// Creates a `size`-byte buffer in `CpuToGpu` memory.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation, allocation or binding fails, or
    /// if the allocation is not host mapped.
    pub fn new(
        device: ash::Device,
        allocator: Arc<Mutex<Allocator>>,
        size: usize,
        usage: vk::BufferUsageFlags,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size as vk::DeviceSize)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer =
            unsafe { device.create_buffer(&buffer_info, None) }.map_err(RhiError::from_vk)?;
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let allocated = allocator
            .lock()
            .map_err(|_| RhiError::InvalidState("allocator mutex poisoned".to_string()))
            .and_then(|mut allocator| {
                allocator
                    .allocate(&AllocationCreateDesc {
                        name: "frame upload",
                        requirements,
                        location: MemoryLocation::CpuToGpu,
                        linear: true,
                        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                    })
                    .map_err(RhiError::from)
            });

        // From here on Drop releases whatever was created.
        let mut memory = Self {
            device,
            allocator,
            buffer,
            allocation: None,
            size,
        };
        let allocation = memory.allocation.insert(allocated?);
        let mapped = allocation.mapped_slice().is_some();

        unsafe {
            memory
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        }
        .map_err(RhiError::from_vk)?;

        if !mapped {
            return Err(RhiError::InvalidHandle(
                "Upload allocation is not host mapped".to_string(),
            ));
        }

        debug!("Created upload buffer: {} bytes", size);
        Ok(memory)
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }
}

impl MappedMemory for VulkanUploadMemory {
    fn bytes(&self) -> &[u8] {
        self.allocation
            .as_ref()
            .and_then(Allocation::mapped_slice)
            .map(|bytes| &bytes[..self.size])
            .unwrap_or(&[])
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        let size = self.size;
        self.allocation
            .as_mut()
            .and_then(Allocation::mapped_slice_mut)
            .map(|bytes| &mut bytes[..size])
            .unwrap_or(&mut [])
    }
}

impl Drop for VulkanUploadMemory {
    fn drop(&mut self) {
        // Free allocation first, then destroy buffer
        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self.allocator.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = allocator.free(allocation) {
                error!("Failed to free upload allocation: {:?}", e);
            }
        }

        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed upload buffer");
    }
}
