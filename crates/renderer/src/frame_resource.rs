//! Per-frame resources.
//!
//! A [`FrameSlot`] bundles everything the CPU writes for one frame and the GPU
//! later reads while executing it:
//!
//! - A command allocator for recording the frame's commands
//! - Upload buffers for pass, object and material constants
//! - Optionally, a dynamic vertex buffer for the wave surface
//! - The fence value of the last submission that used the slot
//!
//! Slots are owned by a [`FrameScheduler`](crate::FrameScheduler), which only
//! hands one out after the GPU has finished with its previous contents.
//!
//! # Ownership
//!
//! ```text
//! acquire_slot ──> CPU writes ──> submit_and_tag ──> GPU reads ──> fence >= tag
//!      ^                                                              │
//!      └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! At any moment a slot belongs either to the CPU or to the GPU, never both.

use tracing::debug;

use waves_rhi::RhiResult;
use waves_rhi::buffer::{BufferKind, HostMemory, MappedMemory, UploadBuffer};
use waves_sim::WaveVertex;

use crate::constants::{MaterialConstants, ObjectConstants, PassConstants};

/// Element counts for each of a slot's buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotLayout {
    pub pass_count: usize,
    pub object_count: usize,
    pub material_count: usize,
    /// Vertices in the dynamic wave buffer; 0 means no such buffer.
    pub wave_vertex_count: usize,
}

impl SlotLayout {
    /// Bytes the slot's upload buffers occupy in total.
    pub fn byte_size(&self) -> usize {
        UploadBuffer::<PassConstants, HostMemory>::required_size(
            self.pass_count,
            BufferKind::Constant,
        ) + UploadBuffer::<ObjectConstants, HostMemory>::required_size(
            self.object_count,
            BufferKind::Constant,
        ) + UploadBuffer::<MaterialConstants, HostMemory>::required_size(
            self.material_count,
            BufferKind::Constant,
        ) + UploadBuffer::<WaveVertex, HostMemory>::required_size(
            self.wave_vertex_count,
            BufferKind::Vertex,
        )
    }
}

/// Write access to the acquired frame slot.
///
/// Scenes receive the slot through this object-safe trait so they stay
/// independent of the backend's allocator and memory types.
///
/// Every write panics if its index is outside the slot's layout.
pub trait SlotWriter {
    /// Position of the slot in the scheduler's ring.
    fn slot_index(&self) -> usize;

    fn write_pass(&mut self, index: usize, constants: &PassConstants);

    fn write_object(&mut self, index: usize, constants: &ObjectConstants);

    fn write_material(&mut self, index: usize, constants: &MaterialConstants);

    /// Replaces the dynamic wave vertices starting at vertex 0.
    fn write_wave_vertices(&mut self, vertices: &[WaveVertex]);
}

/// Resources for one frame in flight.
pub struct FrameSlot<A, M = HostMemory> {
    index: usize,
    allocator: A,
    /// Fence value of the last submission using this slot; 0 if never submitted.
    fence_value: u64,
    pass_constants: UploadBuffer<PassConstants, M>,
    object_constants: UploadBuffer<ObjectConstants, M>,
    material_constants: UploadBuffer<MaterialConstants, M>,
    wave_vertices: Option<UploadBuffer<WaveVertex, M>>,
}

impl<A> FrameSlot<A, HostMemory> {
    /// Creates a slot whose buffers live in host memory.
    ///
    /// # Errors
    ///
    /// Returns an error if any constant count in `layout` is 0.
    pub fn new_host(index: usize, allocator: A, layout: &SlotLayout) -> RhiResult<Self> {
        Self::new(index, allocator, layout, |_, size| Ok(HostMemory::new(size)))
    }

    /// Creates `count` host slots, calling `allocator(index)` for each
    /// slot's command allocator.
    pub fn host_ring(
        count: usize,
        layout: &SlotLayout,
        mut allocator: impl FnMut(usize) -> A,
    ) -> RhiResult<Vec<Self>> {
        (0..count)
            .map(|index| Self::new_host(index, allocator(index), layout))
            .collect()
    }
}

impl<A, M: MappedMemory> FrameSlot<A, M> {
    /// Creates a slot, calling `allocate(kind, bytes)` for each buffer.
    ///
    /// # Arguments
    ///
    /// * `index` - Position of the slot in the ring
    /// * `allocator` - The slot's exclusive command allocator
    /// * `layout` - Element counts of each buffer
    /// * `allocate` - Produces mapped memory of at least the given size
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails or any constant count is 0.
    pub fn new(
        index: usize,
        allocator: A,
        layout: &SlotLayout,
        mut allocate: impl FnMut(BufferKind, usize) -> RhiResult<M>,
    ) -> RhiResult<Self> {
        let pass_constants = upload(&mut allocate, layout.pass_count, BufferKind::Constant)?;
        let object_constants = upload(&mut allocate, layout.object_count, BufferKind::Constant)?;
        let material_constants =
            upload(&mut allocate, layout.material_count, BufferKind::Constant)?;
        let wave_vertices = if layout.wave_vertex_count > 0 {
            Some(upload(
                &mut allocate,
                layout.wave_vertex_count,
                BufferKind::Vertex,
            )?)
        } else {
            None
        };

        debug!(
            "Created frame slot {} ({} bytes of upload memory)",
            index,
            layout.byte_size()
        );

        Ok(Self {
            index,
            allocator,
            fence_value: 0,
            pass_constants,
            object_constants,
            material_constants,
            wave_vertices,
        })
    }

    /// Fence value of the last submission using this slot.
    ///
    /// 0 means the slot has never been submitted.
    #[inline]
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }

    pub(crate) fn set_fence_value(&mut self, value: u64) {
        self.fence_value = value;
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    #[inline]
    pub fn allocator_mut(&mut self) -> &mut A {
        &mut self.allocator
    }

    pub fn pass_constants(&self) -> &UploadBuffer<PassConstants, M> {
        &self.pass_constants
    }

    pub fn object_constants(&self) -> &UploadBuffer<ObjectConstants, M> {
        &self.object_constants
    }

    pub fn material_constants(&self) -> &UploadBuffer<MaterialConstants, M> {
        &self.material_constants
    }

    pub fn wave_vertices(&self) -> Option<&UploadBuffer<WaveVertex, M>> {
        self.wave_vertices.as_ref()
    }
}

fn upload<T: bytemuck::Pod, M: MappedMemory>(
    allocate: &mut impl FnMut(BufferKind, usize) -> RhiResult<M>,
    count: usize,
    kind: BufferKind,
) -> RhiResult<UploadBuffer<T, M>> {
    let memory = allocate(kind, UploadBuffer::<T, M>::required_size(count, kind))?;
    UploadBuffer::new(memory, count, kind)
}

impl<A, M: MappedMemory> SlotWriter for FrameSlot<A, M> {
    fn slot_index(&self) -> usize {
        self.index
    }

    fn write_pass(&mut self, index: usize, constants: &PassConstants) {
        self.pass_constants.copy_data(index, constants);
    }

    fn write_object(&mut self, index: usize, constants: &ObjectConstants) {
        self.object_constants.copy_data(index, constants);
    }

    fn write_material(&mut self, index: usize, constants: &MaterialConstants) {
        self.material_constants.copy_data(index, constants);
    }

    /// # Panics
    ///
    /// Panics if the slot has no wave vertex buffer or `vertices` is longer
    /// than it.
    fn write_wave_vertices(&mut self, vertices: &[WaveVertex]) {
        match &mut self.wave_vertices {
            Some(buffer) => buffer.copy_slice(0, vertices),
            None => panic!("frame slot {} has no wave vertex buffer", self.index),
        }
    }
}
