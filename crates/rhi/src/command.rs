//! Command recording and submission seams.
//!
//! This module defines the two traits a frame scheduler drives every frame:
//!
//! - [`CommandAllocator`] - owns the memory commands are recorded into. One
//!   allocator belongs to each frame slot and may only be reset once the GPU
//!   has finished the work last recorded from it.
//! - [`Queue`] - executes recorded commands in submission order and raises
//!   its [`Fence`] to a caller-chosen value when they complete.
//!
//! Draws are described backend-independently by [`DrawIndexed`].

use crate::error::RhiResult;
use crate::sync::Fence;

/// Where a draw reads its vertices from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexSource {
    /// A static, device-resident mesh identified by the scene.
    Static(u32),
    /// The acquired frame slot's dynamic vertex buffer.
    FrameDynamic,
}

/// An indexed draw of one render item.
///
/// `object_index` and `material_index` select elements of the frame slot's
/// object and material constant buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawIndexed {
    pub vertices: VertexSource,
    pub index_count: u32,
    pub start_index: u32,
    pub base_vertex: i32,
    pub object_index: u32,
    pub material_index: u32,
}

/// Per-frame command memory.
pub trait CommandAllocator {
    /// What [`record`](Self::record) produces for submission.
    type Commands;

    /// Releases everything recorded since the last reset.
    ///
    /// Must only be called once the GPU has finished executing commands
    /// recorded from this allocator.
    fn reset(&mut self) -> RhiResult<()>;

    /// Records a frame's draws.
    fn record(&mut self, draws: &[DrawIndexed]) -> RhiResult<Self::Commands>;
}

/// A FIFO submission queue with an attached timeline fence.
pub trait Queue {
    /// Recorded commands accepted by [`submit`](Self::submit).
    type Commands;
    /// Fence the queue signals as work completes.
    type Fence: Fence;

    /// The queue's completion fence.
    fn fence(&self) -> &Self::Fence;

    /// Submits `commands` and signals the fence to `signal_value` once they
    /// and everything submitted before them have completed.
    fn submit(&self, commands: Self::Commands, signal_value: u64) -> RhiResult<()>;
}
