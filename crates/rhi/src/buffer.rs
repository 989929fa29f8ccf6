//! Persistently mapped upload buffers.
//!
//! This module handles the CPU side of per-frame GPU data:
//!
//! - [`MappedMemory`] is a byte region the CPU can write and the GPU can read
//!   without a staging copy (host memory for the soft backend, a `CpuToGpu`
//!   allocation for Vulkan).
//! - [`UploadBuffer`] views such a region as an array of `T`, each element at
//!   `index * stride`.
//!
//! Constant buffers pad every element to [`CONSTANT_BUFFER_ALIGNMENT`] so each
//! one can be bound individually; vertex buffers are tightly packed.
//!
//! # Example
//!
//! ```
//! use waves_rhi::buffer::{BufferKind, UploadBuffer};
//!
//! # fn example() -> Result<(), waves_rhi::RhiError> {
//! let mut constants = UploadBuffer::<[f32; 4]>::new_host(3, BufferKind::Constant)?;
//! constants.copy_data(2, &[1.0, 2.0, 3.0, 4.0]);
//!
//! assert_eq!(constants.stride(), 256);
//! assert_eq!(constants.read(2), [1.0, 2.0, 3.0, 4.0]);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use std::marker::PhantomData;

use bytemuck::Pod;
use tracing::debug;

use crate::error::{RhiError, RhiResult};

/// Required alignment of each constant buffer element.
pub const CONSTANT_BUFFER_ALIGNMENT: usize = 256;

/// Rounds `size` up to the constant buffer alignment.
#[inline]
pub const fn constant_buffer_byte_size(size: usize) -> usize {
    (size + CONSTANT_BUFFER_ALIGNMENT - 1) & !(CONSTANT_BUFFER_ALIGNMENT - 1)
}

/// How an upload buffer lays out its elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    /// Elements padded to [`CONSTANT_BUFFER_ALIGNMENT`].
    Constant,
    /// Elements tightly packed.
    Vertex,
}

impl BufferKind {
    /// Byte distance between consecutive elements of type `T`.
    pub const fn stride<T>(self) -> usize {
        match self {
            BufferKind::Constant => constant_buffer_byte_size(std::mem::size_of::<T>()),
            BufferKind::Vertex => std::mem::size_of::<T>(),
        }
    }

    /// Returns a human-readable name for the buffer kind.
    pub fn name(self) -> &'static str {
        match self {
            BufferKind::Constant => "constant",
            BufferKind::Vertex => "vertex",
        }
    }
}

/// A CPU-writable region the GPU reads directly.
pub trait MappedMemory {
    /// The mapped bytes.
    fn bytes(&self) -> &[u8];

    /// The mapped bytes, writable.
    fn bytes_mut(&mut self) -> &mut [u8];
}

/// Plain host memory, used by the soft backend and in tests.
#[derive(Clone, Debug)]
pub struct HostMemory {
    bytes: Box<[u8]>,
}

impl HostMemory {
    /// Allocates `size` zeroed bytes.
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0u8; size].into_boxed_slice(),
        }
    }
}

impl MappedMemory for HostMemory {
    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// A mapped region viewed as an array of `T`.
///
/// Writes are plain memory copies with no synchronization; the caller must
/// know the GPU is not reading the region (see the frame scheduler).
/// Indexing past [`element_count`](Self::element_count) panics.
pub struct UploadBuffer<T, M = HostMemory> {
    memory: M,
    element_count: usize,
    stride: usize,
    kind: BufferKind,
    _marker: PhantomData<T>,
}

impl<T: Pod> UploadBuffer<T, HostMemory> {
    /// Creates an upload buffer in host memory.
    ///
    /// # Errors
    ///
    /// Returns an error if `element_count` is 0.
    pub fn new_host(element_count: usize, kind: BufferKind) -> RhiResult<Self> {
        let memory = HostMemory::new(Self::required_size(element_count, kind));
        Self::new(memory, element_count, kind)
    }
}

impl<T: Pod, M: MappedMemory> UploadBuffer<T, M> {
    /// Bytes needed to hold `element_count` elements of this kind.
    pub fn required_size(element_count: usize, kind: BufferKind) -> usize {
        element_count * kind.stride::<T>()
    }

    /// Wraps `memory` as `element_count` elements.
    ///
    /// # Errors
    ///
    /// Returns an error if `element_count` is 0 or `memory` is too small.
    pub fn new(memory: M, element_count: usize, kind: BufferKind) -> RhiResult<Self> {
        if element_count == 0 {
            return Err(RhiError::InvalidHandle(
                "Upload buffer must hold at least one element".to_string(),
            ));
        }

        let required = Self::required_size(element_count, kind);
        let available = memory.bytes().len();
        if available < required {
            return Err(RhiError::InvalidHandle(format!(
                "Mapped region of {} bytes cannot hold {} {} elements ({} bytes)",
                available,
                element_count,
                kind.name(),
                required
            )));
        }

        debug!(
            "Created {} upload buffer: {} x {} bytes",
            kind.name(),
            element_count,
            kind.stride::<T>()
        );

        Ok(Self {
            memory,
            element_count,
            stride: kind.stride::<T>(),
            kind,
            _marker: PhantomData,
        })
    }

    /// Copies `value` into element `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= element_count()`.
    pub fn copy_data(&mut self, index: usize, value: &T) {
        assert!(
            index < self.element_count,
            "upload index {} out of range for {} elements",
            index,
            self.element_count
        );
        let offset = index * self.stride;
        let src = bytemuck::bytes_of(value);
        self.memory.bytes_mut()[offset..offset + src.len()].copy_from_slice(src);
    }

    /// Copies `values` into consecutive elements starting at `first`.
    ///
    /// # Panics
    ///
    /// Panics if the range exceeds `element_count()`.
    pub fn copy_slice(&mut self, first: usize, values: &[T]) {
        assert!(
            first + values.len() <= self.element_count,
            "upload range {}..{} out of range for {} elements",
            first,
            first + values.len(),
            self.element_count
        );
        match self.kind {
            BufferKind::Vertex => {
                let offset = first * self.stride;
                let src: &[u8] = bytemuck::cast_slice(values);
                self.memory.bytes_mut()[offset..offset + src.len()].copy_from_slice(src);
            }
            BufferKind::Constant => {
                for (i, value) in values.iter().enumerate() {
                    self.copy_data(first + i, value);
                }
            }
        }
    }

    /// Reads element `index` back from the mapped region.
    ///
    /// # Panics
    ///
    /// Panics if `index >= element_count()`.
    pub fn read(&self, index: usize) -> T {
        assert!(
            index < self.element_count,
            "upload index {} out of range for {} elements",
            index,
            self.element_count
        );
        let offset = index * self.stride;
        bytemuck::pod_read_unaligned(&self.memory.bytes()[offset..offset + std::mem::size_of::<T>()])
    }

    /// Byte offset of element `index`, as bound by the GPU.
    #[inline]
    pub fn offset_of(&self, index: usize) -> usize {
        index * self.stride
    }

    #[inline]
    pub fn element_count(&self) -> usize {
        self.element_count
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Total bytes covered by the elements.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.element_count * self.stride
    }

    /// The backing memory.
    pub fn memory(&self) -> &M {
        &self.memory
    }
}
