//! Render hardware interface for frames-in-flight scheduling.
//!
//! This crate defines the narrow seams the frame scheduler needs from a GPU
//! and provides two implementations of them:
//! - [`sync::Fence`] - a monotonically increasing completion counter
//! - [`command::Queue`] - FIFO submission that signals a fence value
//! - [`command::CommandAllocator`] - per-frame command recording
//! - [`buffer::UploadBuffer`] - persistently mapped, element-strided uploads
//!
//! The [`soft`] backend emulates an asynchronous queue on a worker thread and
//! needs no GPU. The [`vulkan`] backend maps the same seams onto timeline
//! semaphores, command pools and `gpu-allocator` allocations.

mod error;

pub mod buffer;
pub mod command;
pub mod soft;
pub mod sync;
pub mod vulkan;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
