//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
///
/// Every variant is fatal for the frame loop: a failed wait or a lost device
/// invalidates all outstanding GPU state at once, so callers propagate these
/// rather than retrying.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// The device stopped executing work
    #[error("Device lost: {0}")]
    DeviceLost(String),

    /// A fence wait exceeded its timeout
    #[error("Timed out waiting for fence value {value} (completed {completed})")]
    Timeout {
        /// Value that was waited for.
        value: u64,
        /// Value the fence had reached when the wait gave up.
        completed: u64,
    },

    /// The OS wait primitive failed
    #[error("Wait failed: {0}")]
    WaitFailed(String),

    /// An operation was issued out of order
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid handle or resource description
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

impl RhiError {
    /// Maps a Vulkan result, singling out device loss.
    pub fn from_vk(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => {
                RhiError::DeviceLost("VK_ERROR_DEVICE_LOST".to_string())
            }
            other => RhiError::VulkanError(other),
        }
    }

    /// Whether the error means the device can no longer be used.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, RhiError::DeviceLost(_))
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
