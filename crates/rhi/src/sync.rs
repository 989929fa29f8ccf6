//! CPU/GPU synchronization.
//!
//! A [`Fence`] is a 64-bit counter that only ever increases. Every queue
//! submission asks the queue to raise the counter to a new value once the
//! submitted work is complete; the CPU learns that a piece of work finished by
//! comparing the counter against the value that work was tagged with.
//!
//! - [`Fence`] - the trait the frame scheduler waits on
//! - [`CpuFence`] - a host implementation built on a mutex and a condition
//!   variable, signaled by the soft queue's worker thread or directly by tests
//!
//! The Vulkan implementation lives in [`crate::vulkan::TimelineFence`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//! use waves_rhi::sync::{CpuFence, Fence};
//!
//! # fn example() -> Result<(), waves_rhi::RhiError> {
//! let fence = Arc::new(CpuFence::new());
//!
//! let gpu = {
//!     let fence = fence.clone();
//!     thread::spawn(move || fence.signal(1))
//! };
//!
//! // Blocks until the other thread has signaled 1.
//! fence.wait_for_value(1, None)?;
//! assert!(fence.completed_value()? >= 1);
//! # gpu.join().unwrap();
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{error, trace};

use crate::error::{RhiError, RhiResult};

/// A monotonically increasing completion counter shared by CPU and GPU.
pub trait Fence: Send + Sync {
    /// Returns the highest value the GPU has reported complete.
    fn completed_value(&self) -> RhiResult<u64>;

    /// Blocks until the completed value is at least `value`.
    ///
    /// Returns immediately if that is already the case. `None` waits without
    /// bound.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Timeout`] if `timeout` elapses first,
    /// [`RhiError::DeviceLost`] if the device stops executing work while
    /// waiting, or [`RhiError::WaitFailed`] if the wait primitive itself
    /// fails.
    fn wait_for_value(&self, value: u64, timeout: Option<Duration>) -> RhiResult<()>;

    /// Whether work tagged with `value` has completed.
    fn is_complete(&self, value: u64) -> RhiResult<bool> {
        Ok(self.completed_value()? >= value)
    }
}

#[derive(Debug, Default)]
struct FenceState {
    completed: u64,
    lost: Option<String>,
}

/// Host-side fence.
///
/// # Thread Safety
///
/// Any number of threads may wait while another signals. Signals lower than
/// the current value are ignored so the counter never moves backwards.
#[derive(Debug, Default)]
pub struct CpuFence {
    state: Mutex<FenceState>,
    signaled: Condvar,
}

impl CpuFence {
    /// Creates a fence whose completed value is 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the completed value to `value` and wakes all waiters.
    pub fn signal(&self, value: u64) {
        let mut state = self.lock_for_signal();
        if value > state.completed {
            state.completed = value;
            trace!("Fence signaled to {}", value);
        }
        drop(state);
        self.signaled.notify_all();
    }

    /// Marks the fence as belonging to a lost device.
    ///
    /// Pending and future waits for values that have not completed fail with
    /// [`RhiError::DeviceLost`].
    pub fn lose_device(&self, reason: impl Into<String>) {
        let reason = reason.into();
        error!("Device lost: {}", reason);
        let mut state = self.lock_for_signal();
        state.lost = Some(reason);
        drop(state);
        self.signaled.notify_all();
    }

    /// Whether [`lose_device`](Self::lose_device) has been called.
    pub fn is_lost(&self) -> bool {
        self.lock_for_signal().lost.is_some()
    }

    fn lock(&self) -> RhiResult<MutexGuard<'_, FenceState>> {
        self.state
            .lock()
            .map_err(|_| RhiError::WaitFailed("fence mutex poisoned".to_string()))
    }

    // Signaling must not fail; a poisoned counter is still a valid counter.
    fn lock_for_signal(&self) -> MutexGuard<'_, FenceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Fence for CpuFence {
    fn completed_value(&self) -> RhiResult<u64> {
        Ok(self.lock()?.completed)
    }

    fn wait_for_value(&self, value: u64, timeout: Option<Duration>) -> RhiResult<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock()?;

        loop {
            if state.completed >= value {
                return Ok(());
            }
            if let Some(reason) = &state.lost {
                return Err(RhiError::DeviceLost(reason.clone()));
            }

            state = match deadline {
                None => self
                    .signaled
                    .wait(state)
                    .map_err(|_| RhiError::WaitFailed("fence mutex poisoned".to_string()))?,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(RhiError::Timeout {
                            value,
                            completed: state.completed,
                        });
                    }
                    let (state, _) = self
                        .signaled
                        .wait_timeout(state, deadline - now)
                        .map_err(|_| RhiError::WaitFailed("fence mutex poisoned".to_string()))?;
                    state
                }
            };
        }
    }
}
