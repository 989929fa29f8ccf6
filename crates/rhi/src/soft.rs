//! Software backend.
//!
//! [`SoftQueue`] runs submissions on a dedicated worker thread in FIFO order,
//! optionally sleeping for a fixed latency per submission to stand in for GPU
//! execution time, and then signals its [`CpuFence`]. From the frame
//! scheduler's point of view it behaves like a real asynchronous queue: the
//! CPU races ahead until it runs out of free frame slots.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use waves_rhi::command::{CommandAllocator, Queue};
//! use waves_rhi::soft::{SoftCommandAllocator, SoftQueue};
//! use waves_rhi::sync::Fence;
//!
//! # fn example() -> Result<(), waves_rhi::RhiError> {
//! let queue = SoftQueue::new(Duration::from_millis(1));
//! let mut allocator = SoftCommandAllocator::new(0);
//!
//! let commands = allocator.record(&[])?;
//! queue.submit(commands, 1)?;
//! queue.fence().wait_for_value(1, None)?;
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, trace};

use crate::command::{CommandAllocator, DrawIndexed, Queue};
use crate::error::{RhiError, RhiResult};
use crate::sync::CpuFence;

/// Commands recorded by a [`SoftCommandAllocator`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SoftCommandList {
    /// Allocator the list was recorded from.
    pub allocator: usize,
    /// Allocator reset count at recording time.
    pub epoch: u64,
    pub draws: Vec<DrawIndexed>,
}

/// Command allocator for the soft backend.
#[derive(Debug)]
pub struct SoftCommandAllocator {
    id: usize,
    epoch: u64,
    recorded: usize,
}

impl SoftCommandAllocator {
    /// Creates an allocator; `id` only labels its command lists.
    pub fn new(id: usize) -> Self {
        Self {
            id,
            epoch: 0,
            recorded: 0,
        }
    }

    /// Number of times the allocator has been reset.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Lists recorded since the last reset.
    pub fn recorded(&self) -> usize {
        self.recorded
    }
}

impl CommandAllocator for SoftCommandAllocator {
    type Commands = SoftCommandList;

    fn reset(&mut self) -> RhiResult<()> {
        self.epoch += 1;
        self.recorded = 0;
        Ok(())
    }

    fn record(&mut self, draws: &[DrawIndexed]) -> RhiResult<SoftCommandList> {
        self.recorded += 1;
        Ok(SoftCommandList {
            allocator: self.id,
            epoch: self.epoch,
            draws: draws.to_vec(),
        })
    }
}

struct Submission {
    commands: SoftCommandList,
    signal_value: u64,
}

/// Asynchronous queue executed by a worker thread.
///
/// Dropping the queue finishes all outstanding submissions before the worker
/// exits.
pub struct SoftQueue {
    sender: Option<Sender<Submission>>,
    worker: Option<JoinHandle<()>>,
    fence: Arc<CpuFence>,
    executed_draws: Arc<AtomicU64>,
}

impl SoftQueue {
    /// Starts a queue whose submissions each take `latency` to execute.
    pub fn new(latency: Duration) -> Self {
        let (sender, receiver) = mpsc::channel();
        let fence = Arc::new(CpuFence::new());
        let executed_draws = Arc::new(AtomicU64::new(0));

        let worker = {
            let fence = fence.clone();
            let executed_draws = executed_draws.clone();
            thread::Builder::new()
                .name("soft-gpu".to_string())
                .spawn(move || execute(receiver, &fence, &executed_draws, latency))
        };

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                // Without a worker nothing would ever signal; fail every wait.
                fence.lose_device(format!("failed to spawn soft queue worker: {}", e));
                None
            }
        };

        info!("Soft queue started (latency {:?})", latency);

        Self {
            sender: Some(sender),
            worker,
            fence,
            executed_draws,
        }
    }

    /// A shared handle to the queue's fence.
    pub fn fence_handle(&self) -> Arc<CpuFence> {
        self.fence.clone()
    }

    /// Total draws executed so far.
    pub fn executed_draws(&self) -> u64 {
        self.executed_draws.load(Ordering::Relaxed)
    }

    /// Simulates device removal: fails pending waits and rejects new work.
    pub fn lose_device(&mut self, reason: &str) {
        self.fence.lose_device(reason);
        self.sender = None;
    }
}

fn execute(
    receiver: Receiver<Submission>,
    fence: &CpuFence,
    executed_draws: &AtomicU64,
    latency: Duration,
) {
    debug!("Soft queue worker running");
    for submission in receiver {
        if fence.is_lost() {
            break;
        }
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        let draws = submission.commands.draws.len() as u64;
        executed_draws.fetch_add(draws, Ordering::Relaxed);
        trace!(
            "Executed {} draws from allocator {} (epoch {}), signaling {}",
            draws,
            submission.commands.allocator,
            submission.commands.epoch,
            submission.signal_value
        );
        fence.signal(submission.signal_value);
    }
    debug!("Soft queue worker exiting");
}

impl Queue for SoftQueue {
    type Commands = SoftCommandList;
    type Fence = CpuFence;

    fn fence(&self) -> &CpuFence {
        &self.fence
    }

    fn submit(&self, commands: SoftCommandList, signal_value: u64) -> RhiResult<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| RhiError::DeviceLost("soft queue no longer accepts work".to_string()))?;
        sender
            .send(Submission {
                commands,
                signal_value,
            })
            .map_err(|_| RhiError::DeviceLost("soft queue worker stopped".to_string()))
    }
}

impl Drop for SoftQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        self.sender = None;
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            error!("Soft queue worker panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::VertexSource;
    use crate::sync::Fence;

    fn draw(object_index: u32) -> DrawIndexed {
        DrawIndexed {
            vertices: VertexSource::FrameDynamic,
            index_count: 6,
            start_index: 0,
            base_vertex: 0,
            object_index,
            material_index: 0,
        }
    }

    #[test]
    fn test_allocator_records_and_resets() {
        let mut allocator = SoftCommandAllocator::new(2);
        let list = allocator.record(&[draw(0), draw(1)]).unwrap();
        assert_eq!(list.allocator, 2);
        assert_eq!(list.epoch, 0);
        assert_eq!(list.draws.len(), 2);
        assert_eq!(allocator.recorded(), 1);

        allocator.reset().unwrap();
        assert_eq!(allocator.epoch(), 1);
        assert_eq!(allocator.recorded(), 0);
    }

    #[test]
    fn test_queue_signals_in_order() {
        let queue = SoftQueue::new(Duration::from_millis(2));
        let mut allocator = SoftCommandAllocator::new(0);

        for value in 1..=4 {
            let list = allocator.record(&[draw(value as u32)]).unwrap();
            queue.submit(list, value).unwrap();
        }

        queue
            .fence()
            .wait_for_value(4, Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(queue.fence().completed_value().unwrap(), 4);
        assert_eq!(queue.executed_draws(), 4);
    }

    #[test]
    fn test_submissions_run_asynchronously() {
        let queue = SoftQueue::new(Duration::from_millis(50));
        queue.submit(SoftCommandList::default(), 1).unwrap();
        // The submit call returns long before the work completes.
        assert_eq!(queue.fence().completed_value().unwrap(), 0);
        queue.fence().wait_for_value(1, None).unwrap();
    }

    #[test]
    fn test_lost_device_rejects_work() {
        let mut queue = SoftQueue::new(Duration::ZERO);
        queue.lose_device("test");

        let err = queue.submit(SoftCommandList::default(), 1).unwrap_err();
        assert!(err.is_device_lost());
        assert!(queue.fence().wait_for_value(1, None).unwrap_err().is_device_lost());
    }

    #[test]
    fn test_drop_drains_outstanding_work() {
        let queue = SoftQueue::new(Duration::from_millis(5));
        let fence = queue.fence_handle();
        queue.submit(SoftCommandList::default(), 1).unwrap();
        queue.submit(SoftCommandList::default(), 2).unwrap();
        drop(queue);
        assert_eq!(fence.completed_value().unwrap(), 2);
    }

    #[test]
    fn test_soft_types_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<SoftQueue>();
        assert_send::<SoftCommandAllocator>();
        assert_send::<SoftCommandList>();
    }
}
