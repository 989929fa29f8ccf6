//! Frames-in-flight scheduling.
//!
//! The [`FrameScheduler`] owns a fixed ring of [`FrameSlot`]s and the queue
//! that executes their commands. It lets the CPU run up to
//! `frames_in_flight` frames ahead of the GPU and no further.
//!
//! # Fence Values
//!
//! The queue's fence is a single counter for the whole ring. Every submission
//! is tagged with the next counter value, and the slot that produced it
//! remembers the tag. A slot is safe to overwrite once the fence's completed
//! value has reached its tag:
//!
//! ```text
//! submit:   slot0=1  slot1=2  slot2=3  slot0=4 ...
//! acquire slot0 again  ->  wait until completed >= 1
//! ```
//!
//! A tag of 0 means the slot has never been submitted and never blocks.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use waves_core::config::FrameConfig;
//! use waves_renderer::frame_resource::{FrameSlot, SlotLayout};
//! use waves_renderer::frame_scheduler::FrameScheduler;
//! use waves_rhi::soft::{SoftCommandAllocator, SoftQueue};
//!
//! # fn example() -> Result<(), waves_rhi::RhiError> {
//! let layout = SlotLayout {
//!     pass_count: 1,
//!     object_count: 1,
//!     material_count: 1,
//!     wave_vertex_count: 0,
//! };
//! let slots = (0..3)
//!     .map(|i| FrameSlot::new_host(i, SoftCommandAllocator::new(i), &layout))
//!     .collect::<Result<Vec<_>, _>>()?;
//! let mut scheduler =
//!     FrameScheduler::new(SoftQueue::new(Duration::ZERO), slots, &FrameConfig::default())?;
//!
//! loop {
//!     // Blocks only if the GPU is still using this slot
//!     scheduler.acquire_slot()?;
//!     // ... write constants into scheduler.current_slot_mut()? ...
//!     let commands = scheduler.record(&[])?;
//!     scheduler.submit_and_tag(commands)?;
//!     # break;
//! }
//! scheduler.drain_all()?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use waves_core::config::FrameConfig;
use waves_rhi::buffer::{HostMemory, MappedMemory};
use waves_rhi::command::{CommandAllocator, DrawIndexed, Queue};
use waves_rhi::sync::Fence;
use waves_rhi::{RhiError, RhiResult};

use crate::frame_resource::FrameSlot;

/// Bounds CPU run-ahead with a ring of frame slots and a timeline fence.
///
/// # Thread Safety
///
/// The scheduler is driven from a single thread. Only the queue's execution
/// (and the fence it signals) runs concurrently.
pub struct FrameScheduler<Q, A, M = HostMemory>
where
    Q: Queue,
    A: CommandAllocator<Commands = Q::Commands>,
    M: MappedMemory,
{
    queue: Q,
    slots: Vec<FrameSlot<A, M>>,
    /// Slot the next acquire hands out.
    next_slot: usize,
    /// Slot handed out and not yet submitted.
    acquired: Option<usize>,
    /// Last value any submission was tagged with.
    fence_counter: u64,
    wait_timeout: Option<Duration>,
    stalls: u64,
}

impl<Q, A, M> FrameScheduler<Q, A, M>
where
    Q: Queue,
    A: CommandAllocator<Commands = Q::Commands>,
    M: MappedMemory,
{
    /// Creates a scheduler over `slots`, handed out in order.
    ///
    /// # Errors
    ///
    /// Returns an error if `slots` is empty or its length differs from
    /// `config.frames_in_flight`.
    pub fn new(queue: Q, slots: Vec<FrameSlot<A, M>>, config: &FrameConfig) -> RhiResult<Self> {
        if slots.is_empty() {
            return Err(RhiError::InvalidState(
                "Frame scheduler needs at least one slot".to_string(),
            ));
        }
        // Scenes size their dirty counters from the configured count.
        if slots.len() != config.frames_in_flight {
            return Err(RhiError::InvalidState(format!(
                "Frame scheduler built with {} slots, config asks for {}",
                slots.len(),
                config.frames_in_flight
            )));
        }

        let wait_timeout = config.wait_timeout_ms.map(Duration::from_millis);
        info!(
            "Frame scheduler created: {} frames in flight, wait timeout {:?}",
            slots.len(),
            wait_timeout
        );

        Ok(Self {
            queue,
            slots,
            next_slot: 0,
            acquired: None,
            fence_counter: 0,
            wait_timeout,
            stalls: 0,
        })
    }

    /// Hands out the next slot in the ring.
    ///
    /// If the GPU has not finished the slot's last submission this blocks on
    /// the fence. The slot's command allocator is reset before it is
    /// returned, so everything in the slot may be overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait times out, fails or the device is lost.
    /// The slot is not handed out in that case.
    pub fn acquire_slot(&mut self) -> RhiResult<&mut FrameSlot<A, M>> {
        if let Some(abandoned) = self.acquired.take() {
            warn!("Slot {} acquired again before submission", abandoned);
        }

        let index = self.next_slot;
        let marker = self.slots[index].fence_value();

        if marker != 0 && !self.queue.fence().is_complete(marker)? {
            self.stalls += 1;
            debug!(
                "Waiting for slot {} (fence value {}, last submitted {})",
                index, marker, self.fence_counter
            );
            self.queue.fence().wait_for_value(marker, self.wait_timeout)?;
        }

        self.slots[index].allocator_mut().reset()?;

        self.next_slot = (index + 1) % self.slots.len();
        self.acquired = Some(index);
        trace!("Acquired slot {}", index);

        Ok(&mut self.slots[index])
    }

    /// The acquired slot.
    ///
    /// # Errors
    ///
    /// Returns an error if no slot is acquired.
    pub fn current_slot_mut(&mut self) -> RhiResult<&mut FrameSlot<A, M>> {
        let index = self.acquired_index()?;
        Ok(&mut self.slots[index])
    }

    /// Records `draws` with the acquired slot's allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if no slot is acquired or recording fails.
    pub fn record(&mut self, draws: &[DrawIndexed]) -> RhiResult<Q::Commands> {
        let index = self.acquired_index()?;
        self.slots[index].allocator_mut().record(draws)
    }

    /// Submits the acquired slot's commands and tags the slot with the new
    /// fence value.
    ///
    /// Returns the value the fence will reach once the commands complete.
    ///
    /// # Errors
    ///
    /// Returns an error if no slot is acquired or the submission fails.
    pub fn submit_and_tag(&mut self, commands: Q::Commands) -> RhiResult<u64> {
        let index = self.acquired.take().ok_or_else(|| {
            RhiError::InvalidState("submit_and_tag called without an acquired slot".to_string())
        })?;

        let value = self.fence_counter + 1;
        self.queue.submit(commands, value)?;

        self.fence_counter = value;
        self.slots[index].set_fence_value(value);
        trace!("Submitted slot {} with fence value {}", index, value);

        Ok(value)
    }

    /// Records and submits `draws` in one call.
    pub fn submit_frame(&mut self, draws: &[DrawIndexed]) -> RhiResult<u64> {
        let commands = self.record(draws)?;
        self.submit_and_tag(commands)
    }

    /// Waits until every submission so far has completed.
    ///
    /// Required before resizing or destroying resources the GPU may still
    /// read.
    pub fn drain_all(&mut self) -> RhiResult<()> {
        if self.fence_counter == 0 {
            return Ok(());
        }
        debug!("Draining frame scheduler up to {}", self.fence_counter);
        self.queue
            .fence()
            .wait_for_value(self.fence_counter, self.wait_timeout)
    }

    /// Number of slots in the ring.
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Last fence value handed to the queue.
    #[inline]
    pub fn current_fence(&self) -> u64 {
        self.fence_counter
    }

    /// The fence's completed value.
    pub fn completed_value(&self) -> RhiResult<u64> {
        self.queue.fence().completed_value()
    }

    /// Times `acquire_slot` had to wait for the GPU.
    #[inline]
    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    /// Index of the acquired slot, if any.
    #[inline]
    pub fn acquired(&self) -> Option<usize> {
        self.acquired
    }

    #[inline]
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    #[inline]
    pub fn slots(&self) -> &[FrameSlot<A, M>] {
        &self.slots
    }

    fn acquired_index(&self) -> RhiResult<usize> {
        self.acquired
            .ok_or_else(|| RhiError::InvalidState("no frame slot acquired".to_string()))
    }
}

impl<Q, A, M> Drop for FrameScheduler<Q, A, M>
where
    Q: Queue,
    A: CommandAllocator<Commands = Q::Commands>,
    M: MappedMemory,
{
    fn drop(&mut self) {
        if let Err(e) = self.drain_all() {
            error!("Failed to drain frame scheduler: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::thread;

    use waves_rhi::soft::{SoftCommandAllocator, SoftCommandList, SoftQueue};
    use waves_rhi::sync::CpuFence;

    use crate::frame_resource::SlotLayout;

    /// Queue whose fence only moves when the test signals it.
    struct ManualQueue {
        fence: Arc<CpuFence>,
        submitted: Mutex<Vec<u64>>,
    }

    impl Queue for ManualQueue {
        type Commands = SoftCommandList;
        type Fence = CpuFence;

        fn fence(&self) -> &CpuFence {
            &self.fence
        }

        fn submit(&self, _commands: SoftCommandList, signal_value: u64) -> RhiResult<()> {
            self.submitted.lock().unwrap().push(signal_value);
            Ok(())
        }
    }

    type TestScheduler = FrameScheduler<ManualQueue, SoftCommandAllocator>;

    fn layout() -> SlotLayout {
        SlotLayout {
            pass_count: 1,
            object_count: 1,
            material_count: 1,
            wave_vertex_count: 0,
        }
    }

    fn slots(count: usize) -> Vec<FrameSlot<SoftCommandAllocator>> {
        (0..count)
            .map(|i| FrameSlot::new_host(i, SoftCommandAllocator::new(i), &layout()).unwrap())
            .collect()
    }

    fn manual(fence: &Arc<CpuFence>, count: usize, timeout_ms: Option<u64>) -> TestScheduler {
        let queue = ManualQueue {
            fence: fence.clone(),
            submitted: Mutex::new(Vec::new()),
        };
        let config = FrameConfig {
            frames_in_flight: count,
            wait_timeout_ms: timeout_ms,
        };
        FrameScheduler::new(queue, slots(count), &config).unwrap()
    }

    fn run_frame(scheduler: &mut TestScheduler) -> RhiResult<u64> {
        scheduler.acquire_slot()?;
        scheduler.submit_frame(&[])
    }

    #[test]
    fn test_rejects_empty_ring() {
        let queue = ManualQueue {
            fence: Arc::new(CpuFence::new()),
            submitted: Mutex::new(Vec::new()),
        };
        let result = TestScheduler::new(queue, Vec::new(), &FrameConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_ring_size_mismatch() {
        let queue = ManualQueue {
            fence: Arc::new(CpuFence::new()),
            submitted: Mutex::new(Vec::new()),
        };
        let config = FrameConfig {
            frames_in_flight: 2,
            wait_timeout_ms: None,
        };
        let result = TestScheduler::new(queue, slots(3), &config);
        assert!(matches!(result, Err(RhiError::InvalidState(_))));
    }

    #[test]
    fn test_first_acquire_returns_slot_zero() {
        let fence = Arc::new(CpuFence::new());
        let mut scheduler = manual(&fence, 3, None);

        let slot = scheduler.acquire_slot().unwrap();
        assert_eq!(slot.index(), 0);
        assert_eq!(slot.fence_value(), 0);
        assert_eq!(scheduler.stalls(), 0);
    }

    #[test]
    fn test_submissions_tag_slots_in_order() {
        let fence = Arc::new(CpuFence::new());
        let mut scheduler = manual(&fence, 3, None);

        for expected in 1..=3 {
            assert_eq!(run_frame(&mut scheduler).unwrap(), expected);
        }

        let markers: Vec<u64> = scheduler.slots().iter().map(|s| s.fence_value()).collect();
        assert_eq!(markers, vec![1, 2, 3]);
        assert_eq!(scheduler.current_fence(), 3);
        assert_eq!(*scheduler.queue().submitted.lock().unwrap(), vec![1, 2, 3]);

        fence.signal(3);
    }

    #[test]
    fn test_fourth_acquire_blocks_until_signaled() {
        let fence = Arc::new(CpuFence::new());
        let mut scheduler = manual(&fence, 3, None);
        for _ in 0..3 {
            run_frame(&mut scheduler).unwrap();
        }

        let (tx, rx) = mpsc::channel();
        let cpu = thread::spawn(move || {
            let index = scheduler.acquire_slot().map(|slot| slot.index());
            tx.send(index).unwrap();
            scheduler
        });

        // The GPU has finished nothing, so the CPU must still be waiting.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        fence.signal(1);
        let index = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(index, 0);

        let scheduler = cpu.join().unwrap();
        assert_eq!(scheduler.stalls(), 1);

        fence.signal(3);
    }

    #[test]
    fn test_completed_slot_does_not_stall() {
        let fence = Arc::new(CpuFence::new());
        let mut scheduler = manual(&fence, 2, None);
        run_frame(&mut scheduler).unwrap();
        run_frame(&mut scheduler).unwrap();

        fence.signal(1);
        let slot = scheduler.acquire_slot().unwrap();
        assert_eq!(slot.index(), 0);
        assert_eq!(scheduler.stalls(), 0);

        fence.signal(2);
    }

    #[test]
    fn test_acquire_resets_allocator() {
        let fence = Arc::new(CpuFence::new());
        let mut scheduler = manual(&fence, 1, None);

        let epoch = scheduler.acquire_slot().unwrap().allocator().epoch();
        assert_eq!(epoch, 1);
        scheduler.submit_frame(&[]).unwrap();

        fence.signal(1);
        let epoch = scheduler.acquire_slot().unwrap().allocator().epoch();
        assert_eq!(epoch, 2);
    }

    #[test]
    fn test_wait_timeout() {
        let fence = Arc::new(CpuFence::new());
        let mut scheduler = manual(&fence, 2, Some(20));
        run_frame(&mut scheduler).unwrap();
        run_frame(&mut scheduler).unwrap();

        let err = scheduler.acquire_slot().err().unwrap();
        assert!(matches!(
            err,
            RhiError::Timeout {
                value: 1,
                completed: 0
            }
        ));
        assert!(scheduler.acquired().is_none());

        fence.signal(2);
    }

    #[test]
    fn test_device_lost_propagates() {
        let fence = Arc::new(CpuFence::new());
        let mut scheduler = manual(&fence, 1, None);
        run_frame(&mut scheduler).unwrap();

        fence.lose_device("test");
        let err = scheduler.acquire_slot().err().unwrap();
        assert!(err.is_device_lost());
        assert!(scheduler.drain_all().unwrap_err().is_device_lost());
    }

    #[test]
    fn test_submit_without_acquire_fails() {
        let fence = Arc::new(CpuFence::new());
        let mut scheduler = manual(&fence, 2, None);

        let err = scheduler.submit_and_tag(SoftCommandList::default()).unwrap_err();
        assert!(matches!(err, RhiError::InvalidState(_)));
        assert!(scheduler.record(&[]).is_err());
        assert!(scheduler.current_slot_mut().is_err());
        assert_eq!(scheduler.current_fence(), 0);
    }

    #[test]
    fn test_reacquire_abandons_unsubmitted_slot() {
        let fence = Arc::new(CpuFence::new());
        let mut scheduler = manual(&fence, 3, None);

        scheduler.acquire_slot().unwrap();
        let index = scheduler.acquire_slot().unwrap().index();
        assert_eq!(index, 1);

        let value = scheduler.submit_frame(&[]).unwrap();
        assert_eq!(value, 1);
        assert_eq!(scheduler.slots()[0].fence_value(), 0);
        assert_eq!(scheduler.slots()[1].fence_value(), 1);

        fence.signal(1);
    }

    #[test]
    fn test_drain_all_with_nothing_submitted() {
        let fence = Arc::new(CpuFence::new());
        let mut scheduler = manual(&fence, 2, Some(0));
        assert!(scheduler.drain_all().is_ok());
    }

    #[test]
    fn test_acquired_slot_never_in_use_by_gpu() {
        let queue = SoftQueue::new(Duration::from_millis(1));
        let config = FrameConfig::default();
        let mut scheduler = FrameScheduler::new(queue, slots(3), &config).unwrap();

        for _ in 0..30 {
            let marker = scheduler.acquire_slot().unwrap().fence_value();
            assert!(marker <= scheduler.completed_value().unwrap());
            scheduler.submit_frame(&[]).unwrap();
        }

        scheduler.drain_all().unwrap();
        assert_eq!(scheduler.completed_value().unwrap(), 30);
    }
}
