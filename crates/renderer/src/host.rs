//! The host loop.
//!
//! [`FrameLoop`] drives one [`Scene`] through a [`FrameScheduler`]. Every
//! frame it:
//!
//! 1. Lets the scene update its CPU-side state
//! 2. Acquires the next frame slot (the only point where it may block)
//! 3. Lets the scene write the slot's constants and list its draws
//! 4. Records and submits the draws, tagging the slot
//!
//! There is no global application object; the loop owns the scene and the
//! scheduler and passes them explicitly.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use waves_core::Timer;
use waves_rhi::buffer::{HostMemory, MappedMemory};
use waves_rhi::command::{CommandAllocator, DrawIndexed, Queue};

use crate::error::RenderResult;
use crate::frame_scheduler::FrameScheduler;
use crate::scene::{FrameTime, InputEvent, Scene};

/// Frame rate statistics, reported once per second of frame time.
#[derive(Debug, Default)]
pub struct FrameStats {
    frames: u32,
    elapsed: f32,
}

impl FrameStats {
    /// Counts a frame that took `delta` seconds.
    ///
    /// Returns `(frames per second, milliseconds per frame)` whenever a full
    /// second has accumulated.
    pub fn frame(&mut self, delta: f32) -> Option<(f32, f32)> {
        self.frames += 1;
        self.elapsed += delta;
        if self.elapsed < 1.0 {
            return None;
        }

        let fps = self.frames as f32 / self.elapsed;
        let mspf = 1000.0 / fps;
        self.frames = 0;
        self.elapsed = 0.0;
        Some((fps, mspf))
    }
}

/// Owns a scene and the scheduler feeding its frames to the GPU.
pub struct FrameLoop<Q, A, M = HostMemory>
where
    Q: Queue,
    A: CommandAllocator<Commands = Q::Commands>,
    M: MappedMemory,
{
    scene: Box<dyn Scene>,
    scheduler: FrameScheduler<Q, A, M>,
    timer: Timer,
    total_time: f32,
    frame: u64,
    stats: FrameStats,
    draws: Vec<DrawIndexed>,
}

impl<Q, A, M> FrameLoop<Q, A, M>
where
    Q: Queue,
    A: CommandAllocator<Commands = Q::Commands>,
    M: MappedMemory,
{
    pub fn new(scene: Box<dyn Scene>, scheduler: FrameScheduler<Q, A, M>) -> Self {
        Self {
            scene,
            scheduler,
            timer: Timer::new(),
            total_time: 0.0,
            frame: 0,
            stats: FrameStats::default(),
            draws: Vec::new(),
        }
    }

    /// Runs the scene's one-time setup and restarts the clock.
    pub fn init(&mut self) -> RenderResult<()> {
        self.scene.init(self.scheduler.frames_in_flight())?;
        self.timer.reset();
        info!(
            "Scene '{}' initialized with {} frames in flight",
            self.scene.name(),
            self.scheduler.frames_in_flight()
        );
        Ok(())
    }

    /// Runs one frame using the wall time since the previous one.
    pub fn tick(&mut self) -> RenderResult<u64> {
        let delta = self.timer.delta_secs();
        self.advance(delta)
    }

    /// Runs one frame that advances the scene by `delta` seconds.
    ///
    /// Returns the fence value the frame was tagged with.
    pub fn advance(&mut self, delta: f32) -> RenderResult<u64> {
        self.total_time += delta;
        let time = FrameTime {
            total: self.total_time,
            delta,
            frame: self.frame,
        };

        self.scene.update(&time)?;

        let slot = self.scheduler.acquire_slot()?;
        self.draws.clear();
        self.scene.render(&time, slot, &mut self.draws)?;

        let commands = self.scheduler.record(&self.draws)?;
        let value = self.scheduler.submit_and_tag(commands)?;

        self.frame += 1;
        if let Some((fps, mspf)) = self.stats.frame(delta) {
            info!(
                "{}    fps: {:.0}   mspf: {:.3}   stalls: {}",
                self.scene.name(),
                fps,
                mspf,
                self.scheduler.stalls()
            );
        }

        Ok(value)
    }

    /// Runs `frames` frames, each taking at least `target_frame_time`.
    pub fn run(&mut self, frames: u64, target_frame_time: Duration) -> RenderResult<()> {
        for _ in 0..frames {
            let start = Instant::now();
            self.tick()?;
            if let Some(rest) = target_frame_time.checked_sub(start.elapsed())
                && !rest.is_zero()
            {
                thread::sleep(rest);
            }
        }
        Ok(())
    }

    /// Stops the clock. Ticks while paused advance the scene by zero seconds.
    pub fn pause(&mut self) {
        if !self.timer.is_paused() {
            self.timer.pause();
            info!("Scene '{}' paused at {:.3}s", self.scene.name(), self.total_time);
        }
    }

    /// Restarts the clock without counting the paused interval.
    pub fn resume(&mut self) {
        if self.timer.is_paused() {
            self.timer.resume();
            info!("Scene '{}' resumed", self.scene.name());
        }
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.timer.is_paused()
    }

    pub fn input(&mut self, event: &InputEvent) {
        self.scene.on_input(event);
    }

    /// Waits for all in-flight frames, then lets the scene adapt to the new size.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.scheduler.drain_all()?;
        self.scene.on_resize(width, height);
        info!("Resized to {}x{}", width, height);
        Ok(())
    }

    /// Waits for all in-flight frames to finish.
    pub fn shutdown(&mut self) -> RenderResult<()> {
        if let Err(e) = self.scheduler.drain_all() {
            warn!("Shutdown drain failed: {}", e);
            return Err(e.into());
        }
        self.scene.on_shutdown();
        info!(
            "Scene '{}' shut down after {} frames (fence {})",
            self.scene.name(),
            self.frame,
            self.scheduler.current_fence()
        );
        Ok(())
    }

    /// Frames submitted so far.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Scene time in seconds, excluding pauses.
    #[inline]
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    pub fn scene(&self) -> &dyn Scene {
        self.scene.as_ref()
    }

    pub fn scheduler(&self) -> &FrameScheduler<Q, A, M> {
        &self.scheduler
    }
}
