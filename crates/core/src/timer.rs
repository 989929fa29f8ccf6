//! Frame timer with pause support.

use std::time::{Duration, Instant};

/// High-resolution frame timer.
///
/// While paused every tick reports a zero delta, so anything driven by the
/// deltas freezes until the timer is resumed.
#[derive(Debug)]
pub struct Timer {
    last_tick: Instant,
    paused: bool,
}

impl Timer {
    /// Create a new running timer, starting from now.
    pub fn new() -> Self {
        Self {
            last_tick: Instant::now(),
            paused: false,
        }
    }

    /// Get the time elapsed since the last call to `tick()`.
    ///
    /// Always zero while paused.
    pub fn tick(&mut self) -> Duration {
        if self.paused {
            return Duration::ZERO;
        }
        let now = Instant::now();
        let delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        delta
    }

    /// Get the delta time in seconds since the last tick.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Stop the clock. Has no effect if already paused.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Restart the clock; time spent paused is never reported.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.last_tick = Instant::now();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Reset the timer to the current time and resume it.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
