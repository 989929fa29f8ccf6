//! Demo configuration.
//!
//! All values are fixed at construction time. A configuration file is a JSON
//! document whose sections mirror [`DemoConfig`]; any missing field falls back
//! to its default.
//!
//! ```json
//! {
//!     "waves": { "rows": 200, "cols": 200 },
//!     "frames": { "frames_in_flight": 2 },
//!     "run": { "frame_count": 600 }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

/// Height-field grid and physical parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveConfig {
    pub rows: usize,
    pub cols: usize,
    /// Distance between neighbouring grid nodes.
    pub spatial_step: f32,
    /// Simulation time step in seconds.
    pub time_step: f32,
    /// Wave propagation speed.
    pub speed: f32,
    pub damping: f32,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            rows: 128,
            cols: 128,
            spatial_step: 1.0,
            time_step: 0.03,
            speed: 4.0,
            damping: 0.2,
        }
    }
}

/// Frames-in-flight settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Number of frame slots in the ring.
    pub frames_in_flight: usize,
    /// Upper bound on a single fence wait. `None` waits forever.
    pub wait_timeout_ms: Option<u64>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            wait_timeout_ms: None,
        }
    }
}

/// Random "raindrop" disturbances applied to the wave surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RainConfig {
    /// Seconds between drops.
    pub interval: f32,
    pub min_magnitude: f32,
    pub max_magnitude: f32,
    /// Seed for the drop generator; identical seeds replay identical rain.
    pub seed: u64,
}

impl Default for RainConfig {
    fn default() -> Self {
        Self {
            interval: 0.25,
            min_magnitude: 0.2,
            max_magnitude: 0.5,
            seed: 0x5eed,
        }
    }
}

/// Host loop settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Frames to run before shutting down.
    pub frame_count: u64,
    /// Time the soft GPU spends on each submission.
    pub simulated_gpu_latency_ms: u64,
    /// Minimum wall time per frame; 0 runs unthrottled.
    pub target_frame_time_ms: u64,
    pub width: u32,
    pub height: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            frame_count: 600,
            simulated_gpu_latency_ms: 4,
            target_frame_time_ms: 16,
            width: 1280,
            height: 720,
        }
    }
}

/// Complete demo configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub waves: WaveConfig,
    pub frames: FrameConfig,
    pub rain: RainConfig,
    pub run: RunConfig,
}

impl DemoConfig {
    /// Parse a configuration from a JSON string and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Check the values a parse cannot reject on its own.
    pub fn validate(&self) -> Result<()> {
        let waves = &self.waves;
        if waves.rows <= 2 || waves.cols <= 2 {
            return Err(Error::Config(format!(
                "wave grid must be at least 3x3, got {}x{}",
                waves.rows, waves.cols
            )));
        }
        if !(waves.spatial_step > 0.0) || !(waves.time_step > 0.0) {
            return Err(Error::Config(format!(
                "spatial and time steps must be positive, got dx={} dt={}",
                waves.spatial_step, waves.time_step
            )));
        }
        if self.frames.frames_in_flight == 0 {
            return Err(Error::Config(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        let rain = &self.rain;
        if !(rain.interval > 0.0) {
            return Err(Error::Config(format!(
                "rain interval must be positive, got {}",
                rain.interval
            )));
        }
        if rain.min_magnitude > rain.max_magnitude {
            return Err(Error::Config(format!(
                "rain magnitude range is inverted: {}..{}",
                rain.min_magnitude, rain.max_magnitude
            )));
        }
        if self.run.width == 0 || self.run.height == 0 {
            return Err(Error::Config("viewport must be non-empty".to_string()));
        }
        Ok(())
    }
}
