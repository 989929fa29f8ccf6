//! Waves - Headless Demo Entry Point
//!
//! Runs the water simulation through the frames-in-flight scheduler on the
//! soft GPU backend and reports how often the CPU had to wait for the GPU.
//!
//! Usage: `waves [config.json]`

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use waves_core::DemoConfig;
use waves_renderer::{FrameLoop, FrameScheduler, FrameSlot, Scene, WavesScene};
use waves_rhi::soft::{SoftCommandAllocator, SoftQueue};

fn load_config() -> Result<DemoConfig> {
    match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => DemoConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => {
            info!("No config file given, using defaults");
            Ok(DemoConfig::default())
        }
    }
}

fn run(config: &DemoConfig) -> Result<()> {
    let scene = WavesScene::new(config).context("Failed to create waves scene")?;
    let layout = scene.slot_layout();

    let queue = SoftQueue::new(Duration::from_millis(config.run.simulated_gpu_latency_ms));
    let slots = FrameSlot::host_ring(
        config.frames.frames_in_flight,
        &layout,
        SoftCommandAllocator::new,
    )?;
    let scheduler = FrameScheduler::new(queue, slots, &config.frames)?;

    let mut frame_loop = FrameLoop::new(Box::new(scene), scheduler);
    frame_loop.init()?;
    frame_loop.resize(config.run.width, config.run.height)?;

    info!("Running {} frames", config.run.frame_count);
    let result = frame_loop.run(
        config.run.frame_count,
        Duration::from_millis(config.run.target_frame_time_ms),
    );
    if let Err(ref e) = result {
        error!("Frame loop failed: {}", e);
    }
    let drained = frame_loop.shutdown();
    result?;
    drained?;

    let scheduler = frame_loop.scheduler();
    info!(
        "Finished: {} frames, final fence {}, {} stalls, {} draws executed",
        frame_loop.frame_count(),
        scheduler.completed_value()?,
        scheduler.stalls(),
        scheduler.queue().executed_draws()
    );

    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    waves_core::init_logging();
    info!("Starting waves demo");

    let config = load_config()?;
    run(&config)
}
