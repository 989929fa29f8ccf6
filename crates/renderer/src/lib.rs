//! Frames-in-flight scheduling and the wave demo.
//!
//! This crate drives the simulation and the GPU seams:
//! - Constant buffer layouts shared with the shaders
//! - Frame slots and the scheduler that bounds CPU run-ahead
//! - The [`Scene`] trait and the water scene
//! - The host loop

pub mod camera;
pub mod constants;
mod error;
pub mod frame_resource;
pub mod frame_scheduler;
pub mod host;
pub mod scene;
pub mod waves_scene;

pub use camera::OrbitCamera;
pub use error::{RenderError, RenderResult};
pub use frame_resource::{FrameSlot, SlotLayout, SlotWriter};
pub use frame_scheduler::FrameScheduler;
pub use host::{FrameLoop, FrameStats};
pub use scene::{FrameTime, InputEvent, MouseButton, Scene};
pub use waves_scene::WavesScene;
