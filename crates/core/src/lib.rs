//! Core utilities for the wave demos.
//!
//! This crate provides foundational types and utilities used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timer
//! - Demo configuration loaded from JSON

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::DemoConfig;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
