//! Wave simulation.
//!
//! This crate provides a CPU height-field solver for the damped 2-D wave
//! equation:
//! - [`HeightField`] - the simulation state, stepping and disturbances
//! - [`grid`] - index generation and the vertex layout used to upload the field

mod error;
pub mod grid;
pub mod height_field;

pub use error::{SimError, SimResult};
pub use grid::{WaveVertex, grid_indices};
pub use height_field::HeightField;
