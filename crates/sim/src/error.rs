//! Simulation error types.

use thiserror::Error;

/// Error type for invalid simulation parameters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// The stencil needs at least one interior row and column.
    #[error("Grid must be at least 3x3, got {rows}x{cols}")]
    GridTooSmall {
        /// Requested row count.
        rows: usize,
        /// Requested column count.
        cols: usize,
    },

    /// A step size was zero, negative or NaN.
    #[error("Invalid {name}: {value} (must be positive)")]
    InvalidStep {
        /// Which parameter was rejected.
        name: &'static str,
        /// The rejected value.
        value: f32,
    },
}

/// Result type alias for simulation operations.
pub type SimResult<T> = Result<T, SimError>;
