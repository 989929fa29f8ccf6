//! Renderer error types.

use thiserror::Error;
use waves_rhi::RhiError;
use waves_sim::SimError;

/// Error type for frame loop and scene operations.
#[derive(Error, Debug)]
pub enum RenderError {
    /// GPU synchronization, submission or resource failure
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Invalid simulation parameters
    #[error("Simulation error: {0}")]
    Simulation(#[from] SimError),

}

/// Result type alias for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;
