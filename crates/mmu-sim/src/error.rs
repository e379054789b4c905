//! Listener lifecycle errors

use std::time::Duration;

use mmu_matrix::MatrixError;
use thiserror::Error;

/// Errors that can occur while enabling or disabling the listener
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Another enable/disable is running (fail-fast variants only)
    #[error("listener transition already in progress")]
    TransitionInProgress,

    /// Waited too long for another enable/disable to finish
    #[error("timed out after {0:?} waiting for listener transition")]
    TransitionTimeout(Duration),

    /// The listen socket could not be opened; the listener stays disabled
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Capturing or rebuilding device state failed
    #[error(transparent)]
    Matrix(#[from] MatrixError),
}
