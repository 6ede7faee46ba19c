//! Runtime error types.

use sigil_core::DispatchError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A dispatch failed with a usage error.
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    /// Reading input or installing a signal handler failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
