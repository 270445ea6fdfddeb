//! Hunter error types.

use std::io;

use medihunt_core::FormatError;
use medihunt_portal::PortalError;
use thiserror::Error;

/// Result type for hunter operations.
pub type HunterResult<T> = Result<T, HunterError>;

/// Errors that can end a hunt.
#[derive(Debug, Error)]
pub enum HunterError {
    /// A portal call failed (authentication, HTTP, parsing).
    #[error(transparent)]
    Portal(#[from] PortalError),

    /// A batch could not be rendered.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Writing a report failed.
    #[error("failed to write report: {0}")]
    Io(#[from] io::Error),

    /// Invalid poller configuration.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl HunterError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
