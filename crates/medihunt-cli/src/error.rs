//! CLI error types.

use medihunt_core::{TimeError, TracingError};
use medihunt_hunter::HunterError;
use medihunt_portal::PortalError;
use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by the `medihunt` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error (file, credentials, missing options).
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid command-line value.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// Portal error (login, tokens, API calls, name resolution).
    #[error(transparent)]
    Portal(#[from] PortalError),

    /// The hunt ended with an error.
    #[error(transparent)]
    Hunter(#[from] HunterError),

    /// Logging could not be set up.
    #[error(transparent)]
    Tracing(#[from] TracingError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TimeError> for CliError {
    fn from(err: TimeError) -> Self {
        Self::Argument(err.to_string())
    }
}
