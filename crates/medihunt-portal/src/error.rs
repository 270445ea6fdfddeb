//! Error types for portal operations.
//!
//! Every failure surfaced by this crate is a [`PortalError`]: a category
//! ([`PortalErrorCode`]), a message, and optional context such as the HTTP
//! status and endpoint of a failed API call or the login stage that failed.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::login::LoginStage;

/// The category of a portal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortalErrorCode {
    /// Token refresh or exchange was rejected.
    AuthenticationFailed,
    /// The interactive browser login failed.
    LoginFailed,
    /// Connection failed, timed out, or the response could not be read.
    NetworkError,
    /// The API answered with a non-success status.
    HttpStatus,
    /// The response body could not be parsed.
    InvalidResponse,
    /// A region, specialty or doctor name matched nothing.
    NotResolved,
    /// Missing or invalid configuration.
    ConfigurationError,
    /// The token cache could not be written or removed.
    CacheError,
    /// The browser automation backend failed.
    BrowserError,
    /// Unexpected internal state.
    InternalError,
}

impl PortalErrorCode {
    /// Returns a machine-friendly name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::LoginFailed => "login_failed",
            Self::NetworkError => "network_error",
            Self::HttpStatus => "http_status",
            Self::InvalidResponse => "invalid_response",
            Self::NotResolved => "not_resolved",
            Self::ConfigurationError => "configuration_error",
            Self::CacheError => "cache_error",
            Self::BrowserError => "browser_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for PortalErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error that occurred while talking to the portal.
#[derive(Debug, Error)]
pub struct PortalError {
    code: PortalErrorCode,
    message: String,
    status: Option<u16>,
    endpoint: Option<String>,
    stage: Option<LoginStage>,
    artifacts: Option<PathBuf>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PortalError {
    /// Creates a new portal error with the given code and message.
    pub fn new(code: PortalErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            endpoint: None,
            stage: None,
            artifacts: None,
            source: None,
        }
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(PortalErrorCode::AuthenticationFailed, message)
    }

    /// Creates a login failure attributed to `stage`.
    pub fn login(stage: LoginStage, message: impl Into<String>) -> Self {
        let mut err = Self::new(PortalErrorCode::LoginFailed, message);
        err.stage = Some(stage);
        err
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PortalErrorCode::NetworkError, message)
    }

    /// Creates an error for a non-success HTTP status.
    pub fn http_status(status: u16, endpoint: impl Into<String>, body: &str) -> Self {
        let endpoint = endpoint.into();
        let mut message = format!("{} returned HTTP {}", endpoint, status);
        let body = body.trim();
        if !body.is_empty() {
            let snippet: String = body.chars().take(200).collect();
            message.push_str(": ");
            message.push_str(&snippet);
        }
        let mut err = Self::new(PortalErrorCode::HttpStatus, message);
        err.status = Some(status);
        err.endpoint = Some(endpoint);
        err
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(PortalErrorCode::InvalidResponse, message)
    }

    /// Creates an error for a filter name that matched nothing.
    pub fn not_resolved(kind: &str, name: &str, examples: &str) -> Self {
        let message = if examples.is_empty() {
            format!("could not resolve {} '{}': no {}s available", kind, name, kind)
        } else {
            format!(
                "could not resolve {} '{}'. Examples: {}",
                kind, name, examples
            )
        };
        Self::new(PortalErrorCode::NotResolved, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(PortalErrorCode::ConfigurationError, message)
    }

    /// Creates a token cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::new(PortalErrorCode::CacheError, message)
    }

    /// Creates a browser automation error.
    pub fn browser(message: impl Into<String>) -> Self {
        Self::new(PortalErrorCode::BrowserError, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(PortalErrorCode::InternalError, message)
    }

    /// Maps a transport error from reqwest into a network error.
    pub fn transport(endpoint: &str, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("{}: request timeout", endpoint)
        } else if err.is_connect() {
            format!("{}: connection failed: {}", endpoint, err)
        } else {
            format!("{}: request failed: {}", endpoint, err)
        };
        let mut out = Self::network(message).with_source(err);
        out.endpoint = Some(endpoint.to_string());
        out
    }

    /// Turns this error into a login failure at `stage`, unless a stage is
    /// already set.
    pub fn at_stage(mut self, stage: LoginStage) -> Self {
        if self.stage.is_none() {
            self.stage = Some(stage);
        }
        if self.code != PortalErrorCode::LoginFailed {
            self.message = format!("{}: {}", self.code, self.message);
            self.code = PortalErrorCode::LoginFailed;
        }
        self
    }

    /// Records where diagnostic artifacts for this failure were written.
    pub fn with_artifacts(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts = Some(dir.into());
        self
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> PortalErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the HTTP status, for [`PortalErrorCode::HttpStatus`] errors.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Returns the endpoint involved, if known.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Returns the login stage that failed, if any.
    pub fn stage(&self) -> Option<LoginStage> {
        self.stage
    }

    /// Returns the directory holding diagnostic artifacts, if any were saved.
    pub fn artifacts(&self) -> Option<&Path> {
        self.artifacts.as_deref()
    }
}

impl fmt::Display for PortalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(stage) = self.stage {
            write!(f, "[login:{}] ", stage)?;
        }
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(ref dir) = self.artifacts {
            write!(f, " (artifacts in {})", dir.display())?;
        }
        Ok(())
    }
}

/// A specialized Result type for portal operations.
pub type PortalResult<T> = Result<T, PortalError>;
