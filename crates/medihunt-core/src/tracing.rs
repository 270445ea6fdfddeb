//! Logging setup shared by every medihunt binary.
//!
//! Logs always go to stderr so that stdout carries nothing but slot
//! reports. `RUST_LOG` replaces the default filter when set.
//!
//! ```ignore
//! use medihunt_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::cli())?;
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    /// A global subscriber is already installed.
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    /// The filter directive does not parse.
    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// One short line per event.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

/// Crates whose events pass the default filter.
const DEFAULT_TARGETS: &[&str] = &[
    "medihunt",
    "medihunt_core",
    "medihunt_portal",
    "medihunt_hunter",
    "medihunt_cli",
];

/// Logging settings.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for medihunt crates when neither `RUST_LOG` nor `env_filter` is set.
    pub level: Level,
    /// Line format.
    pub format: TracingOutputFormat,
    /// Adds timestamps, targets and source locations.
    pub detailed: bool,
    /// Explicit filter directive, taking precedence over `RUST_LOG`.
    pub env_filter: Option<String>,
}

impl TracingConfig {
    /// Warnings and errors only, without decoration.
    #[must_use]
    pub fn cli() -> Self {
        Self {
            level: Level::WARN,
            format: TracingOutputFormat::Compact,
            detailed: false,
            env_filter: None,
        }
    }

    /// Everything down to debug, with timestamps and locations.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            level: Level::DEBUG,
            detailed: true,
            ..Self::cli()
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        match self.env_filter {
            Some(ref directive) => Ok(EnvFilter::try_new(directive)?),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive(self.level)))),
        }
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails when a subscriber is already installed or the filter directive
/// is invalid.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.filter()?;
    let detailed = config.detailed;

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(detailed)
        .with_line_number(detailed)
        .with_target(detailed);

    let layer = match (config.format, detailed) {
        (TracingOutputFormat::Json, _) => layer.json().boxed(),
        (TracingOutputFormat::Compact, true) => layer.compact().boxed(),
        (TracingOutputFormat::Compact, false) => layer.compact().without_time().boxed(),
    };

    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(filter).with(layer))?;
    Ok(())
}

fn default_directive(level: Level) -> String {
    DEFAULT_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_quiet_and_plain() {
        let config = TracingConfig::cli();
        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.format, TracingOutputFormat::Compact);
        assert!(!config.detailed);
        assert!(config.env_filter.is_none());
    }

    #[test]
    fn debug_adds_detail() {
        let config = TracingConfig::cli_debug().with_format(TracingOutputFormat::Json);
        assert_eq!(config.level, Level::DEBUG);
        assert!(config.detailed);
        assert_eq!(config.format, TracingOutputFormat::Json);
    }

    #[test]
    fn directive_names_every_crate() {
        let directive = default_directive(Level::DEBUG);
        for target in DEFAULT_TARGETS {
            assert!(directive.contains(&format!("{target}=DEBUG")));
        }
        assert!(EnvFilter::try_new(&directive).is_ok());
    }

    #[test]
    fn explicit_filter_is_validated() {
        assert!(TracingConfig::cli().with_env_filter("medihunt_portal=trace").filter().is_ok());
        assert!(matches!(
            TracingConfig::cli().with_env_filter("medihunt=notalevel").filter(),
            Err(TracingError::EnvFilter(_))
        ));
    }
}
