//! CLI configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/medihunt/config.toml` by default. Command-line flags and
//! environment variables take precedence over the file.
//!
//! Account values (`username`, `password`) support secret references:
//! - `pass::path/in/store` resolved via `pass show`
//! - `env::VAR_NAME` resolved from the environment
//! - plain text used as-is

use std::path::{Path, PathBuf};
use std::time::Duration;

use medihunt_core::OutputFormat;
use medihunt_portal::{Credentials, PortalConfig};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::{CliError, CliResult};

// ---------------------------------------------------------------------------
// MedihuntConfig (config.toml)
// ---------------------------------------------------------------------------

/// Configuration for medihunt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MedihuntConfig {
    /// Portal account.
    pub account: AccountSettings,

    /// Defaults for the `hunt` command.
    pub hunt: HuntSettings,

    /// Portal and browser settings.
    pub portal: PortalSettings,
}

/// Portal account settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSettings {
    /// Username (supports `pass::` and `env::` prefixes).
    pub username: Option<String>,

    /// Password (supports `pass::` and `env::` prefixes).
    pub password: Option<String>,
}

/// Defaults for the `hunt` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HuntSettings {
    /// Region name.
    pub region: Option<String>,

    /// Specialty name.
    pub specialty: Option<String>,

    /// Doctor name or numeric id.
    pub doctor: Option<String>,

    /// Number of days searched per cycle.
    pub days: u32,

    /// Seconds between cycles.
    pub interval: u64,

    /// Slots page size.
    pub page_size: u32,

    /// Report format.
    pub format: OutputFormat,
}

impl Default for HuntSettings {
    fn default() -> Self {
        Self {
            region: None,
            specialty: None,
            doctor: None,
            days: 14,
            interval: 60,
            page_size: 500,
            format: OutputFormat::Text,
        }
    }
}

/// Portal and browser settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalSettings {
    /// WebDriver endpoint used for the interactive login.
    pub webdriver_url: String,

    /// Run the browser without a window.
    pub headless: bool,

    /// Directory for login failure artifacts.
    pub debug_dir: Option<PathBuf>,

    /// Directory holding cached tokens.
    pub cache_dir: Option<PathBuf>,

    /// Timeout of API requests, in seconds.
    pub request_timeout: u64,

    /// Upper bound for the whole interactive login, in seconds.
    pub login_timeout: u64,
}

impl Default for PortalSettings {
    fn default() -> Self {
        let portal = PortalConfig::default();
        Self {
            webdriver_url: portal.login.webdriver_url,
            headless: portal.login.headless,
            debug_dir: None,
            cache_dir: None,
            request_timeout: portal.timeout.as_secs(),
            login_timeout: portal.login.overall_timeout.as_secs(),
        }
    }
}

impl MedihuntConfig {
    /// Loads configuration from the default path, if it exists.
    pub fn load() -> CliResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parses TOML content.
    pub fn parse(content: &str) -> CliResult<Self> {
        toml::from_str(content).map_err(|e| CliError::Config(format!("failed to parse config: {}", e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("medihunt")
    }

    /// Resolves the account credentials.
    ///
    /// Flags and `MEDICOVER_USER`/`MEDICOVER_PASS` win over `[account]`.
    pub fn credentials(&self, cli: &Cli) -> CliResult<Credentials> {
        let username = pick_secret(cli.user.as_deref(), self.account.username.as_deref(), "username")?;
        let password = pick_secret(cli.password.as_deref(), self.account.password.as_deref(), "password")?;
        match (username, password) {
            (Some(username), Some(password)) => {
                let credentials = Credentials::new(username, password);
                credentials.validate()?;
                Ok(credentials)
            }
            _ => Err(CliError::Config(format!(
                "missing credentials: set MEDICOVER_USER and MEDICOVER_PASS or add \
                 username/password to [account] in {}",
                Self::default_path().display()
            ))),
        }
    }

    /// Only the username, for commands that never talk to the portal.
    pub fn username(&self, cli: &Cli) -> CliResult<String> {
        pick_secret(cli.user.as_deref(), self.account.username.as_deref(), "username")?
            .ok_or_else(|| CliError::Config("missing username: set MEDICOVER_USER".to_string()))
    }

    /// Builds the portal configuration from `[portal]` and the flags.
    pub fn portal_config(&self, cli: &Cli) -> PortalConfig {
        let mut config = PortalConfig::default();
        config.timeout = Duration::from_secs(self.portal.request_timeout.max(1));
        if let Some(dir) = cli.cache_dir.as_ref().or(self.portal.cache_dir.as_ref()) {
            config = config.with_cache_dir(dir);
        }

        let login = &mut config.login;
        login.webdriver_url = cli
            .webdriver_url
            .clone()
            .unwrap_or_else(|| self.portal.webdriver_url.clone());
        login.headless = self.portal.headless && !cli.headed;
        login.overall_timeout = Duration::from_secs(self.portal.login_timeout.max(1));
        login.debug_dir = cli.debug_dir.clone().or_else(|| self.portal.debug_dir.clone());
        config
    }
}

/// Takes the flag value, else the resolved file value.
fn pick_secret(flag: Option<&str>, file: Option<&str>, what: &str) -> CliResult<Option<String>> {
    if let Some(value) = flag.filter(|v| !v.trim().is_empty()) {
        return Ok(Some(value.to_string()));
    }
    match file {
        Some(raw) => crate::secret::resolve(raw)
            .map(Some)
            .map_err(|e| CliError::Config(format!("failed to resolve {}: {}", what, e))),
        None => Ok(None),
    }
}
