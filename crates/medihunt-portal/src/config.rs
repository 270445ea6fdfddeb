//! Portal endpoints, timeouts and account credentials.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{PortalError, PortalResult};

/// Landing page of the patient portal; redirects to the login host.
pub const PORTAL_HOME: &str = "https://online24.medicover.pl/home";
/// Origin sent with API requests.
pub const PORTAL_ORIGIN: &str = "https://online24.medicover.pl";
/// Host serving the login form.
pub const LOGIN_HOST: &str = "login-online24.medicover.pl";
/// OAuth token endpoint.
pub const TOKEN_URL: &str = "https://oauth.medicover.pl/connect/token";
/// Base URL of the appointments API gateway.
pub const API_GATEWAY: &str = "https://api-gateway-online24.medicover.pl";
/// Endpoint returning the profiles available to the signed-in account.
pub const PROFILE_URL: &str = "https://login-online24.medicover.pl/api/v4/available-profiles/me";
/// OAuth client id used by the web portal.
pub const CLIENT_ID: &str = "web";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Username and password for the portal account.
#[derive(Clone)]
pub struct Credentials {
    /// Account username (card number or e-mail).
    pub username: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Creates a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns an error if either field is empty.
    pub fn validate(&self) -> PortalResult<()> {
        if self.username.trim().is_empty() {
            return Err(PortalError::configuration("username is required"));
        }
        if self.password.is_empty() {
            return Err(PortalError::configuration("password is required"));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Timeouts and switches for the interactive browser login.
#[derive(Debug, Clone)]
pub struct LoginConfig {
    /// WebDriver server (chromedriver) URL.
    pub webdriver_url: String,
    /// Run the browser without a window.
    pub headless: bool,
    /// Browser locale, also sent as the accepted language.
    pub locale: String,
    /// Upper bound for the whole login.
    pub overall_timeout: Duration,
    /// Page load timeout for the portal landing page.
    pub navigate_timeout: Duration,
    /// How long to wait for the redirect to the login host.
    pub redirect_timeout: Duration,
    /// Pause after the login page is reached.
    pub settle_delay: Duration,
    /// How long to wait for the password field in a two-step login.
    pub password_timeout: Duration,
    /// Upper bound for observing the token exchange.
    pub capture_timeout: Duration,
    /// Page load timeout when revisiting the portal for header sniffing.
    pub sniff_timeout: Duration,
    /// Pause after revisiting the portal, before reading request headers.
    pub sniff_settle: Duration,
    /// Polling interval for waits.
    pub poll_interval: Duration,
    /// Timeout for a single WebDriver command.
    pub command_timeout: Duration,
    /// Where to write screenshots, page sources and storage dumps.
    pub debug_dir: Option<PathBuf>,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            locale: "pl-PL".to_string(),
            overall_timeout: Duration::from_secs(180),
            navigate_timeout: Duration::from_secs(30),
            redirect_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(2),
            password_timeout: Duration::from_secs(15),
            capture_timeout: Duration::from_secs(30),
            sniff_timeout: Duration::from_secs(20),
            sniff_settle: Duration::from_secs(3),
            poll_interval: Duration::from_millis(500),
            command_timeout: Duration::from_secs(60),
            debug_dir: None,
        }
    }
}

/// Configuration for talking to the portal.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Landing page that triggers the login redirect.
    pub portal_home: String,
    /// Origin header value for API calls.
    pub origin: String,
    /// Host of the login form.
    pub login_host: String,
    /// OAuth token endpoint.
    pub token_url: String,
    /// Appointments API gateway base URL.
    pub api_gateway: String,
    /// Profile endpoint used to verify a session.
    pub profile_url: String,
    /// OAuth client id.
    pub client_id: String,
    /// User agent for API calls and the browser.
    pub user_agent: String,
    /// Timeout for API requests.
    pub timeout: Duration,
    /// Timeout for token endpoint requests.
    pub token_timeout: Duration,
    /// Root directory of the token cache.
    pub cache_dir: PathBuf,
    /// Interactive login settings.
    pub login: LoginConfig,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            portal_home: PORTAL_HOME.to_string(),
            origin: PORTAL_ORIGIN.to_string(),
            login_host: LOGIN_HOST.to_string(),
            token_url: TOKEN_URL.to_string(),
            api_gateway: API_GATEWAY.to_string(),
            profile_url: PROFILE_URL.to_string(),
            client_id: CLIENT_ID.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            token_timeout: Duration::from_secs(20),
            cache_dir: default_cache_dir(),
            login: LoginConfig::default(),
        }
    }
}

impl PortalConfig {
    /// Points every API endpoint at `base`, keeping the paths.
    ///
    /// Used to run the client against a local mock server.
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.origin = base.to_string();
        self.portal_home = format!("{}/home", base);
        self.token_url = format!("{}/connect/token", base);
        self.api_gateway = base.to_string();
        self.profile_url = format!("{}/api/v4/available-profiles/me", base);
        self
    }

    /// Sets the token cache root.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// URL of the search filters endpoint.
    pub fn filters_url(&self) -> String {
        format!(
            "{}/appointments/api/v2/search-appointments/filters",
            self.api_gateway
        )
    }

    /// URL of the slot search endpoint.
    pub fn slots_url(&self) -> String {
        format!(
            "{}/appointments/api/v2/search-appointments/slots",
            self.api_gateway
        )
    }

    /// Checks that every endpoint is an absolute http(s) URL.
    pub fn validate(&self) -> PortalResult<()> {
        for (name, value) in [
            ("portal_home", &self.portal_home),
            ("origin", &self.origin),
            ("token_url", &self.token_url),
            ("api_gateway", &self.api_gateway),
            ("profile_url", &self.profile_url),
            ("webdriver_url", &self.login.webdriver_url),
        ] {
            let url = Url::parse(value).map_err(|e| {
                PortalError::configuration(format!("invalid {} '{}': {}", name, value, e))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(PortalError::configuration(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, value
                )));
            }
        }
        if self.client_id.is_empty() {
            return Err(PortalError::configuration("client_id is required"));
        }
        Ok(())
    }
}

/// Default token cache root: `~/.cache/medihunt`.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("medihunt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoints() {
        let config = PortalConfig::default();
        assert_eq!(
            config.slots_url(),
            "https://api-gateway-online24.medicover.pl/appointments/api/v2/search-appointments/slots"
        );
        assert_eq!(config.client_id, "web");
        assert_eq!(config.login.overall_timeout, Duration::from_secs(180));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn base_url_override() {
        let config = PortalConfig::default().with_base_url("http://127.0.0.1:4000/");
        assert_eq!(config.token_url, "http://127.0.0.1:4000/connect/token");
        assert_eq!(
            config.filters_url(),
            "http://127.0.0.1:4000/appointments/api/v2/search-appointments/filters"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_endpoint_rejected() {
        let mut config = PortalConfig::default();
        config.token_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = PortalConfig::default();
        config.api_gateway = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials::new("123456", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("123456"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn credentials_validation() {
        assert!(Credentials::new("user", "pass").validate().is_ok());
        assert!(Credentials::new(" ", "pass").validate().is_err());
        assert!(Credentials::new("user", "").validate().is_err());
    }
}
