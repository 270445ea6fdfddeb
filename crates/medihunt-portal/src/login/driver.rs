//! The login sequence: navigate, dismiss consent, fill the form, capture.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};
use url::Url;

use super::browser::{BrowserLauncher, BrowserSession, Locator};
use super::capture::{CaptureSettings, STRATEGIES};
use super::{LoginDriver, LoginStage};
use crate::BoxFuture;
use crate::config::{Credentials, PortalConfig};
use crate::error::{PortalError, PortalResult};
use crate::tokens::TokenBundle;

const CONSENT_LOCATORS: &[Locator] = &[
    Locator::Css("#cmpwelcomebtnyes"),
    Locator::ButtonText("Akceptuję"),
    Locator::ButtonText("Zgadzam"),
    Locator::ButtonText("Accept"),
    Locator::Css("#cmpbntyestxt"),
    Locator::Css(".cmpboxbtnyes"),
];

const CONSENT_OVERLAYS: &[&str] = &["#cmpbox", "#cmpbox2", ".cmpboxBG"];

const USERNAME_LOCATORS: &[Locator] = &[
    Locator::Css("input[name=\"Input.Username\"]"),
    Locator::Css("input#Input_Username"),
    Locator::Css("input[autocomplete=\"username\"]"),
    Locator::Css("input[name=\"username\"]"),
    Locator::Css("input[type=\"text\"]"),
    Locator::Css("input[type=\"email\"]"),
];

const PASSWORD_LOCATORS: &[Locator] = &[
    Locator::Css("input[name=\"Input.Password\"]"),
    Locator::Css("input#Input_Password"),
    Locator::Css("input[autocomplete=\"current-password\"]"),
    Locator::Css("input[name=\"password\"]"),
    Locator::Css("input[type=\"password\"]"),
];

const PASSWORD_FIELD: Locator = Locator::Css("input[type=\"password\"]");

const SUBMIT_LOCATORS: &[Locator] = &[
    Locator::Css("button[type=\"submit\"]"),
    Locator::Css("input[type=\"submit\"]"),
    Locator::ButtonText("Zaloguj"),
    Locator::ButtonText("Dalej"),
    Locator::ButtonText("Next"),
    Locator::ButtonText("Login"),
];

const SHORT_PAUSE: Duration = Duration::from_millis(500);

/// Shape of the login form that was encountered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginVariant {
    /// Username and password on one page.
    SingleStep,
    /// Username first; the password field appears after submitting it.
    TwoStep,
}

/// Logs in by driving a browser through the portal's login form.
pub struct InteractiveLogin {
    launcher: Arc<dyn BrowserLauncher>,
    portal_home: String,
    login_host: String,
    token_path: String,
    overall_timeout: Duration,
    navigate_timeout: Duration,
    redirect_timeout: Duration,
    settle_delay: Duration,
    password_timeout: Duration,
    poll_interval: Duration,
    debug_dir: Option<PathBuf>,
    capture: CaptureSettings,
}

impl InteractiveLogin {
    /// Creates a login driver using `launcher` for browsers.
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: &PortalConfig) -> Self {
        let login = &config.login;
        let token_path = Url::parse(&config.token_url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| "/connect/token".to_string());
        Self {
            launcher,
            portal_home: config.portal_home.clone(),
            login_host: config.login_host.clone(),
            token_path: token_path.clone(),
            overall_timeout: login.overall_timeout,
            navigate_timeout: login.navigate_timeout,
            redirect_timeout: login.redirect_timeout,
            settle_delay: login.settle_delay,
            password_timeout: login.password_timeout,
            poll_interval: login.poll_interval,
            debug_dir: login.debug_dir.clone(),
            capture: CaptureSettings {
                token_path,
                portal_home: config.portal_home.clone(),
                intercept_timeout: login.capture_timeout.min(login.overall_timeout),
                settle_delay: login.settle_delay,
                sniff_timeout: login.sniff_timeout,
                sniff_settle: login.sniff_settle,
                poll_interval: login.poll_interval,
                debug_dir: login.debug_dir.clone(),
            },
        }
    }

    /// Path fragment identifying token endpoint traffic.
    pub fn token_path(&self) -> &str {
        &self.token_path
    }

    async fn run(&self, credentials: &Credentials) -> PortalResult<TokenBundle> {
        credentials.validate()?;
        info!("starting interactive login for {}", credentials.username);

        let mut browser = self
            .launcher
            .launch()
            .await
            .map_err(|e| e.at_stage(LoginStage::Launch))?;

        let result = match timeout(
            self.overall_timeout,
            self.drive(browser.as_mut(), credentials),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PortalError::login(
                LoginStage::CaptureToken,
                format!(
                    "login did not finish within {}s",
                    self.overall_timeout.as_secs()
                ),
            )),
        };

        if let Err(e) = browser.close().await {
            debug!("closing browser failed: {}", e);
        }
        result
    }

    async fn drive(
        &self,
        browser: &mut dyn BrowserSession,
        credentials: &Credentials,
    ) -> PortalResult<TokenBundle> {
        self.navigate(browser).await?;
        self.dismiss_consent(browser).await;
        let variant = self.fill_credentials(browser, credentials).await?;
        debug!(?variant, "login form submitted");
        self.capture_tokens(browser).await
    }

    async fn navigate(&self, browser: &mut dyn BrowserSession) -> PortalResult<()> {
        if let Err(e) = browser
            .navigate(&self.portal_home, self.navigate_timeout)
            .await
        {
            return Err(self
                .fail(browser, LoginStage::Navigate, "portal-unreachable", e.to_string())
                .await);
        }

        let deadline = Instant::now() + self.redirect_timeout;
        loop {
            let current = browser.current_url().await.unwrap_or_default();
            if host_of(&current).as_deref() == Some(self.login_host.as_str()) {
                debug!("reached login page {}", current);
                break;
            }
            if Instant::now() >= deadline {
                let message = format!(
                    "not redirected to {} within {}s (at '{}')",
                    self.login_host,
                    self.redirect_timeout.as_secs(),
                    current
                );
                return Err(self
                    .fail(browser, LoginStage::Navigate, "no-login-redirect", message)
                    .await);
            }
            sleep(self.poll_interval).await;
        }

        sleep(self.settle_delay).await;
        Ok(())
    }

    async fn dismiss_consent(&self, browser: &mut dyn BrowserSession) {
        match browser.click_first_visible(CONSENT_LOCATORS).await {
            Ok(true) => debug!("accepted cookie consent"),
            Ok(false) => debug!("no cookie consent banner"),
            Err(e) => debug!("consent click failed: {}", e),
        }
        sleep(SHORT_PAUSE).await;
        if let Err(e) = browser.remove_elements(CONSENT_OVERLAYS).await {
            debug!("removing consent overlays failed: {}", e);
        }
        sleep(SHORT_PAUSE).await;
    }

    async fn fill_credentials(
        &self,
        browser: &mut dyn BrowserSession,
        credentials: &Credentials,
    ) -> PortalResult<LoginVariant> {
        let stage = LoginStage::FillCredentials;

        let filled = browser
            .fill_first_visible(USERNAME_LOCATORS, &credentials.username)
            .await
            .map_err(|e| e.at_stage(stage))?;
        if !filled {
            let url = browser.current_url().await.unwrap_or_default();
            return Err(self
                .fail(
                    browser,
                    stage,
                    "no-username-field",
                    format!("username field not found on login page {}", url),
                )
                .await);
        }

        let filled = browser
            .fill_first_visible(PASSWORD_LOCATORS, &credentials.password)
            .await
            .map_err(|e| e.at_stage(stage))?;
        if filled {
            self.submit(browser).await?;
            return Ok(LoginVariant::SingleStep);
        }

        info!("password field not visible, continuing with two-step login");
        self.submit(browser).await?;

        if !self.wait_visible(browser, &PASSWORD_FIELD).await {
            return Err(self
                .fail(
                    browser,
                    stage,
                    "no-password-after-username",
                    "password field did not appear after submitting the username",
                )
                .await);
        }
        sleep(SHORT_PAUSE).await;

        let filled = browser
            .fill_first_visible(PASSWORD_LOCATORS, &credentials.password)
            .await
            .map_err(|e| e.at_stage(stage))?;
        if !filled {
            return Err(self
                .fail(
                    browser,
                    stage,
                    "password-not-fillable",
                    "password field appeared but could not be filled",
                )
                .await);
        }
        self.submit(browser).await?;
        Ok(LoginVariant::TwoStep)
    }

    async fn submit(&self, browser: &mut dyn BrowserSession) -> PortalResult<()> {
        let clicked = browser
            .click_first_visible(SUBMIT_LOCATORS)
            .await
            .map_err(|e| e.at_stage(LoginStage::FillCredentials))?;
        if !clicked {
            debug!("no submit button, pressing Enter");
            browser
                .press_enter()
                .await
                .map_err(|e| e.at_stage(LoginStage::FillCredentials))?;
        }
        Ok(())
    }

    async fn wait_visible(&self, browser: &mut dyn BrowserSession, locator: &Locator) -> bool {
        let deadline = Instant::now() + self.password_timeout;
        loop {
            if let Ok(true) = browser.is_visible(locator).await {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn capture_tokens(&self, browser: &mut dyn BrowserSession) -> PortalResult<TokenBundle> {
        for (name, strategy) in STRATEGIES {
            let name = *name;
            debug!(strategy = name, "attempting token capture");
            if let Some(bundle) = strategy(&mut *browser, &self.capture).await {
                if bundle.is_degraded() {
                    warn!(
                        strategy = name,
                        "captured access token only; a new login will be needed when it expires"
                    );
                } else {
                    info!(strategy = name, "captured tokens");
                }
                return Ok(bundle);
            }
        }
        Err(self
            .fail(
                browser,
                LoginStage::CaptureToken,
                "no-tokens",
                "no tokens captured after login (MFA, CAPTCHA or a changed login flow?)",
            )
            .await)
    }

    /// Builds a stage failure, saving diagnostic artifacts when enabled.
    async fn fail(
        &self,
        browser: &mut dyn BrowserSession,
        stage: LoginStage,
        label: &str,
        message: impl Into<String>,
    ) -> PortalError {
        let err = PortalError::login(stage, message);
        let Some(ref dir) = self.debug_dir else {
            return err;
        };
        let label = format!("{}-{}", stage, label);
        match browser.save_artifacts(dir, &label).await {
            Ok(()) => err.with_artifacts(dir),
            Err(e) => {
                warn!("failed to save login artifacts: {}", e);
                err
            }
        }
    }
}

impl LoginDriver for InteractiveLogin {
    fn login<'a>(
        &'a self,
        credentials: &'a Credentials,
    ) -> BoxFuture<'a, PortalResult<TokenBundle>> {
        Box::pin(self.run(credentials))
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}
