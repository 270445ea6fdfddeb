//! Token lifecycle: keep a usable access token around.
//!
//! ```text
//!  Unauthenticated ──login──▶ Valid ──time passes──▶ Expiring
//!         ▲                     ▲                       │
//!         │                     └──────refresh──────────┤
//!         └────────────login (refresh failed/absent)────┘
//! ```
//!
//! Every successful refresh or login is written to the [`TokenCache`]
//! before the new token is handed out.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::Credentials;
use crate::error::{PortalError, PortalResult};
use crate::login::LoginDriver;
use crate::oauth::OAuthClient;
use crate::tokens::{TokenBundle, TokenCache};

/// Tokens are treated as expired this long before their real expiry.
pub const EXPIRY_MARGIN_SECS: i64 = 10;

/// The lifecycle state of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No tokens at all.
    Unauthenticated,
    /// The access token is usable.
    Valid,
    /// The access token is expired or inside the safety margin.
    Expiring,
}

/// Tokens currently in use, with their derived expiry.
#[derive(Debug, Clone)]
pub struct SessionState {
    bundle: TokenBundle,
    usable_until: DateTime<Utc>,
}

impl SessionState {
    /// Derives the session state from a bundle.
    pub fn from_bundle(bundle: TokenBundle, margin: Duration) -> Self {
        let usable_until = bundle.usable_until(margin);
        Self {
            bundle,
            usable_until,
        }
    }

    /// The access token.
    pub fn access_token(&self) -> &str {
        &self.bundle.access_token
    }

    /// The refresh token; empty for a degraded session.
    pub fn refresh_token(&self) -> &str {
        &self.bundle.refresh_token
    }

    /// Instant after which the access token must not be used.
    pub fn usable_until(&self) -> DateTime<Utc> {
        self.usable_until
    }

    /// Returns true if the access token is usable at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.usable_until
    }

    /// The underlying bundle.
    pub fn bundle(&self) -> &TokenBundle {
        &self.bundle
    }
}

/// Owns the session's tokens and renews them on demand.
pub struct TokenLifecycle {
    account: String,
    credentials: Credentials,
    cache: TokenCache,
    oauth: OAuthClient,
    login: Arc<dyn LoginDriver>,
    margin: Duration,
    state: Option<SessionState>,
}

impl TokenLifecycle {
    /// Creates a lifecycle for `credentials`, seeded from the cache.
    pub fn new(
        credentials: Credentials,
        cache: TokenCache,
        oauth: OAuthClient,
        login: Arc<dyn LoginDriver>,
    ) -> Self {
        let account = credentials.username.trim().to_string();
        let margin = Duration::seconds(EXPIRY_MARGIN_SECS);
        let state = cache.load(&account).map(|bundle| {
            debug!("using cached tokens for {}", account);
            SessionState::from_bundle(bundle, margin)
        });
        Self {
            account,
            credentials,
            cache,
            oauth,
            login,
            margin,
            state,
        }
    }

    /// Account the tokens belong to.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// The current session, if any.
    pub fn session(&self) -> Option<&SessionState> {
        self.state.as_ref()
    }

    /// The lifecycle state at this instant.
    pub fn state(&self) -> AuthState {
        self.state_at(Utc::now())
    }

    fn state_at(&self, now: DateTime<Utc>) -> AuthState {
        match &self.state {
            None => AuthState::Unauthenticated,
            Some(s) if s.is_valid_at(now) => AuthState::Valid,
            Some(_) => AuthState::Expiring,
        }
    }

    /// Returns a usable access token, refreshing or logging in as needed.
    ///
    /// A failed refresh falls back to the interactive login; a failed login
    /// is returned as is.
    pub async fn ensure_valid(&mut self) -> PortalResult<String> {
        if let Some(token) = self.valid_token(Utc::now()) {
            return Ok(token);
        }

        let can_refresh = self
            .state
            .as_ref()
            .is_some_and(|s| !s.refresh_token().trim().is_empty());
        if can_refresh {
            match self.refresh().await {
                Ok(()) => {
                    if let Some(token) = self.valid_token(Utc::now()) {
                        return Ok(token);
                    }
                    warn!("refreshed token is already expired, logging in again");
                }
                Err(e) => {
                    warn!("token refresh failed, logging in again: {}", e);
                    self.state = None;
                }
            }
        } else if self.state.is_some() {
            info!("access token expired and no refresh token is available, logging in again");
        }

        self.login().await?;
        self.valid_token(Utc::now()).ok_or_else(|| {
            PortalError::authentication("newly captured access token is already expired")
        })
    }

    /// Exchanges the refresh token for new tokens and persists them.
    ///
    /// The newest refresh token is always kept: the one in the response when
    /// the server rotates it, otherwise the one just used.
    pub async fn refresh(&mut self) -> PortalResult<()> {
        let current = self
            .state
            .as_ref()
            .map(|s| s.refresh_token().to_string())
            .unwrap_or_default();
        let mut bundle = self.oauth.refresh(&current).await?;
        if bundle.refresh_token.trim().is_empty() {
            bundle.refresh_token = current;
        }
        self.adopt(bundle);
        Ok(())
    }

    /// Runs the interactive login and persists the captured tokens.
    pub async fn login(&mut self) -> PortalResult<()> {
        let bundle = self.login.login(&self.credentials).await?;
        if bundle.access_token.trim().is_empty() {
            return Err(PortalError::authentication("login returned an empty access token"));
        }
        self.adopt(bundle);
        Ok(())
    }

    /// Forgets the tokens in memory and on disk.
    pub fn clear(&mut self) -> PortalResult<bool> {
        self.state = None;
        self.cache.clear(&self.account)
    }

    fn adopt(&mut self, bundle: TokenBundle) {
        match self.cache.save(&self.account, &bundle) {
            Ok(path) => debug!("persisted tokens to {:?}", path),
            Err(e) => warn!("tokens could not be persisted: {}", e),
        }
        let state = SessionState::from_bundle(bundle, self.margin);
        debug!(
            usable_until = %state.usable_until(),
            degraded = state.bundle().is_degraded(),
            "session updated"
        );
        self.state = Some(state);
    }

    fn valid_token(&self, now: DateTime<Utc>) -> Option<String> {
        self.state
            .as_ref()
            .filter(|s| s.is_valid_at(now))
            .map(|s| s.access_token().to_string())
    }
}
