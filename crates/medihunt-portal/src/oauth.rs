//! OAuth 2.0 token endpoint client.
//!
//! The portal's public `web` client uses the authorization code flow with
//! PKCE, driven by the portal itself in the interactive login. This client
//! only handles the refresh grant afterwards.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::PortalConfig;
use crate::error::{PortalError, PortalResult};
use crate::tokens::TokenBundle;

/// Client for the OAuth token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http_client: reqwest::Client,
    token_url: String,
    client_id: String,
}

impl OAuthClient {
    /// Creates a client for the token endpoint in `config`.
    pub fn new(config: &PortalConfig) -> PortalResult<Self> {
        Self::with_endpoint(
            &config.token_url,
            &config.client_id,
            &config.user_agent,
            config.token_timeout,
        )
    }

    /// Creates a client for an explicit token endpoint.
    pub fn with_endpoint(
        token_url: &str,
        client_id: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> PortalResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| {
                PortalError::internal("failed to create HTTP client").with_source(e)
            })?;

        Ok(Self {
            http_client,
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
        })
    }

    /// Exchanges a refresh token for a new bundle.
    ///
    /// The returned bundle carries the refresh token from the response,
    /// which is empty when the server did not rotate it.
    pub async fn refresh(&self, refresh_token: &str) -> PortalResult<TokenBundle> {
        if refresh_token.trim().is_empty() {
            return Err(PortalError::authentication("no refresh token available"));
        }
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
        ];
        let bundle = self.request_tokens(&params, "token refresh").await?;
        info!("refreshed access token");
        Ok(bundle)
    }

    async fn request_tokens(
        &self,
        params: &[(&str, &str)],
        what: &str,
    ) -> PortalResult<TokenBundle> {
        debug!("POST {} ({})", self.token_url, what);
        let response = self
            .http_client
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(params)
            .send()
            .await
            .map_err(|e| PortalError::transport("token", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PortalError::network(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(PortalError::authentication(format!(
                "{} failed ({}): {}",
                what,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let response: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            PortalError::invalid_response(format!("invalid token response: {}", e))
        })?;

        if response.access_token.trim().is_empty() {
            return Err(PortalError::invalid_response(
                "token response has an empty access_token",
            ));
        }

        Ok(response.into_bundle())
    }
}

/// Response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

impl TokenResponse {
    fn into_bundle(self) -> TokenBundle {
        TokenBundle::new(
            self.access_token,
            self.refresh_token.unwrap_or_default(),
            self.expires_in,
        )
        .with_scope(self.scope)
        .with_token_type(self.token_type)
    }
}
