//! Command implementations.

pub mod auth;
pub mod config;
pub mod filters;
pub mod hunt;

use std::sync::Arc;

use medihunt_portal::login::BrowserLauncher;
use medihunt_portal::{
    InteractiveLogin, LoginDriver, OAuthClient, PortalClient, PortalConfig, TokenCache,
    TokenLifecycle, WebDriverLauncher,
};

use crate::cli::Cli;
use crate::config::MedihuntConfig;
use crate::error::CliResult;

/// Builds an authenticated client for the configured account.
///
/// Cached tokens are picked up here; the browser is only started when a
/// call needs a token that cannot be refreshed.
pub(crate) fn portal_client(config: &MedihuntConfig, cli: &Cli) -> CliResult<PortalClient> {
    let portal = config.portal_config(cli);
    portal.validate()?;
    let credentials = config.credentials(cli)?;

    let launcher: Arc<dyn BrowserLauncher> = Arc::new(WebDriverLauncher::new(&portal)?);
    let login: Arc<dyn LoginDriver> = Arc::new(InteractiveLogin::new(launcher, &portal));
    let oauth = OAuthClient::new(&portal)?;
    let lifecycle = TokenLifecycle::new(credentials, token_cache(&portal), oauth, login);

    Ok(PortalClient::new(portal, lifecycle)?)
}

pub(crate) fn token_cache(portal: &PortalConfig) -> TokenCache {
    TokenCache::new(portal.cache_dir.clone())
}
