//! Authentication commands.

use chrono::Local;
use tracing::{debug, info, warn};

use crate::cli::Cli;
use crate::config::MedihuntConfig;
use crate::error::CliResult;

/// Runs the interactive login, checks the session and caches the tokens.
///
/// Always starts the browser, even when cached tokens are still valid.
pub async fn login(config: &MedihuntConfig, cli: &Cli) -> CliResult<()> {
    let portal = config.portal_config(cli);
    let mut client = super::portal_client(config, cli)?;

    eprintln!("Starting browser login via {}...", portal.login.webdriver_url);
    client.session_mut().login().await?;

    let profile = client.verify_session().await?;
    debug!(%profile, "available profiles");
    info!("portal accepted the new session");

    let account = client.session().account().to_string();
    println!("Logged in as {}.", account);
    if let Some(session) = client.session().session() {
        if session.bundle().is_degraded() {
            warn!("only an access token was captured; the next expiry needs a new browser login");
            println!("Only an access token was captured; it cannot be refreshed.");
        }
        println!(
            "Access token usable until {}.",
            session
                .usable_until()
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!(
        "Tokens cached in {}",
        super::token_cache(&portal).path_for(&account).display()
    );
    Ok(())
}

/// Removes cached tokens for the configured account.
pub fn logout(config: &MedihuntConfig, cli: &Cli) -> CliResult<()> {
    let portal = config.portal_config(cli);
    let username = config.username(cli)?;
    let account = username.trim();
    let cache = super::token_cache(&portal);

    if cache.clear(account)? {
        println!("Removed cached tokens for {}.", account);
    } else {
        println!("No cached tokens for {}.", account);
    }
    Ok(())
}
