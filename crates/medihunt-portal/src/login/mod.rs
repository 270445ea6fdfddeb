//! Interactive browser login.
//!
//! When no usable tokens exist, a real browser is driven through the
//! portal's login form and the resulting tokens are captured, trying in
//! order:
//!
//! 1. the token endpoint response observed on the network
//! 2. token records left in local or session storage
//! 3. a bearer header on a later API request (access token only)
//!
//! The browser sits behind [`BrowserSession`] so the login sequence can be
//! exercised without one; [`WebDriverLauncher`] is the production backend.

mod browser;
mod capture;
mod driver;
mod webdriver;

use std::fmt;

pub use browser::{
    BrowserLauncher, BrowserSession, Locator, NetworkEvent, StorageArea, StorageEntry,
};
pub use capture::{token_from_exchange, token_from_request_headers, token_from_storage};
pub use driver::{InteractiveLogin, LoginVariant};
pub use webdriver::{WebDriverLauncher, WebDriverSession};

use crate::BoxFuture;
use crate::config::Credentials;
use crate::error::PortalResult;
use crate::tokens::TokenBundle;

/// The phase of the login sequence a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginStage {
    /// Starting the browser.
    Launch,
    /// Opening the portal and following the redirect to the login host.
    Navigate,
    /// Accepting or removing the cookie consent banner.
    DismissConsent,
    /// Filling and submitting the login form.
    FillCredentials,
    /// Capturing tokens after submission.
    CaptureToken,
}

impl LoginStage {
    /// Returns the stage name used in messages and artifact file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Launch => "launch",
            Self::Navigate => "navigate",
            Self::DismissConsent => "dismiss-consent",
            Self::FillCredentials => "fill-credentials",
            Self::CaptureToken => "capture-token",
        }
    }
}

impl fmt::Display for LoginStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Obtains a fresh token bundle by logging in with credentials.
pub trait LoginDriver: Send + Sync {
    /// Performs a full login. Failures are not retried.
    fn login<'a>(&'a self, credentials: &'a Credentials)
    -> BoxFuture<'a, PortalResult<TokenBundle>>;
}
