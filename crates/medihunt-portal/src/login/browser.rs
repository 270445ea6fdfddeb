//! Browser automation seam used by the login sequence.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::BoxFuture;
use crate::error::PortalResult;

/// How to find an element on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    /// A CSS selector.
    Css(&'static str),
    /// A `<button>` whose visible text contains the given string.
    ButtonText(&'static str),
}

/// Which web storage an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageArea {
    /// `window.localStorage`.
    Local,
    /// `window.sessionStorage`.
    Session,
}

/// One key/value pair from web storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    /// Storage the entry was read from.
    pub area: StorageArea,
    /// Storage key.
    pub key: String,
    /// Raw stored value.
    #[serde(default)]
    pub value: String,
}

impl StorageEntry {
    /// Creates an entry.
    pub fn new(area: StorageArea, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            area,
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Network traffic observed by the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// An outgoing request. Header names are lower-case.
    Request {
        method: String,
        url: String,
        headers: HashMap<String, String>,
    },
    /// A completed response. The body is only captured for JSON responses
    /// to POST requests.
    Response {
        method: String,
        url: String,
        status: u16,
        content_type: Option<String>,
        body: Option<String>,
    },
}

/// A live browser page.
///
/// Methods that look up elements report `false` instead of failing when no
/// visible element matches; errors mean the browser itself misbehaved.
pub trait BrowserSession: Send {
    /// Loads `url`, waiting at most `timeout` for the document.
    fn navigate<'a>(&'a mut self, url: &'a str, timeout: Duration)
    -> BoxFuture<'a, PortalResult<()>>;

    /// Returns the URL of the current page.
    fn current_url(&mut self) -> BoxFuture<'_, PortalResult<String>>;

    /// Replaces the content of the first visible match with `value`.
    fn fill_first_visible<'a>(
        &'a mut self,
        locators: &'a [Locator],
        value: &'a str,
    ) -> BoxFuture<'a, PortalResult<bool>>;

    /// Clicks the first visible match.
    fn click_first_visible<'a>(
        &'a mut self,
        locators: &'a [Locator],
    ) -> BoxFuture<'a, PortalResult<bool>>;

    /// Returns true if a visible element matches `locator`.
    fn is_visible<'a>(&'a mut self, locator: &'a Locator) -> BoxFuture<'a, PortalResult<bool>>;

    /// Presses Enter in the focused element.
    fn press_enter(&mut self) -> BoxFuture<'_, PortalResult<()>>;

    /// Removes every element matching any of the CSS selectors.
    fn remove_elements<'a>(&'a mut self, selectors: &'a [&'a str])
    -> BoxFuture<'a, PortalResult<()>>;

    /// Reads every local and session storage entry.
    fn storage_entries(&mut self) -> BoxFuture<'_, PortalResult<Vec<StorageEntry>>>;

    /// Returns network events observed since the previous call.
    fn drain_network(&mut self) -> BoxFuture<'_, PortalResult<Vec<NetworkEvent>>>;

    /// Writes a screenshot, the page source and the URL into `dir`, with
    /// file names starting with `label`.
    fn save_artifacts<'a>(&'a mut self, dir: &'a Path, label: &'a str)
    -> BoxFuture<'a, PortalResult<()>>;

    /// Shuts the browser down.
    fn close(self: Box<Self>) -> BoxFuture<'static, PortalResult<()>>;
}

/// Starts browser sessions.
pub trait BrowserLauncher: Send + Sync {
    /// Launches a fresh browser with an empty profile.
    fn launch(&self) -> BoxFuture<'_, PortalResult<Box<dyn BrowserSession>>>;
}
