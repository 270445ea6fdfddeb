//! Token capture after the login form is submitted.
//!
//! Strategies run in order and the first bundle found wins. Each strategy
//! swallows its own failures: a broken strategy only means the next one
//! gets a chance.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use super::browser::{BrowserSession, NetworkEvent, StorageEntry};
use crate::BoxFuture;
use crate::tokens::TokenBundle;

/// Substrings marking storage keys that may hold tokens.
const STORAGE_KEY_HINTS: &[&str] = &["token", "oidc", "auth"];

/// Authorization header values at or below this length are ignored.
const MIN_AUTH_HEADER_LEN: usize = 50;

/// Knobs shared by the capture strategies.
#[derive(Debug, Clone)]
pub(crate) struct CaptureSettings {
    pub token_path: String,
    pub portal_home: String,
    pub intercept_timeout: Duration,
    pub settle_delay: Duration,
    pub sniff_timeout: Duration,
    pub sniff_settle: Duration,
    pub poll_interval: Duration,
    pub debug_dir: Option<PathBuf>,
}

pub(crate) type Strategy =
    for<'a> fn(&'a mut dyn BrowserSession, &'a CaptureSettings) -> BoxFuture<'a, Option<TokenBundle>>;

/// Capture strategies in the order they are attempted.
pub(crate) const STRATEGIES: &[(&str, Strategy)] = &[
    ("network-intercept", network_intercept as Strategy),
    ("storage-scrape", storage_scrape as Strategy),
    ("header-sniff", header_sniff as Strategy),
];

fn network_intercept<'a>(
    browser: &'a mut dyn BrowserSession,
    settings: &'a CaptureSettings,
) -> BoxFuture<'a, Option<TokenBundle>> {
    Box::pin(async move {
        let deadline = Instant::now() + settings.intercept_timeout;
        loop {
            match browser.drain_network().await {
                Ok(events) => {
                    if let Some(bundle) = events
                        .iter()
                        .find_map(|event| token_from_exchange(event, &settings.token_path))
                    {
                        return Some(bundle);
                    }
                }
                Err(e) => {
                    debug!("network observation failed: {}", e);
                    return None;
                }
            }
            if Instant::now() >= deadline {
                debug!("no token exchange observed");
                return None;
            }
            sleep(settings.poll_interval).await;
        }
    })
}

fn storage_scrape<'a>(
    browser: &'a mut dyn BrowserSession,
    settings: &'a CaptureSettings,
) -> BoxFuture<'a, Option<TokenBundle>> {
    Box::pin(async move {
        sleep(settings.settle_delay).await;
        let entries = match browser.storage_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("reading web storage failed: {}", e);
                return None;
            }
        };
        if let Some(ref dir) = settings.debug_dir {
            dump_storage(dir, &entries);
        }
        token_from_storage(&entries)
    })
}

fn header_sniff<'a>(
    browser: &'a mut dyn BrowserSession,
    settings: &'a CaptureSettings,
) -> BoxFuture<'a, Option<TokenBundle>> {
    Box::pin(async move {
        if let Err(e) = browser
            .navigate(&settings.portal_home, settings.sniff_timeout)
            .await
        {
            debug!("revisiting portal failed: {}", e);
        }
        sleep(settings.sniff_settle).await;
        match browser.drain_network().await {
            Ok(events) => events.iter().find_map(token_from_request_headers),
            Err(e) => {
                debug!("network observation failed: {}", e);
                None
            }
        }
    })
}

fn dump_storage(dir: &std::path::Path, entries: &[StorageEntry]) {
    let path = dir.join("storage-dump.json");
    let written = std::fs::create_dir_all(dir).and_then(|()| {
        let content = serde_json::to_string_pretty(entries).map_err(std::io::Error::other)?;
        std::fs::write(&path, content)
    });
    match written {
        Ok(()) => debug!("wrote storage dump to {:?}", path),
        Err(e) => warn!("failed to write storage dump {:?}: {}", path, e),
    }
}

/// Extracts a full bundle from an observed token endpoint response.
///
/// Only successful JSON responses to POST requests whose URL contains
/// `token_path`, carrying both an access and a refresh token, qualify.
pub fn token_from_exchange(event: &NetworkEvent, token_path: &str) -> Option<TokenBundle> {
    let NetworkEvent::Response {
        method,
        url,
        status,
        content_type,
        body,
    } = event
    else {
        return None;
    };
    if !method.eq_ignore_ascii_case("POST") || !url.contains(token_path) {
        return None;
    }
    if !(200..300).contains(status) {
        return None;
    }
    let is_json = content_type
        .as_deref()
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"));
    if !is_json {
        return None;
    }
    let value: Value = serde_json::from_str(body.as_deref()?).ok()?;
    let record = TokenRecord::from_value(&value)?;
    if record.refresh_token.is_empty() {
        return None;
    }
    Some(record.into_bundle())
}

/// Extracts a bundle from web storage.
///
/// Only keys mentioning a token, OIDC or auth are inspected. A record with
/// both tokens wins; otherwise the first record with an access token is
/// returned as a degraded bundle.
pub fn token_from_storage(entries: &[StorageEntry]) -> Option<TokenBundle> {
    let mut partial = None;
    for entry in entries {
        let key = entry.key.to_ascii_lowercase();
        if !STORAGE_KEY_HINTS.iter().any(|hint| key.contains(hint)) {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(&entry.value) else {
            continue;
        };
        let Some(record) = TokenRecord::from_value(&value) else {
            continue;
        };
        if !record.refresh_token.is_empty() {
            debug!(key = %entry.key, "found token record in storage");
            return Some(record.into_bundle());
        }
        partial.get_or_insert(record);
    }
    partial.map(TokenRecord::into_bundle)
}

/// Extracts an access token from an outgoing request's bearer header.
pub fn token_from_request_headers(event: &NetworkEvent) -> Option<TokenBundle> {
    let NetworkEvent::Request { headers, .. } = event else {
        return None;
    };
    let value = headers.get("authorization")?.trim();
    if value.len() <= MIN_AUTH_HEADER_LEN {
        return None;
    }
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| TokenBundle::degraded(token))
}

/// Token fields pulled out of a loosely shaped JSON object.
struct TokenRecord {
    access_token: String,
    refresh_token: String,
    expires_in: Option<i64>,
    scope: Option<String>,
    token_type: Option<String>,
}

impl TokenRecord {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let access_token = string_field(obj, &["access_token", "accessToken"])?;
        let expires_in = int_field(obj, &["expires_in", "expiresIn"]).or_else(|| {
            int_field(obj, &["expires_at", "expiresAt"])
                .map(|at| at.saturating_sub(Utc::now().timestamp()).max(0))
        });
        Some(Self {
            access_token,
            refresh_token: string_field(obj, &["refresh_token", "refreshToken"])
                .unwrap_or_default(),
            expires_in,
            scope: string_field(obj, &["scope"]),
            token_type: string_field(obj, &["token_type", "tokenType"]),
        })
    }

    fn into_bundle(self) -> TokenBundle {
        TokenBundle::new(self.access_token, self.refresh_token, self.expires_in)
            .with_scope(self.scope)
            .with_token_type(self.token_type)
    }
}

fn string_field(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| obj.get(*name)?.as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

fn int_field(obj: &Map<String, Value>, names: &[&str]) -> Option<i64> {
    names.iter().find_map(|name| match obj.get(*name)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::login::browser::StorageArea;

    const TOKEN_PATH: &str = "/connect/token";

    fn token_response(url: &str, body: &str) -> NetworkEvent {
        NetworkEvent::Response {
            method: "POST".to_string(),
            url: url.to_string(),
            status: 200,
            content_type: Some("application/json; charset=utf-8".to_string()),
            body: Some(body.to_string()),
        }
    }

    fn request_with_auth(value: &str) -> NetworkEvent {
        NetworkEvent::Request {
            method: "GET".to_string(),
            url: "https://api-gateway-online24.medicover.pl/x".to_string(),
            headers: HashMap::from([("authorization".to_string(), value.to_string())]),
        }
    }

    #[test]
    fn exchange_with_both_tokens_is_captured() {
        let event = token_response(
            "https://oauth.medicover.pl/connect/token",
            r#"{"access_token":"A","refresh_token":"R","expires_in":300,"token_type":"Bearer"}"#,
        );
        let bundle = token_from_exchange(&event, TOKEN_PATH).unwrap();
        assert_eq!(bundle.access_token, "A");
        assert_eq!(bundle.refresh_token, "R");
        assert_eq!(bundle.expires_in, Some(300));
    }

    #[test]
    fn exchange_without_refresh_token_is_skipped() {
        let event = token_response(
            "https://oauth.medicover.pl/connect/token",
            r#"{"access_token":"A","refresh_token":""}"#,
        );
        assert!(token_from_exchange(&event, TOKEN_PATH).is_none());
    }

    #[test]
    fn exchange_filters_on_method_url_status_and_type() {
        let body = r#"{"access_token":"A","refresh_token":"R"}"#;
        assert!(token_from_exchange(&token_response("https://x/other", body), TOKEN_PATH).is_none());

        let NetworkEvent::Response { url, content_type, body, .. } =
            token_response("https://oauth.medicover.pl/connect/token", body)
        else {
            unreachable!()
        };
        let get = NetworkEvent::Response {
            method: "GET".to_string(),
            url: url.clone(),
            status: 200,
            content_type: content_type.clone(),
            body: body.clone(),
        };
        assert!(token_from_exchange(&get, TOKEN_PATH).is_none());

        let failed = NetworkEvent::Response {
            method: "POST".to_string(),
            url: url.clone(),
            status: 400,
            content_type: content_type.clone(),
            body: body.clone(),
        };
        assert!(token_from_exchange(&failed, TOKEN_PATH).is_none());

        let html = NetworkEvent::Response {
            method: "POST".to_string(),
            url,
            status: 200,
            content_type: Some("text/html".to_string()),
            body,
        };
        assert!(token_from_exchange(&html, TOKEN_PATH).is_none());
    }

    #[test]
    fn storage_prefers_full_records() {
        let entries = vec![
            StorageEntry::new(StorageArea::Local, "theme", r#"{"access_token":"X","refresh_token":"Y"}"#),
            StorageEntry::new(StorageArea::Local, "authState", r#"{"accessToken":"A1"}"#),
            StorageEntry::new(
                StorageArea::Session,
                "oidc.user:https://oauth.medicover.pl:web",
                r#"{"access_token":"A2","refresh_token":"R2","expires_in":"600"}"#,
            ),
        ];
        let bundle = token_from_storage(&entries).unwrap();
        assert_eq!(bundle.access_token, "A2");
        assert_eq!(bundle.refresh_token, "R2");
        assert_eq!(bundle.expires_in, Some(600));
    }

    #[test]
    fn storage_accepts_access_only_record() {
        let entries = vec![
            StorageEntry::new(StorageArea::Local, "token", "not json"),
            StorageEntry::new(StorageArea::Local, "AuthData", r#"{"accessToken":"A1","expiresIn":300}"#),
        ];
        let bundle = token_from_storage(&entries).unwrap();
        assert_eq!(bundle.access_token, "A1");
        assert!(bundle.is_degraded());
        assert_eq!(bundle.expires_in, Some(300));
    }

    #[test]
    fn storage_converts_absolute_expiry() {
        let at = Utc::now().timestamp() + 1000;
        let value = format!(r#"{{"access_token":"A","refresh_token":"R","expires_at":{}}}"#, at);
        let entries = vec![StorageEntry::new(StorageArea::Session, "oidc.user", value)];
        let expires_in = token_from_storage(&entries).unwrap().expires_in.unwrap();
        assert!((990..=1000).contains(&expires_in));
    }

    #[test]
    fn storage_with_extreme_expiry_is_clamped() {
        let value = format!(r#"{{"access_token":"A","refresh_token":"R","expires_at":{}}}"#, i64::MIN);
        let entries = vec![StorageEntry::new(StorageArea::Session, "oidc.user", value)];
        assert_eq!(token_from_storage(&entries).unwrap().expires_in, Some(0));

        let value = format!(r#"{{"access_token":"A","refresh_token":"R","expires_in":{}}}"#, i64::MAX);
        let entries = vec![StorageEntry::new(StorageArea::Session, "oidc.user", value)];
        let bundle = token_from_storage(&entries).unwrap();
        assert_eq!(bundle.expires_in, Some(crate::tokens::MAX_EXPIRES_IN_SECS));
        assert!(bundle.usable_until(chrono::Duration::zero()) > Utc::now());
    }

    #[test]
    fn storage_without_tokens() {
        let entries = vec![StorageEntry::new(StorageArea::Local, "auth", r#"{"user":"x"}"#)];
        assert!(token_from_storage(&entries).is_none());
        assert!(token_from_storage(&[]).is_none());
    }

    #[test]
    fn bearer_header_is_captured_as_degraded() {
        let token = "e".repeat(60);
        let bundle = token_from_request_headers(&request_with_auth(&format!("Bearer {}", token))).unwrap();
        assert_eq!(bundle.access_token, token);
        assert!(bundle.is_degraded());
    }

    #[test]
    fn short_or_foreign_headers_are_ignored() {
        assert!(token_from_request_headers(&request_with_auth("Bearer short")).is_none());
        let basic = format!("Basic {}", "b".repeat(60));
        assert!(token_from_request_headers(&request_with_auth(&basic)).is_none());
    }
}
