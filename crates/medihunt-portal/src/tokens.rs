//! Token bundles and their on-disk cache.
//!
//! A [`TokenBundle`] is what the token endpoint (or the login capture)
//! hands back. [`TokenCache`] persists one bundle per account under
//! `<cache root>/<account>/tokens.json`, written atomically with owner-only
//! permissions.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PortalError, PortalResult};

/// Lifetime in seconds assumed for a token whose expiry cannot be determined.
pub const UNKNOWN_EXPIRY_SECS: i64 = 300;

/// Longest lifetime accepted for a captured token (one year).
pub const MAX_EXPIRES_IN_SECS: i64 = 365 * 24 * 60 * 60;

const CACHE_FILE: &str = "tokens.json";

/// Access and refresh tokens as captured at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBundle {
    /// Bearer token for API calls.
    pub access_token: String,
    /// Refresh token; empty for a degraded bundle.
    #[serde(default, deserialize_with = "null_as_default")]
    pub refresh_token: String,
    /// Lifetime of the access token in seconds, when known.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Granted scopes, space separated.
    #[serde(default)]
    pub scope: Option<String>,
    /// Token type, normally `Bearer`.
    #[serde(default = "default_token_type", deserialize_with = "token_type_or_bearer")]
    pub token_type: String,
    /// When the bundle was obtained (unix seconds on disk).
    #[serde(with = "chrono::serde::ts_seconds")]
    pub captured_at: DateTime<Utc>,
}

impl TokenBundle {
    /// Creates a bundle captured now.
    ///
    /// `expires_in` is clamped to `0..=MAX_EXPIRES_IN_SECS`.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: Option<i64>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_in: expires_in.map(|secs| secs.clamp(0, MAX_EXPIRES_IN_SECS)),
            scope: None,
            token_type: default_token_type(),
            captured_at: Utc::now(),
        }
    }

    /// Creates a bundle holding only an access token.
    pub fn degraded(access_token: impl Into<String>) -> Self {
        Self::new(access_token, "", None)
    }

    /// Sets the granted scopes.
    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the token type; empty values keep `Bearer`.
    pub fn with_token_type(mut self, token_type: Option<String>) -> Self {
        if let Some(t) = token_type.filter(|t| !t.trim().is_empty()) {
            self.token_type = t;
        }
        self
    }

    /// Sets the capture instant.
    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = at;
        self
    }

    /// Returns true if the bundle has no refresh token.
    pub fn is_degraded(&self) -> bool {
        self.refresh_token.trim().is_empty()
    }

    /// Computes when the access token stops being usable, `margin` early.
    ///
    /// The lifetime comes from `expires_in`; failing that from the `exp`
    /// claim of a JWT access token; failing that
    /// [`UNKNOWN_EXPIRY_SECS`] after capture.
    ///
    /// An expiry that cannot be represented falls back to the default
    /// lifetime.
    pub fn usable_until(&self, margin: Duration) -> DateTime<Utc> {
        let expiry = self
            .expiry()
            .or_else(|| offset(self.captured_at, UNKNOWN_EXPIRY_SECS))
            .unwrap_or(self.captured_at);
        expiry.checked_sub_signed(margin).unwrap_or(expiry)
    }

    /// Returns true if `expires_in` is within the accepted range.
    pub fn has_sane_expiry(&self) -> bool {
        self.expires_in
            .is_none_or(|secs| (0..=MAX_EXPIRES_IN_SECS).contains(&secs))
    }

    fn expiry(&self) -> Option<DateTime<Utc>> {
        match self.expires_in {
            Some(secs) => offset(self.captured_at, secs),
            None => jwt_expiry(&self.access_token),
        }
    }
}

fn offset(at: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    at.checked_add_signed(Duration::try_seconds(secs)?)
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

fn token_type_or_bearer<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(default_token_type))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
struct JwtClaims {
    exp: Option<i64>,
}

/// Reads the `exp` claim of a JWT without verifying its signature.
pub fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: JwtClaims = serde_json::from_slice(&bytes).ok()?;
    Utc.timestamp_opt(claims.exp?, 0).single()
}

/// Per-account token cache on disk.
#[derive(Debug, Clone)]
pub struct TokenCache {
    root: PathBuf,
}

impl TokenCache {
    /// Creates a cache rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the cache file for `account`.
    pub fn path_for(&self, account: &str) -> PathBuf {
        self.root.join(account_dir(account)).join(CACHE_FILE)
    }

    /// Loads the cached bundle for `account`.
    ///
    /// A missing, unreadable or malformed file is treated as no cache.
    pub fn load(&self, account: &str) -> Option<TokenBundle> {
        let path = self.path_for(account);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no token cache at {:?}", path);
                return None;
            }
            Err(e) => {
                warn!("failed to read token cache {:?}: {}", path, e);
                return None;
            }
        };

        match serde_json::from_str::<TokenBundle>(&content) {
            Ok(bundle) if !bundle.access_token.trim().is_empty() && bundle.has_sane_expiry() => {
                debug!("loaded tokens from {:?}", path);
                Some(bundle)
            }
            Ok(bundle) if bundle.access_token.trim().is_empty() => {
                warn!("ignoring token cache {:?}: empty access token", path);
                None
            }
            Ok(bundle) => {
                warn!(
                    "ignoring token cache {:?}: expires_in {:?} out of range",
                    path, bundle.expires_in
                );
                None
            }
            Err(e) => {
                warn!("ignoring malformed token cache {:?}: {}", path, e);
                None
            }
        }
    }

    /// Persists `bundle` for `account`, replacing any previous one.
    pub fn save(&self, account: &str, bundle: &TokenBundle) -> PortalResult<PathBuf> {
        let path = self.path_for(account);
        let dir = path
            .parent()
            .ok_or_else(|| PortalError::internal("token cache path has no parent"))?;

        fs::create_dir_all(dir).map_err(|e| {
            PortalError::cache(format!("failed to create cache directory {:?}", dir))
                .with_source(e)
        })?;

        let content = serde_json::to_string_pretty(bundle)
            .map_err(|e| PortalError::internal(format!("failed to serialize tokens: {}", e)))?;

        let temp_path = path.with_extension("json.tmp");
        write_private(&temp_path, content.as_bytes()).map_err(|e| {
            PortalError::cache(format!("failed to write token cache {:?}", temp_path))
                .with_source(e)
        })?;

        fs::rename(&temp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            PortalError::cache(format!("failed to replace token cache {:?}", path))
                .with_source(e)
        })?;

        debug!("saved tokens to {:?}", path);
        Ok(path)
    }

    /// Removes the cached bundle for `account`.
    ///
    /// Returns false if there was nothing to remove.
    pub fn clear(&self, account: &str) -> PortalResult<bool> {
        let path = self.path_for(account);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("cleared tokens from {:?}", path);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(
                PortalError::cache(format!("failed to remove token cache {:?}", path))
                    .with_source(e),
            ),
        }
    }
}

fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(content)?;
    file.sync_all()
}

/// Maps an account name to a safe directory name.
fn account_dir(account: &str) -> String {
    let name: String = account
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match name.trim_matches('.') {
        "" => "default".to_string(),
        trimmed => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"1","exp":{}}}"#, exp));
        format!("{}.{}.sig", header, payload)
    }

    #[test]
    fn bundle_reads_cache_format() {
        let json = r#"{
            "access_token": "A",
            "refresh_token": null,
            "expires_in": 300,
            "scope": null,
            "token_type": null,
            "captured_at": 1760000000
        }"#;
        let bundle: TokenBundle = serde_json::from_str(json).unwrap();
        assert_eq!(bundle.access_token, "A");
        assert!(bundle.is_degraded());
        assert_eq!(bundle.token_type, "Bearer");
        assert_eq!(bundle.captured_at.timestamp(), 1_760_000_000);
    }

    #[test]
    fn bundle_writes_unix_seconds() {
        let bundle = TokenBundle::new("A", "R", Some(300))
            .captured_at(Utc.timestamp_opt(1_760_000_000, 0).unwrap());
        let value = serde_json::to_value(&bundle).unwrap();
        assert_eq!(value["captured_at"], 1_760_000_000);
        assert_eq!(value["refresh_token"], "R");
    }

    #[test]
    fn usable_until_prefers_expires_in() {
        let at = Utc.timestamp_opt(1_760_000_000, 0).unwrap();
        let bundle = TokenBundle::new(jwt_with_exp(1_760_099_999), "R", Some(300)).captured_at(at);
        assert_eq!(
            bundle.usable_until(Duration::seconds(10)),
            at + Duration::seconds(290)
        );
    }

    #[test]
    fn usable_until_falls_back_to_jwt_exp() {
        let at = Utc.timestamp_opt(1_760_000_000, 0).unwrap();
        let bundle = TokenBundle::degraded(jwt_with_exp(1_760_000_600)).captured_at(at);
        assert_eq!(
            bundle.usable_until(Duration::seconds(10)).timestamp(),
            1_760_000_590
        );
    }

    #[test]
    fn usable_until_defaults_for_opaque_tokens() {
        let at = Utc.timestamp_opt(1_760_000_000, 0).unwrap();
        let bundle = TokenBundle::degraded("opaque").captured_at(at);
        assert_eq!(
            bundle.usable_until(Duration::zero()),
            at + Duration::seconds(UNKNOWN_EXPIRY_SECS)
        );
    }

    #[test]
    fn jwt_expiry_rejects_garbage() {
        assert!(jwt_expiry("no-dots").is_none());
        assert!(jwt_expiry("a.!!!.c").is_none());
        let no_exp = format!("h.{}.s", URL_SAFE_NO_PAD.encode(br#"{"sub":"1"}"#));
        assert!(jwt_expiry(&no_exp).is_none());
    }

    #[test]
    fn cache_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path());
        assert!(cache.load("123456").is_none());

        let bundle = TokenBundle::new("A", "R", Some(300));
        let path = cache.save("123456", &bundle).unwrap();
        assert_eq!(path, dir.path().join("123456").join("tokens.json"));
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = cache.load("123456").unwrap();
        assert_eq!(loaded.access_token, "A");
        assert_eq!(loaded.refresh_token, "R");
        assert_eq!(loaded.captured_at.timestamp(), bundle.captured_at.timestamp());

        assert!(cache.clear("123456").unwrap());
        assert!(!cache.clear("123456").unwrap());
        assert!(cache.load("123456").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn cache_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path());
        let path = cache.save("u", &TokenBundle::degraded("A")).unwrap();
        let mode = fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn malformed_cache_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path());
        let path = cache.path_for("u");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{not json").unwrap();
        assert!(cache.load("u").is_none());

        fs::write(&path, r#"{"access_token":"","captured_at":1}"#).unwrap();
        assert!(cache.load("u").is_none());
    }

    #[test]
    fn out_of_range_expiry_is_a_cache_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path());
        let path = cache.path_for("u");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        for expires_in in [i64::MAX, i64::MIN, -1] {
            fs::write(
                &path,
                format!(
                    r#"{{"access_token":"A","refresh_token":"R","expires_in":{},"captured_at":1760000000}}"#,
                    expires_in
                ),
            )
            .unwrap();
            assert!(cache.load("u").is_none(), "expires_in {}", expires_in);
        }
    }

    #[test]
    fn usable_until_never_overflows() {
        let at = Utc.timestamp_opt(1_760_000_000, 0).unwrap();
        let mut bundle = TokenBundle::new("A", "R", Some(300)).captured_at(at);
        bundle.expires_in = Some(i64::MAX);
        assert_eq!(
            bundle.usable_until(Duration::seconds(10)),
            at + Duration::seconds(UNKNOWN_EXPIRY_SECS - 10)
        );

        bundle.expires_in = None;
        bundle.access_token = jwt_with_exp(i64::MAX);
        assert_eq!(
            bundle.usable_until(Duration::zero()),
            at + Duration::seconds(UNKNOWN_EXPIRY_SECS)
        );
    }

    #[test]
    fn new_clamps_expires_in() {
        assert_eq!(
            TokenBundle::new("A", "R", Some(i64::MAX)).expires_in,
            Some(MAX_EXPIRES_IN_SECS)
        );
        assert_eq!(TokenBundle::new("A", "R", Some(-5)).expires_in, Some(0));
    }

    #[test]
    fn account_names_are_sanitized() {
        assert_eq!(account_dir("jan.kowalski@example.com"), "jan.kowalski@example.com");
        assert_eq!(account_dir("../etc"), "_etc");
        assert_eq!(account_dir("a/b c"), "a_b_c");
        assert_eq!(account_dir(""), "default");
        assert_eq!(account_dir(".."), "default");
    }
}
