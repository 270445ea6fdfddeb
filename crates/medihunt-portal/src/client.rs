//! Authenticated client for the appointments API.
//!
//! Every call first asks the [`TokenLifecycle`] for a usable token, so a
//! refresh (or login) happens transparently before the request goes out.
//! A non-success status is reported as a [`PortalErrorCode::HttpStatus`]
//! error and is not retried.
//!
//! [`PortalErrorCode::HttpStatus`]: crate::error::PortalErrorCode::HttpStatus

use std::fmt;

use chrono::NaiveDate;
use medihunt_core::{SlotRecord, format_query_date};
use reqwest::header::{ACCEPT, ORIGIN, REFERER};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::BoxFuture;
use crate::config::PortalConfig;
use crate::error::{PortalError, PortalResult};
use crate::filters::FiltersPayload;
use crate::session::TokenLifecycle;

/// Default number of slots requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Kind of slot search; the portal distinguishes standard visits from
/// other booking flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotSearchType {
    /// Regular appointments.
    #[default]
    Standard,
}

impl SlotSearchType {
    /// Query parameter value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "Standard",
        }
    }
}

/// Parameters of the filters endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiltersQuery {
    /// Region to scope the filters to.
    pub region_id: i64,
    /// Specialty to scope the filters to.
    pub specialty_id: i64,
    /// Search type.
    pub search_type: SlotSearchType,
}

impl FiltersQuery {
    /// Creates a standard filters query.
    pub fn new(region_id: i64, specialty_id: i64) -> Self {
        Self {
            region_id,
            specialty_id,
            search_type: SlotSearchType::Standard,
        }
    }
}

/// Parameters of one slot search page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotQuery {
    /// Region id.
    pub region_id: i64,
    /// Specialty id.
    pub specialty_id: i64,
    /// Day to search.
    pub date: NaiveDate,
    /// 1-based page number.
    pub page: u32,
    /// Page size.
    pub page_size: u32,
    /// Search type.
    pub search_type: SlotSearchType,
}

impl SlotQuery {
    /// Creates a query for the first page of `date`.
    pub fn new(region_id: i64, specialty_id: i64, date: NaiveDate) -> Self {
        Self {
            region_id,
            specialty_id,
            date,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            search_type: SlotSearchType::Standard,
        }
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Returns the same query for another page.
    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("RegionIds", self.region_id.to_string()),
            ("SpecialtyIds", self.specialty_id.to_string()),
            ("Page", self.page.to_string()),
            ("PageSize", self.page_size.to_string()),
            ("StartTime", format_query_date(self.date)),
            ("SlotSearchType", self.search_type.as_str().to_string()),
            ("isOverbookingSearchDisabled", "false".to_string()),
        ]
    }
}

/// One page of slot search results.
///
/// Items that do not parse as a [`SlotRecord`] are dropped with a warning
/// and counted in `dropped`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "RawSlotPage")]
pub struct SlotPage {
    /// Slots on this page.
    pub items: Vec<SlotRecord>,
    /// Total number of matching slots, when the portal reports it.
    pub total_count: Option<u64>,
    /// Items the portal sent that could not be parsed.
    pub dropped: usize,
}

impl SlotPage {
    /// Creates a page with no dropped items.
    pub fn new(items: Vec<SlotRecord>, total_count: Option<u64>) -> Self {
        Self {
            items,
            total_count,
            dropped: 0,
        }
    }

    /// Number of items the portal sent, parsed or not.
    pub fn received(&self) -> usize {
        self.items.len() + self.dropped
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSlotPage {
    #[serde(default)]
    items: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    total_count: Option<u64>,
}

impl From<RawSlotPage> for SlotPage {
    fn from(raw: RawSlotPage) -> Self {
        let raw_items = raw.items.unwrap_or_default();
        let mut items = Vec::with_capacity(raw_items.len());
        let mut dropped = 0;
        for (index, value) in raw_items.into_iter().enumerate() {
            match serde_json::from_value::<SlotRecord>(value) {
                Ok(slot) => items.push(slot),
                Err(e) => {
                    warn!(index, error = %e, "dropping malformed slot");
                    dropped += 1;
                }
            }
        }
        Self {
            items,
            total_count: raw.total_count,
            dropped,
        }
    }
}

/// Which API call an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Search filters.
    Filters,
    /// Slot search.
    Slots,
    /// Profile lookup.
    Profile,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Filters => "filters",
            Self::Slots => "slots",
            Self::Profile => "profile",
        })
    }
}

/// The appointment search operations.
///
/// Calls take `&mut self` because they may renew the session.
pub trait AppointmentApi: Send {
    /// Fetches the regions, specialties and doctors for a region/specialty.
    fn filters(&mut self, query: FiltersQuery) -> BoxFuture<'_, PortalResult<FiltersPayload>>;

    /// Fetches one page of available slots.
    fn search_slots(&mut self, query: SlotQuery) -> BoxFuture<'_, PortalResult<SlotPage>>;
}

/// HTTP client that attaches a valid bearer token to every request.
pub struct PortalClient {
    http_client: reqwest::Client,
    config: PortalConfig,
    session: TokenLifecycle,
}

impl PortalClient {
    /// Creates a client using `session` for tokens.
    pub fn new(config: PortalConfig, session: TokenLifecycle) -> PortalResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| PortalError::internal("failed to create HTTP client").with_source(e))?;
        Ok(Self {
            http_client,
            config,
            session,
        })
    }

    /// The token lifecycle behind this client.
    pub fn session(&self) -> &TokenLifecycle {
        &self.session
    }

    /// Mutable access to the token lifecycle.
    pub fn session_mut(&mut self) -> &mut TokenLifecycle {
        &mut self.session
    }

    /// Fetches search filters.
    pub async fn fetch_filters(&mut self, query: FiltersQuery) -> PortalResult<FiltersPayload> {
        let url = self.config.filters_url();
        let params = [
            ("RegionIds", query.region_id.to_string()),
            ("SpecialtyIds", query.specialty_id.to_string()),
            ("SlotSearchType", query.search_type.as_str().to_string()),
        ];
        self.get_json(Endpoint::Filters, &url, &params).await
    }

    /// Fetches one page of slots.
    pub async fn fetch_slots(&mut self, query: SlotQuery) -> PortalResult<SlotPage> {
        let url = self.config.slots_url();
        let page: SlotPage = self
            .get_json(Endpoint::Slots, &url, &query.params())
            .await?;
        debug!(
            date = %query.date,
            page = query.page,
            items = page.items.len(),
            dropped = page.dropped,
            total = ?page.total_count,
            "slot page"
        );
        Ok(page)
    }

    /// Calls the profile endpoint to check that the session is accepted.
    pub async fn verify_session(&mut self) -> PortalResult<serde_json::Value> {
        let url = self.config.profile_url.clone();
        self.get_json(Endpoint::Profile, &url, &[]).await
    }

    async fn get_json<T: DeserializeOwned>(
        &mut self,
        endpoint: Endpoint,
        url: &str,
        params: &[(&str, String)],
    ) -> PortalResult<T> {
        let token = self.session.ensure_valid().await?;
        let name = endpoint.to_string();

        let response = self
            .http_client
            .get(url)
            .query(params)
            .bearer_auth(token)
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(ORIGIN, &self.config.origin)
            .header(REFERER, format!("{}/home", self.config.origin))
            .send()
            .await
            .map_err(|e| PortalError::transport(&name, e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            PortalError::network(format!("{}: failed to read response: {}", name, e))
        })?;

        if !status.is_success() {
            return Err(PortalError::http_status(status.as_u16(), name, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            PortalError::invalid_response(format!("{}: failed to parse response: {}", name, e))
        })
    }
}

impl AppointmentApi for PortalClient {
    fn filters(&mut self, query: FiltersQuery) -> BoxFuture<'_, PortalResult<FiltersPayload>> {
        Box::pin(self.fetch_filters(query))
    }

    fn search_slots(&mut self, query: SlotQuery) -> BoxFuture<'_, PortalResult<SlotPage>> {
        Box::pin(self.fetch_slots(query))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::Credentials;
    use crate::error::PortalErrorCode;
    use crate::login::LoginDriver;
    use crate::oauth::OAuthClient;
    use crate::tokens::{TokenBundle, TokenCache};

    struct NoLogin;

    impl LoginDriver for NoLogin {
        fn login<'a>(
            &'a self,
            _credentials: &'a Credentials,
        ) -> BoxFuture<'a, PortalResult<TokenBundle>> {
            Box::pin(async { Err(PortalError::authentication("login not expected")) })
        }
    }

    fn client(server: &MockServer, dir: &std::path::Path, bundle: TokenBundle) -> PortalClient {
        let config = PortalConfig::default()
            .with_base_url(&server.uri())
            .with_cache_dir(dir);
        let cache = TokenCache::new(dir);
        cache.save("123456", &bundle).unwrap();
        let session = TokenLifecycle::new(
            Credentials::new("123456", "secret"),
            cache,
            OAuthClient::new(&config).unwrap(),
            Arc::new(NoLogin),
        );
        PortalClient::new(config, session).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 20).unwrap()
    }

    #[tokio::test]
    async fn slots_request_carries_token_and_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/appointments/api/v2/search-appointments/slots"))
            .and(header("authorization", "Bearer A"))
            .and(query_param("RegionIds", "204"))
            .and(query_param("SpecialtyIds", "30"))
            .and(query_param("Page", "2"))
            .and(query_param("PageSize", "500"))
            .and(query_param("StartTime", "2026-10-20"))
            .and(query_param("SlotSearchType", "Standard"))
            .and(query_param("isOverbookingSearchDisabled", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{
                    "appointmentDate": "2026-10-20T09:00:00",
                    "clinic": { "id": 1, "name": "Centrum" },
                    "doctor": { "id": 414656, "name": "Dr X" },
                    "specialty": { "id": 30, "name": "Urolog" },
                    "isPhoneConsultation": false
                }],
                "totalCount": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut api = client(&server, dir.path(), TokenBundle::new("A", "R", Some(3600)));
        let page = api
            .search_slots(SlotQuery::new(204, 30, date()).page(2))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].doctor_id(), Some(414656));
        assert_eq!(page.total_count, Some(1));
    }

    #[test]
    fn malformed_slot_is_dropped_from_page() {
        let page: SlotPage = serde_json::from_value(serde_json::json!({
            "items": [
                {
                    "appointmentDate": "2026-10-20T09:00:00",
                    "clinic": { "id": 1, "name": "Centrum" },
                    "doctor": { "id": 414656, "name": "Dr X" },
                    "specialty": { "id": 30, "name": "Urolog" }
                },
                {
                    "appointmentDate": null,
                    "clinic": { "id": 1, "name": "Centrum" }
                }
            ],
            "totalCount": 2
        }))
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].doctor_id(), Some(414656));
        assert_eq!(page.dropped, 1);
        assert_eq!(page.received(), 2);
        assert_eq!(page.total_count, Some(2));
    }

    #[test]
    fn null_items_is_an_empty_page() {
        let page: SlotPage = serde_json::from_str(r#"{"items":null}"#).unwrap();
        assert_eq!(page.received(), 0);
        assert!(page.total_count.is_none());
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_before_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/connect/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "FRESH",
                "refresh_token": "R2",
                "expires_in": 300
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/appointments/api/v2/search-appointments/filters"))
            .and(header("authorization", "Bearer FRESH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "regions": [{ "id": 204, "value": "Warszawa" }],
                "specialties": [],
                "doctors": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let stale = TokenBundle::new("OLD", "R1", Some(60))
            .captured_at(Utc::now() - chrono::Duration::hours(1));
        let mut api = client(&server, dir.path(), stale);
        let filters = api.filters(FiltersQuery::new(204, 30)).await.unwrap();
        assert_eq!(filters.regions.len(), 1);
    }

    #[tokio::test]
    async fn error_status_is_reported_with_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/appointments/api/v2/search-appointments/slots"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut api = client(&server, dir.path(), TokenBundle::new("A", "R", Some(3600)));
        let err = api.search_slots(SlotQuery::new(204, 30, date())).await.unwrap_err();
        assert_eq!(err.code(), PortalErrorCode::HttpStatus);
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.endpoint(), Some("slots"));
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/available-profiles/me"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut api = client(&server, dir.path(), TokenBundle::new("A", "R", Some(3600)));
        let err = api.verify_session().await.unwrap_err();
        assert_eq!(err.code(), PortalErrorCode::InvalidResponse);
    }

    #[test]
    fn page_size_and_page_are_at_least_one() {
        let query = SlotQuery::new(1, 2, date()).with_page_size(0).page(0);
        assert_eq!(query.page_size, 1);
        assert_eq!(query.page, 1);
    }
}
