//! W3C WebDriver backend.
//!
//! Talks to chromedriver over HTTP. Network traffic is reconstructed from
//! Chrome's performance log (`goog:loggingPrefs`), and response bodies of
//! interest are fetched through the `goog/cdp/execute` extension.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::browser::{BrowserLauncher, BrowserSession, Locator, NetworkEvent, StorageEntry};
use crate::BoxFuture;
use crate::config::PortalConfig;
use crate::error::{PortalError, PortalResult};

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const ENTER_KEY: &str = "\u{E007}";

const REMOVE_ELEMENTS_SCRIPT: &str = "for (const sel of arguments[0]) { \
    document.querySelectorAll(sel).forEach((el) => el.remove()); }";

const STORAGE_SCRIPT: &str = "const out = []; \
    for (const [area, store] of [['local', window.localStorage], ['session', window.sessionStorage]]) { \
      for (let i = 0; i < store.length; i++) { \
        const key = store.key(i); out.push({ area, key, value: store.getItem(key) || '' }); \
      } \
    } \
    return out;";

/// Starts Chrome sessions through a chromedriver server.
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    http: reqwest::Client,
    endpoint: String,
    headless: bool,
    locale: String,
    user_agent: String,
}

impl WebDriverLauncher {
    /// Creates a launcher for the WebDriver server in `config`.
    pub fn new(config: &PortalConfig) -> PortalResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.login.command_timeout)
            .build()
            .map_err(|e| PortalError::internal("failed to create HTTP client").with_source(e))?;
        Ok(Self {
            http,
            endpoint: config.login.webdriver_url.trim_end_matches('/').to_string(),
            headless: config.login.headless,
            locale: config.login.locale.clone(),
            user_agent: config.user_agent.clone(),
        })
    }

    /// Session capabilities: Chrome with network performance logging.
    pub fn capabilities(&self) -> Value {
        let mut args = vec![
            "--no-first-run".to_string(),
            "--disable-gpu".to_string(),
            "--window-size=1280,900".to_string(),
            format!("--lang={}", self.locale),
            format!("--user-agent={}", self.user_agent),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        json!({
            "browserName": "chrome",
            "pageLoadStrategy": "eager",
            "goog:loggingPrefs": { "performance": "ALL" },
            "goog:chromeOptions": {
                "args": args,
                "perfLoggingPrefs": { "enableNetwork": true, "enablePage": false },
                "prefs": { "intl.accept_languages": self.locale },
            },
        })
    }
}

impl BrowserLauncher for WebDriverLauncher {
    fn launch(&self) -> BoxFuture<'_, PortalResult<Box<dyn BrowserSession>>> {
        Box::pin(async move {
            let body = json!({ "capabilities": { "alwaysMatch": self.capabilities() } });
            let url = format!("{}/session", self.endpoint);
            let value = send(&self.http, Method::POST, &url, Some(body)).await?;
            let session_id = value
                .get("sessionId")
                .and_then(Value::as_str)
                .ok_or_else(|| PortalError::browser("new session response has no sessionId"))?;
            info!("started browser session {}", session_id);
            let session = WebDriverSession::new(self.http.clone(), &self.endpoint, session_id);
            Ok(Box::new(session) as Box<dyn BrowserSession>)
        })
    }
}

/// A live chromedriver session.
#[derive(Debug)]
pub struct WebDriverSession {
    http: reqwest::Client,
    base: String,
    tracker: NetworkTracker,
}

impl WebDriverSession {
    fn new(http: reqwest::Client, endpoint: &str, session_id: &str) -> Self {
        Self {
            http,
            base: format!("{}/session/{}", endpoint, session_id),
            tracker: NetworkTracker::default(),
        }
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> PortalResult<Value> {
        let url = format!("{}{}", self.base, path);
        send(&self.http, method, &url, body).await
    }

    async fn execute(&self, script: &str, args: Value) -> PortalResult<Value> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn find_visible(&self, locator: &Locator) -> PortalResult<Option<String>> {
        let (using, value) = locator_strategy(locator);
        let found = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": using, "value": value })),
            )
            .await?;
        for id in element_ids(&found) {
            match self
                .command(Method::GET, &format!("/element/{}/displayed", id), None)
                .await
            {
                Ok(Value::Bool(true)) => return Ok(Some(id)),
                Ok(_) => {}
                Err(e) => debug!("visibility check failed: {}", e),
            }
        }
        Ok(None)
    }

    async fn first_visible(&self, locators: &[Locator]) -> PortalResult<Option<String>> {
        for locator in locators {
            if let Some(id) = self.find_visible(locator).await? {
                debug!(?locator, "matched element");
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    async fn response_body(&self, request_id: &str) -> Option<String> {
        let result = self
            .command(
                Method::POST,
                "/goog/cdp/execute",
                Some(json!({
                    "cmd": "Network.getResponseBody",
                    "params": { "requestId": request_id },
                })),
            )
            .await;
        let value = match result {
            Ok(value) => value,
            Err(e) => {
                debug!("response body for {} unavailable: {}", request_id, e);
                return None;
            }
        };
        let body = value.get("body")?.as_str()?;
        if value.get("base64Encoded").and_then(Value::as_bool) == Some(true) {
            let bytes = STANDARD.decode(body).ok()?;
            Some(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            Some(body.to_string())
        }
    }

    async fn write_artifacts(&self, dir: &Path, label: &str) -> PortalResult<()> {
        std::fs::create_dir_all(dir).map_err(|e| {
            PortalError::browser(format!("failed to create artifact directory {:?}", dir))
                .with_source(e)
        })?;

        match self.command(Method::GET, "/screenshot", None).await {
            Ok(Value::String(png)) => match STANDARD.decode(png) {
                Ok(bytes) => write_artifact(&dir.join(format!("{}.png", label)), &bytes),
                Err(e) => warn!("screenshot is not valid base64: {}", e),
            },
            Ok(_) => warn!("unexpected screenshot payload"),
            Err(e) => warn!("screenshot failed: {}", e),
        }
        match self.command(Method::GET, "/source", None).await {
            Ok(Value::String(html)) => {
                write_artifact(&dir.join(format!("{}.html", label)), html.as_bytes())
            }
            Ok(_) => warn!("unexpected page source payload"),
            Err(e) => warn!("reading page source failed: {}", e),
        }
        if let Ok(Value::String(url)) = self.command(Method::GET, "/url", None).await {
            write_artifact(&dir.join(format!("{}.url.txt", label)), url.as_bytes());
        }
        info!("saved login artifacts '{}' to {:?}", label, dir);
        Ok(())
    }
}

impl BrowserSession for WebDriverSession {
    fn navigate<'a>(&'a mut self, url: &'a str, timeout: Duration) -> BoxFuture<'a, PortalResult<()>> {
        Box::pin(async move {
            let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            self.command(Method::POST, "/timeouts", Some(json!({ "pageLoad": millis })))
                .await?;
            debug!("navigating to {}", url);
            self.command(Method::POST, "/url", Some(json!({ "url": url })))
                .await?;
            Ok(())
        })
    }

    fn current_url(&mut self) -> BoxFuture<'_, PortalResult<String>> {
        Box::pin(async move {
            let value = self.command(Method::GET, "/url", None).await?;
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| PortalError::browser("current URL is not a string"))
        })
    }

    fn fill_first_visible<'a>(
        &'a mut self,
        locators: &'a [Locator],
        value: &'a str,
    ) -> BoxFuture<'a, PortalResult<bool>> {
        Box::pin(async move {
            let Some(id) = self.first_visible(locators).await? else {
                return Ok(false);
            };
            self.command(Method::POST, &format!("/element/{}/clear", id), Some(json!({})))
                .await?;
            self.command(
                Method::POST,
                &format!("/element/{}/value", id),
                Some(json!({ "text": value })),
            )
            .await?;
            Ok(true)
        })
    }

    fn click_first_visible<'a>(
        &'a mut self,
        locators: &'a [Locator],
    ) -> BoxFuture<'a, PortalResult<bool>> {
        Box::pin(async move {
            let Some(id) = self.first_visible(locators).await? else {
                return Ok(false);
            };
            self.command(Method::POST, &format!("/element/{}/click", id), Some(json!({})))
                .await?;
            Ok(true)
        })
    }

    fn is_visible<'a>(&'a mut self, locator: &'a Locator) -> BoxFuture<'a, PortalResult<bool>> {
        Box::pin(async move { Ok(self.find_visible(locator).await?.is_some()) })
    }

    fn press_enter(&mut self) -> BoxFuture<'_, PortalResult<()>> {
        Box::pin(async move {
            let actions = json!({
                "actions": [{
                    "type": "key",
                    "id": "keyboard",
                    "actions": [
                        { "type": "keyDown", "value": ENTER_KEY },
                        { "type": "keyUp", "value": ENTER_KEY },
                    ],
                }],
            });
            self.command(Method::POST, "/actions", Some(actions)).await?;
            Ok(())
        })
    }

    fn remove_elements<'a>(
        &'a mut self,
        selectors: &'a [&'a str],
    ) -> BoxFuture<'a, PortalResult<()>> {
        Box::pin(async move {
            self.execute(REMOVE_ELEMENTS_SCRIPT, json!([selectors]))
                .await?;
            Ok(())
        })
    }

    fn storage_entries(&mut self) -> BoxFuture<'_, PortalResult<Vec<StorageEntry>>> {
        Box::pin(async move {
            let value = self.execute(STORAGE_SCRIPT, json!([])).await?;
            serde_json::from_value(value).map_err(|e| {
                PortalError::browser(format!("unexpected storage payload: {}", e))
            })
        })
    }

    fn drain_network(&mut self) -> BoxFuture<'_, PortalResult<Vec<NetworkEvent>>> {
        Box::pin(async move {
            let value = self
                .command(Method::POST, "/se/log", Some(json!({ "type": "performance" })))
                .await?;
            let entries: Vec<LogEntry> = serde_json::from_value(value).map_err(|e| {
                PortalError::browser(format!("unexpected performance log payload: {}", e))
            })?;

            let mut events = Vec::new();
            for observed in self.tracker.observe(&entries) {
                match observed {
                    Observed::Event(event) => events.push(event),
                    Observed::NeedsBody {
                        request_id,
                        response,
                    } => {
                        let body = self.response_body(&request_id).await;
                        events.push(response.into_event(body));
                    }
                }
            }
            Ok(events)
        })
    }

    fn save_artifacts<'a>(&'a mut self, dir: &'a Path, label: &'a str) -> BoxFuture<'a, PortalResult<()>> {
        Box::pin(self.write_artifacts(dir, label))
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, PortalResult<()>> {
        Box::pin(async move {
            send(&self.http, Method::DELETE, &self.base, None).await?;
            debug!("closed browser session");
            Ok(())
        })
    }
}

async fn send(
    http: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> PortalResult<Value> {
    let mut request = http.request(method.clone(), url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request
        .send()
        .await
        .map_err(|e| PortalError::transport("webdriver", e))?;
    let status = response.status();
    let payload: Value = response.json().await.map_err(|e| {
        PortalError::browser(format!("invalid WebDriver response from {}: {}", url, e))
    })?;
    let value = match payload {
        Value::Object(mut map) => map.remove("value").unwrap_or(Value::Null),
        _ => Value::Null,
    };

    if !status.is_success() {
        let error = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        let message = value.get("message").and_then(Value::as_str).unwrap_or("");
        return Err(PortalError::browser(format!(
            "{} {}: {}: {}",
            method,
            url,
            error,
            message.lines().next().unwrap_or("")
        )));
    }
    Ok(value)
}

fn write_artifact(path: &Path, content: &[u8]) {
    if let Err(e) = std::fs::write(path, content) {
        warn!("failed to write {:?}: {}", path, e);
    }
}

fn locator_strategy(locator: &Locator) -> (&'static str, String) {
    match locator {
        Locator::Css(css) => ("css selector", (*css).to_string()),
        Locator::ButtonText(text) => (
            "xpath",
            format!("//button[contains(normalize-space(.), {})]", xpath_literal(text)),
        ),
    }
}

/// Quotes a string as an XPath 1.0 literal.
fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{}'", s)
    } else if !s.contains('"') {
        format!("\"{}\"", s)
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

fn element_ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(ELEMENT_KEY)?.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// One entry of the performance log.
#[derive(Debug, Deserialize)]
struct LogEntry {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PerfMessage {
    message: DevtoolsEvent,
}

#[derive(Debug, Deserialize)]
struct DevtoolsEvent {
    method: String,
    #[serde(default)]
    params: Value,
}

/// A response seen but not yet finished loading.
#[derive(Debug, Clone)]
struct PendingResponse {
    method: String,
    url: String,
    status: u16,
    content_type: Option<String>,
}

impl PendingResponse {
    fn wants_body(&self) -> bool {
        self.method.eq_ignore_ascii_case("POST")
            && self
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"))
    }

    fn into_event(self, body: Option<String>) -> NetworkEvent {
        NetworkEvent::Response {
            method: self.method,
            url: self.url,
            status: self.status,
            content_type: self.content_type,
            body,
        }
    }
}

#[derive(Debug)]
enum Observed {
    Event(NetworkEvent),
    NeedsBody {
        request_id: String,
        response: PendingResponse,
    },
}

/// Correlates DevTools network events across log drains.
#[derive(Debug, Default)]
struct NetworkTracker {
    requests: HashMap<String, (String, String)>,
    responses: HashMap<String, PendingResponse>,
}

impl NetworkTracker {
    fn observe(&mut self, entries: &[LogEntry]) -> Vec<Observed> {
        let mut out = Vec::new();
        for entry in entries {
            let Ok(parsed) = serde_json::from_str::<PerfMessage>(&entry.message) else {
                continue;
            };
            let event = parsed.message;
            let params = &event.params;
            let Some(request_id) = params.get("requestId").and_then(Value::as_str) else {
                continue;
            };

            match event.method.as_str() {
                "Network.requestWillBeSent" => {
                    let request = &params["request"];
                    let method = str_at(request, "method").unwrap_or("GET").to_string();
                    let url = str_at(request, "url").unwrap_or_default().to_string();
                    self.requests
                        .insert(request_id.to_string(), (method.clone(), url.clone()));
                    out.push(Observed::Event(NetworkEvent::Request {
                        method,
                        url,
                        headers: lower_headers(&request["headers"]),
                    }));
                }
                "Network.requestWillBeSentExtraInfo" => {
                    let (method, url) = self
                        .requests
                        .get(request_id)
                        .cloned()
                        .unwrap_or_default();
                    out.push(Observed::Event(NetworkEvent::Request {
                        method,
                        url,
                        headers: lower_headers(&params["headers"]),
                    }));
                }
                "Network.responseReceived" => {
                    let response = &params["response"];
                    let headers = lower_headers(&response["headers"]);
                    let content_type = str_at(response, "mimeType")
                        .filter(|m| !m.is_empty())
                        .map(str::to_string)
                        .or_else(|| headers.get("content-type").cloned());
                    let method = self
                        .requests
                        .get(request_id)
                        .map(|(m, _)| m.clone())
                        .unwrap_or_default();
                    self.responses.insert(
                        request_id.to_string(),
                        PendingResponse {
                            method,
                            url: str_at(response, "url").unwrap_or_default().to_string(),
                            status: response["status"].as_f64().unwrap_or(0.0) as u16,
                            content_type,
                        },
                    );
                }
                "Network.loadingFinished" => {
                    self.requests.remove(request_id);
                    if let Some(response) = self.responses.remove(request_id) {
                        if response.wants_body() {
                            out.push(Observed::NeedsBody {
                                request_id: request_id.to_string(),
                                response,
                            });
                        } else {
                            out.push(Observed::Event(response.into_event(None)));
                        }
                    }
                }
                "Network.loadingFailed" => {
                    self.requests.remove(request_id);
                    self.responses.remove(request_id);
                }
                _ => {}
            }
        }
        out
    }
}

fn str_at<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key)?.as_str()
}

fn lower_headers(value: &Value) -> HashMap<String, String> {
    value
        .as_object()
        .map(|headers| {
            headers
                .iter()
                .filter_map(|(k, v)| Some((k.to_ascii_lowercase(), v.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
