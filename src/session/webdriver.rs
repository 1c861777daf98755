//! W3C WebDriver client (chromedriver-compatible) implementing `WebSession`.
//!
//! Each `navigate` opens a fresh tab. Element references are scoped to the tab
//! they were found in, so every element command first switches to that tab.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::session::{
    ElementHandle, NAVIGATION_TIMEOUT, PageHandle, ReadyState, Selector, WaitPolicy, WebSession,
};

/// W3C element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Interval between `document.readyState` probes.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Browser launch settings.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// WebDriver endpoint, e.g. `http://localhost:9515`.
    pub webdriver_url: String,
    /// Chromium-family binary (e.g. Brave). Driver default when unset.
    pub binary: Option<PathBuf>,
    /// Persistent profile so an existing login is reused.
    pub profile_dir: Option<PathBuf>,
    pub headless: bool,
}

impl BrowserConfig {
    fn capabilities(&self) -> Value {
        let mut args: Vec<String> = Vec::new();
        if let Some(ref dir) = self.profile_dir {
            args.push(format!("--user-data-dir={}", dir.display()));
        }
        if self.headless {
            args.push("--headless=new".to_string());
        }

        let mut chrome_options = json!({ "args": args });
        if let Some(ref binary) = self.binary {
            chrome_options["binary"] = Value::String(binary.display().to_string());
        }

        json!({
            "browserName": "chrome",
            "pageLoadStrategy": "eager",
            "timeouts": { "pageLoad": NAVIGATION_TIMEOUT.as_millis() as u64 },
            "goog:chromeOptions": chrome_options,
        })
    }
}

/// A live WebDriver session.
pub struct WebDriverSession {
    client: reqwest::Client,
    session_url: String,
    current_window: Mutex<Option<String>>,
}

impl WebDriverSession {
    /// Start a new browser session.
    pub async fn start(config: &BrowserConfig) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .timeout(NAVIGATION_TIMEOUT + Duration::from_secs(5))
            .build()
            .map_err(|e| SessionError::Transport(format!("Failed to build HTTP client: {e}")))?;

        let root = config.webdriver_url.trim_end_matches('/');
        let body = json!({ "capabilities": { "alwaysMatch": config.capabilities() } });
        let resp = client
            .post(format!("{root}/session"))
            .json(&body)
            .send()
            .await?;
        let value = read_value(resp).await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::InvalidResponse("new session without sessionId".into()))?;

        info!(session_id, webdriver = root, "Browser session started");

        Ok(Self {
            client,
            session_url: format!("{root}/session/{session_id}"),
            current_window: Mutex::new(None),
        })
    }

    /// End the session and close the browser.
    pub async fn quit(&self) -> Result<(), SessionError> {
        let resp = self
            .client
            .request(Method::DELETE, &self.session_url)
            .send()
            .await?;
        read_value(resp).await?;
        info!("Browser session closed");
        Ok(())
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, SessionError> {
        let url = format!("{}{}", self.session_url, path);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(&body);
        } else if method == Method::POST {
            request = request.json(&json!({}));
        }
        let resp = request.send().await?;
        read_value(resp).await
    }

    async fn switch_to(&self, window: &str) -> Result<(), SessionError> {
        let mut current = self.current_window.lock().await;
        if current.as_deref() == Some(window) {
            return Ok(());
        }
        self.command(Method::POST, "/window", Some(json!({ "handle": window })))
            .await?;
        *current = Some(window.to_string());
        Ok(())
    }

    async fn wait_ready(&self, wait: WaitPolicy) -> Result<(), SessionError> {
        let deadline = tokio::time::Instant::now() + wait.timeout;
        loop {
            let state = self
                .command(
                    Method::POST,
                    "/execute/sync",
                    Some(json!({ "script": "return document.readyState;", "args": [] })),
                )
                .await?;
            let ready = match (state.as_str(), wait.ready) {
                (Some("complete"), _) => true,
                (Some("interactive"), ReadyState::Interactive) => true,
                _ => false,
            };
            if ready {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SessionError::Timeout {
                    what: "document ready state".to_string(),
                    timeout: wait.timeout,
                });
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl WebSession for WebDriverSession {
    async fn navigate(&self, url: &str, wait: WaitPolicy) -> Result<PageHandle, SessionError> {
        let created = self
            .command(Method::POST, "/window/new", Some(json!({ "type": "tab" })))
            .await?;
        let handle = created
            .get("handle")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::InvalidResponse("new window without handle".into()))?
            .to_string();

        self.switch_to(&handle).await?;
        debug!(url, window = %handle, "Navigating");
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        self.wait_ready(wait).await?;

        Ok(PageHandle {
            id: handle,
            url: url.to_string(),
        })
    }

    async fn locate_all(
        &self,
        page: &PageHandle,
        selector: &Selector,
    ) -> Result<Vec<ElementHandle>, SessionError> {
        self.switch_to(&page.id).await?;
        let found = self
            .command(Method::POST, "/elements", Some(locator(selector)))
            .await?;
        element_refs(&page.id, &found)
    }

    async fn locate_in(
        &self,
        element: &ElementHandle,
        selector: &Selector,
    ) -> Result<Vec<ElementHandle>, SessionError> {
        self.switch_to(&element.page_id).await?;
        let found = self
            .command(
                Method::POST,
                &format!("/element/{}/elements", element.id),
                Some(locator(selector)),
            )
            .await?;
        element_refs(&element.page_id, &found)
    }

    async fn inner_text(&self, element: &ElementHandle) -> Result<String, SessionError> {
        self.switch_to(&element.page_id).await?;
        let text = self
            .command(Method::GET, &format!("/element/{}/text", element.id), None)
            .await?;
        Ok(text.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SessionError> {
        self.switch_to(&element.page_id).await?;
        let value = self
            .command(
                Method::GET,
                &format!("/element/{}/attribute/{}", element.id, name),
                None,
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), SessionError> {
        self.switch_to(&element.page_id).await?;
        self.command(Method::POST, &format!("/element/{}/click", element.id), None)
            .await?;
        Ok(())
    }

    async fn scroll(&self, page: &PageHandle, dx: i64, dy: i64) -> Result<(), SessionError> {
        self.switch_to(&page.id).await?;
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": "window.scrollBy(arguments[0], arguments[1]);", "args": [dx, dy] })),
        )
        .await?;
        Ok(())
    }

    async fn reload(&self, page: &PageHandle, wait: WaitPolicy) -> Result<(), SessionError> {
        self.switch_to(&page.id).await?;
        self.command(Method::POST, "/refresh", None).await?;
        self.wait_ready(wait).await
    }

    async fn close(&self, page: &PageHandle) -> Result<(), SessionError> {
        self.switch_to(&page.id).await?;
        let remaining = self.command(Method::DELETE, "/window", None).await?;
        *self.current_window.lock().await = None;

        // New tabs can only be opened from a live browsing context.
        if let Some(handle) = remaining
            .as_array()
            .and_then(|handles| handles.first())
            .and_then(Value::as_str)
        {
            self.switch_to(handle).await?;
        }
        Ok(())
    }
}

fn locator(selector: &Selector) -> Value {
    match selector {
        Selector::Css(s) => json!({ "using": "css selector", "value": s }),
        Selector::XPath(s) => json!({ "using": "xpath", "value": s }),
    }
}

fn element_refs(page_id: &str, value: &Value) -> Result<Vec<ElementHandle>, SessionError> {
    let items = value
        .as_array()
        .ok_or_else(|| SessionError::InvalidResponse(format!("expected element list, got {value}")))?;
    items
        .iter()
        .map(|item| {
            item.get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| ElementHandle {
                    page_id: page_id.to_string(),
                    id: id.to_string(),
                })
                .ok_or_else(|| SessionError::InvalidResponse(format!("not an element: {item}")))
        })
        .collect()
}

/// Unwrap the W3C `{"value": ...}` envelope, mapping error payloads.
async fn read_value(resp: reqwest::Response) -> Result<Value, SessionError> {
    let status = resp.status();
    let body: Value = resp
        .json()
        .await
        .map_err(|e| SessionError::InvalidResponse(format!("HTTP {status}: {e}")))?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match error.as_str() {
        "no such element" | "stale element reference" => Err(SessionError::NotFound {
            selector: message,
        }),
        "timeout" | "script timeout" => Err(SessionError::Timeout {
            what: message,
            timeout: NAVIGATION_TIMEOUT,
        }),
        _ => {
            warn!(%status, error = %error, message = %message, "WebDriver command failed");
            Err(SessionError::Protocol { error, message })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn started_session(server: &MockServer) -> WebDriverSession {
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "value": { "sessionId": "s1", "capabilities": {} } }),
            ))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s1/window"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .mount(server)
            .await;

        let config = BrowserConfig {
            webdriver_url: server.uri(),
            binary: None,
            profile_dir: None,
            headless: true,
        };
        WebDriverSession::start(&config).await.unwrap()
    }

    fn page() -> PageHandle {
        PageHandle {
            id: "tab-1".into(),
            url: "https://example.test/".into(),
        }
    }

    #[test]
    fn capabilities_include_profile_binary_and_headless() {
        let config = BrowserConfig {
            webdriver_url: "http://localhost:9515".into(),
            binary: Some(PathBuf::from("/opt/brave/brave")),
            profile_dir: Some(PathBuf::from("/home/me/.config/brave-profile")),
            headless: true,
        };
        let caps = config.capabilities();
        assert_eq!(caps["goog:chromeOptions"]["binary"], "/opt/brave/brave");
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--user-data-dir=/home/me/.config/brave-profile"));
        assert!(args.iter().any(|a| a == "--headless=new"));
        assert_eq!(caps["timeouts"]["pageLoad"], 60_000);
    }

    #[tokio::test]
    async fn locate_all_returns_element_handles() {
        let server = MockServer::start().await;
        let session = started_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/s1/elements"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [ { ELEMENT_KEY: "e1" }, { ELEMENT_KEY: "e2" } ]
            })))
            .mount(&server)
            .await;

        let found = session
            .locate_all(&page(), &Selector::css("div.card"))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "e1");
        assert_eq!(found[1].page_id, "tab-1");
    }

    #[tokio::test]
    async fn missing_attribute_is_none() {
        let server = MockServer::start().await;
        let session = started_session(&server).await;

        Mock::given(method("GET"))
            .and(path("/session/s1/element/e1/attribute/href"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .mount(&server)
            .await;

        let element = ElementHandle {
            page_id: "tab-1".into(),
            id: "e1".into(),
        };
        assert_eq!(session.attribute(&element, "href").await.unwrap(), None);
    }

    #[tokio::test]
    async fn no_such_element_maps_to_not_found() {
        let server = MockServer::start().await;
        let session = started_session(&server).await;

        Mock::given(method("GET"))
            .and(path("/session/s1/element/gone/text"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "value": { "error": "no such element", "message": "gone", "stacktrace": "" }
            })))
            .mount(&server)
            .await;

        let element = ElementHandle {
            page_id: "tab-1".into(),
            id: "gone".into(),
        };
        let err = session.inner_text(&element).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn navigate_opens_tab_and_waits_for_dom() {
        let server = MockServer::start().await;
        let session = started_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/s1/window/new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "value": { "handle": "tab-9", "type": "tab" } }),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s1/url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s1/execute/sync"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "value": "interactive" })),
            )
            .mount(&server)
            .await;

        let page = session
            .navigate("https://example.test/in/someone/", WaitPolicy::dom_content_loaded())
            .await
            .unwrap();
        assert_eq!(page.id, "tab-9");
        assert_eq!(page.url, "https://example.test/in/someone/");
    }

    #[tokio::test]
    async fn close_switches_to_a_remaining_tab() {
        let server = MockServer::start().await;
        let session = started_session(&server).await;

        Mock::given(method("DELETE"))
            .and(path("/session/s1/window"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": ["tab-1"] })))
            .expect(1)
            .mount(&server)
            .await;

        let profile = PageHandle {
            id: "tab-2".into(),
            url: "https://example.test/in/someone/".into(),
        };
        session.close(&profile).await.unwrap();

        let switched: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.method.as_str() == "POST" && r.url.path() == "/session/s1/window")
            .filter_map(|r| r.body_json::<Value>().ok())
            .filter_map(|body| body["handle"].as_str().map(str::to_string))
            .collect();
        assert_eq!(switched, vec!["tab-2".to_string(), "tab-1".to_string()]);
    }

    #[tokio::test]
    async fn unknown_webdriver_error_is_protocol_failure() {
        let server = MockServer::start().await;
        let session = started_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/s1/refresh"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "value": { "error": "unknown error", "message": "tab crashed" }
            })))
            .mount(&server)
            .await;

        let err = session
            .reload(&page(), WaitPolicy::dom_content_loaded())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Protocol { ref message, .. } if message == "tab crashed"));
        assert!(!err.is_not_found());
    }
}
