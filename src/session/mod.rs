//! Browser session abstraction.
//!
//! The triage core only talks to a `WebSession`. `webdriver` provides the
//! W3C WebDriver implementation used by the binary; tests use the scripted
//! session in `crate::testing`.

pub mod webdriver;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::SessionError;

pub use webdriver::{BrowserConfig, WebDriverSession};

/// Upper bound for any page navigation.
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);

/// How often `wait_for` re-queries the page.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How an element is located.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Css(String),
    XPath(String),
}

impl Selector {
    pub fn css(s: impl Into<String>) -> Self {
        Self::Css(s.into())
    }

    pub fn xpath(s: impl Into<String>) -> Self {
        Self::XPath(s.into())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css:{s}"),
            Self::XPath(s) => write!(f, "xpath:{s}"),
        }
    }
}

/// Document readiness to wait for after navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// DOM parsed; subresources may still be loading.
    Interactive,
    /// Everything loaded.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub ready: ReadyState,
    pub timeout: Duration,
}

impl WaitPolicy {
    /// Wait for the DOM only, bounded by the navigation timeout.
    pub fn dom_content_loaded() -> Self {
        Self {
            ready: ReadyState::Interactive,
            timeout: NAVIGATION_TIMEOUT,
        }
    }
}

/// An open page (browser tab).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageHandle {
    pub id: String,
    pub url: String,
}

/// An element living on some page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub page_id: String,
    pub id: String,
}

/// Page navigation and DOM access.
///
/// Element lookups that find nothing return an empty list, not an error.
/// Every method is bounded in time; `SessionError::NotFound` and
/// `SessionError::Timeout` from waits are recoverable.
#[async_trait]
pub trait WebSession: Send + Sync {
    /// Open `url` in a new page and wait according to `wait`.
    async fn navigate(&self, url: &str, wait: WaitPolicy) -> Result<PageHandle, SessionError>;

    async fn locate_all(
        &self,
        page: &PageHandle,
        selector: &Selector,
    ) -> Result<Vec<ElementHandle>, SessionError>;

    /// Locate descendants of `element`.
    async fn locate_in(
        &self,
        element: &ElementHandle,
        selector: &Selector,
    ) -> Result<Vec<ElementHandle>, SessionError>;

    async fn inner_text(&self, element: &ElementHandle) -> Result<String, SessionError>;

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SessionError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), SessionError>;

    async fn scroll(&self, page: &PageHandle, dx: i64, dy: i64) -> Result<(), SessionError>;

    async fn reload(&self, page: &PageHandle, wait: WaitPolicy) -> Result<(), SessionError>;

    async fn close(&self, page: &PageHandle) -> Result<(), SessionError>;

    /// Poll until `selector` matches at least one element or `timeout` passes.
    async fn wait_for(
        &self,
        page: &PageHandle,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<Vec<ElementHandle>, SessionError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let found = self.locate_all(page, selector).await?;
            if !found.is_empty() {
                return Ok(found);
            }
            if tokio::time::Instant::now() >= deadline {
                debug!(selector = %selector, ?timeout, "Selector wait expired");
                return Err(SessionError::NotFound {
                    selector: selector.to_string(),
                });
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }
}
