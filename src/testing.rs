//! In-memory collaborators for tests.
//!
//! `ScriptedSession` serves one invitation list plus any number of profiles
//! and their activity pages. Accepted cards disappear from the list on the
//! next load; rejected ones stay visible, as on the real site.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{LlmError, RejectionLogError, SessionError};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};
use crate::session::{ElementHandle, PageHandle, Selector, WaitPolicy, WebSession};
use crate::triage::pacing::Pacer;
use crate::triage::profile::{RECENT_ACTIVITY_PATH, ScrapeConfig};
use crate::triage::queue::QueueConfig;
use crate::triage::rejection_log::RejectionLog;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── LLM ─────────────────────────────────────────────────────────────

/// Provider that returns a fixed reply, or always fails.
pub struct StubLlm {
    reply: Option<String>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl StubLlm {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Content of the last user message received.
    pub fn last_prompt(&self) -> Option<String> {
        locked(&self.last_prompt).clone()
    }
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone());
        *locked(&self.last_prompt) = prompt;

        match &self.reply {
            Some(reply) => Ok(CompletionResponse {
                content: reply.clone(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
            }),
            None => Err(LlmError::RequestFailed {
                provider: "stub".to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

// ── Rejection log and pacing ────────────────────────────────────────

#[derive(Default)]
pub struct MemoryRejectionLog {
    entries: Mutex<Vec<String>>,
    failing: bool,
}

impl MemoryRejectionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log whose every append fails.
    pub fn failing() -> Self {
        Self {
            entries: Mutex::default(),
            failing: true,
        }
    }

    pub fn entries(&self) -> Vec<String> {
        locked(&self.entries).clone()
    }
}

#[async_trait]
impl RejectionLog for MemoryRejectionLog {
    async fn append(&self, url: &str) -> Result<(), RejectionLogError> {
        if self.failing {
            return Err(RejectionLogError::Append {
                path: "memory".to_string(),
                source: std::io::Error::other("disk full"),
            });
        }
        locked(&self.entries).push(url.to_string());
        Ok(())
    }
}

/// Pacer that never sleeps and counts its pauses.
#[derive(Default)]
pub struct InstantPacer {
    pauses: AtomicUsize,
}

impl InstantPacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pacer for InstantPacer {
    async fn pause(&self, _min_secs: f64, _max_secs: f64) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }

    async fn pause_default(&self) {
        self.pause(0.0, 0.0).await;
    }
}

// ── Browser session ─────────────────────────────────────────────────

/// Content served for one profile URL.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProfile {
    about: Option<String>,
    connections: Option<String>,
    elements: Vec<(Selector, String)>,
    posts: Vec<String>,
    activity_unavailable: bool,
}

impl ScriptedProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text for the first default about-text strategy.
    pub fn about(mut self, text: &str) -> Self {
        self.about = Some(text.to_string());
        self
    }

    /// Label of the connection-count element, e.g. "500+ connections".
    pub fn connections(mut self, label: &str) -> Self {
        self.connections = Some(label.to_string());
        self
    }

    /// Arbitrary element matched by a CSS selector.
    pub fn element(mut self, css: &str, text: &str) -> Self {
        self.elements.push((Selector::css(css), text.to_string()));
        self
    }

    /// Post texts on the activity page, most recent first.
    pub fn posts<I, S>(mut self, posts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.posts = posts.into_iter().map(Into::into).collect();
        self
    }

    pub fn activity_unavailable(mut self) -> Self {
        self.activity_unavailable = true;
        self
    }

    fn texts_for(&self, selector: &Selector) -> Vec<String> {
        let defaults = ScrapeConfig::default();
        let mut texts = Vec::new();
        if let Some(about) = &self.about
            && defaults.about.first() == Some(selector)
        {
            texts.push(about.clone());
        }
        if let Some(label) = &self.connections
            && &defaults.connections == selector
        {
            texts.push(label.clone());
        }
        texts.extend(
            self.elements
                .iter()
                .filter(|(s, _)| s == selector)
                .map(|(_, text)| text.clone()),
        );
        texts
    }
}

#[derive(Debug, Clone)]
struct ScriptedCard {
    href: String,
    has_accept: bool,
}

#[derive(Debug, Clone)]
enum PageKind {
    List,
    Profile(String),
    Activity(String),
}

#[derive(Debug, Clone)]
enum Node {
    Card(usize),
    Link(String),
    AcceptButton(usize),
    Text(String),
}

#[derive(Default)]
struct SessionState {
    next_id: u64,
    pages: HashMap<String, PageKind>,
    visible: Vec<usize>,
    elements: HashMap<String, (String, Node)>,
    accepted: HashSet<usize>,
    accept_order: Vec<usize>,
    reloads: usize,
}

impl SessionState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn add_element(&mut self, page_id: &str, node: Node) -> ElementHandle {
        let id = self.next_id("el");
        self.elements
            .insert(id.clone(), (page_id.to_string(), node));
        ElementHandle {
            page_id: page_id.to_string(),
            id,
        }
    }

    fn node(&self, element: &ElementHandle) -> Result<Node, SessionError> {
        self.elements
            .get(&element.id)
            .map(|(_, node)| node.clone())
            .ok_or_else(|| SessionError::NotFound {
                selector: format!("element {}", element.id),
            })
    }

    fn page(&self, page: &PageHandle) -> Result<PageKind, SessionError> {
        self.pages
            .get(&page.id)
            .cloned()
            .ok_or_else(|| SessionError::Protocol {
                error: "no such window".to_string(),
                message: format!("page {} is closed", page.id),
            })
    }
}

/// In-memory `WebSession` over a scripted invitation list and profiles.
pub struct ScriptedSession {
    list_url: String,
    accept_selector: Selector,
    cards: Vec<ScriptedCard>,
    profiles: HashMap<String, ScriptedProfile>,
    page_size: Option<usize>,
    failing_reload: bool,
    unreachable_list: bool,
    state: Mutex<SessionState>,
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSession {
    /// Serves the list at the default invitation URL.
    pub fn new() -> Self {
        let queue = QueueConfig::default();
        Self {
            list_url: queue
                .invitation_url()
                .map(String::from)
                .unwrap_or_default(),
            accept_selector: queue.accept_button,
            cards: Vec::new(),
            profiles: HashMap::new(),
            page_size: None,
            failing_reload: false,
            unreachable_list: false,
            state: Mutex::default(),
        }
    }

    pub fn list_url(&self) -> &str {
        &self.list_url
    }

    /// Cards with an accept control; an empty href means no profile link.
    pub fn with_cards<I, S>(mut self, hrefs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cards.extend(hrefs.into_iter().map(|href| ScriptedCard {
            href: href.into(),
            has_accept: true,
        }));
        self
    }

    pub fn with_card_without_accept(mut self, href: &str) -> Self {
        self.cards.push(ScriptedCard {
            href: href.to_string(),
            has_accept: false,
        });
        self
    }

    pub fn with_profile(mut self, url: &str, profile: ScriptedProfile) -> Self {
        self.profiles.insert(url.to_string(), profile);
        self
    }

    /// Show at most `size` pending cards per load.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn with_failing_reload(mut self) -> Self {
        self.failing_reload = true;
        self
    }

    pub fn with_unreachable_list(mut self) -> Self {
        self.unreachable_list = true;
        self
    }

    /// Hrefs of accepted cards, in click order.
    pub fn accepted(&self) -> Vec<String> {
        let state = locked(&self.state);
        state
            .accept_order
            .iter()
            .map(|&i| self.cards[i].href.clone())
            .collect()
    }

    pub fn reloads(&self) -> usize {
        locked(&self.state).reloads
    }

    /// Pages navigated to and not yet closed.
    pub fn open_pages(&self) -> usize {
        locked(&self.state).pages.len()
    }

    fn pending_cards(&self, accepted: &HashSet<usize>) -> Vec<usize> {
        let pending = (0..self.cards.len()).filter(|i| !accepted.contains(i));
        match self.page_size {
            Some(size) => pending.take(size).collect(),
            None => pending.collect(),
        }
    }

    fn resolve(&self, url: &str) -> Result<PageKind, SessionError> {
        if url == self.list_url {
            if self.unreachable_list {
                return Err(SessionError::Transport(format!("cannot reach {url}")));
            }
            return Ok(PageKind::List);
        }
        if self.profiles.contains_key(url) {
            return Ok(PageKind::Profile(url.to_string()));
        }
        if let Some(profile_url) = url.strip_suffix(RECENT_ACTIVITY_PATH)
            && let Some(profile) = self.profiles.get(profile_url)
            && !profile.activity_unavailable
        {
            return Ok(PageKind::Activity(profile_url.to_string()));
        }
        Err(SessionError::Timeout {
            what: format!("navigation to {url}"),
            timeout: crate::session::NAVIGATION_TIMEOUT,
        })
    }
}

#[async_trait]
impl WebSession for ScriptedSession {
    async fn navigate(&self, url: &str, _wait: WaitPolicy) -> Result<PageHandle, SessionError> {
        let kind = self.resolve(url)?;
        let mut state = locked(&self.state);
        if matches!(kind, PageKind::List) {
            let visible = self.pending_cards(&state.accepted);
            state.visible = visible;
        }
        let id = state.next_id("page");
        state.pages.insert(id.clone(), kind);
        Ok(PageHandle {
            id,
            url: url.to_string(),
        })
    }

    async fn locate_all(
        &self,
        page: &PageHandle,
        selector: &Selector,
    ) -> Result<Vec<ElementHandle>, SessionError> {
        let mut state = locked(&self.state);
        let nodes: Vec<Node> = match state.page(page)? {
            PageKind::List => state.visible.iter().map(|&i| Node::Card(i)).collect(),
            PageKind::Profile(url) => self.profiles[&url]
                .texts_for(selector)
                .into_iter()
                .map(Node::Text)
                .collect(),
            PageKind::Activity(url) => self.profiles[&url]
                .posts
                .iter()
                .cloned()
                .map(Node::Text)
                .collect(),
        };
        Ok(nodes
            .into_iter()
            .map(|node| state.add_element(&page.id, node))
            .collect())
    }

    async fn locate_in(
        &self,
        element: &ElementHandle,
        selector: &Selector,
    ) -> Result<Vec<ElementHandle>, SessionError> {
        let mut state = locked(&self.state);
        let Node::Card(index) = state.node(element)? else {
            return Ok(Vec::new());
        };
        let card = &self.cards[index];
        let node = if *selector == self.accept_selector {
            card.has_accept.then_some(Node::AcceptButton(index))
        } else {
            (!card.href.is_empty()).then(|| Node::Link(card.href.clone()))
        };
        Ok(node
            .into_iter()
            .map(|node| state.add_element(&element.page_id, node))
            .collect())
    }

    async fn inner_text(&self, element: &ElementHandle) -> Result<String, SessionError> {
        let state = locked(&self.state);
        Ok(match state.node(element)? {
            Node::Card(index) => self.cards[index].href.clone(),
            Node::Link(href) => href,
            Node::AcceptButton(_) => "Accept".to_string(),
            Node::Text(text) => text,
        })
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SessionError> {
        let state = locked(&self.state);
        Ok(match state.node(element)? {
            Node::Link(href) if name == "href" => Some(href),
            _ => None,
        })
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), SessionError> {
        let mut state = locked(&self.state);
        if let Node::AcceptButton(index) = state.node(element)?
            && state.accepted.insert(index)
        {
            state.accept_order.push(index);
        }
        Ok(())
    }

    async fn scroll(&self, page: &PageHandle, _dx: i64, _dy: i64) -> Result<(), SessionError> {
        locked(&self.state).page(page).map(|_| ())
    }

    async fn reload(&self, page: &PageHandle, _wait: WaitPolicy) -> Result<(), SessionError> {
        if self.failing_reload {
            return Err(SessionError::Transport("reload failed".to_string()));
        }
        let mut state = locked(&self.state);
        if matches!(state.page(page)?, PageKind::List) {
            let visible = self.pending_cards(&state.accepted);
            state.visible = visible;
        }
        state.reloads += 1;
        Ok(())
    }

    async fn close(&self, page: &PageHandle) -> Result<(), SessionError> {
        let mut state = locked(&self.state);
        state.pages.remove(&page.id);
        state.elements.retain(|_, (page_id, _)| page_id != &page.id);
        Ok(())
    }
}
