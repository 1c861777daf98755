//! Profile scraper: turns an invitation card into a `Candidate`.
//!
//! About-text extraction is an ordered list of selector strategies; the
//! first one that yields non-empty text wins and failures fall through to the
//! next. A failed profile load is an error for the card, a failed activity
//! page only means no posts.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use crate::error::{SessionError, TriageError};
use crate::session::{ElementHandle, PageHandle, Selector, WaitPolicy, WebSession};
use crate::triage::types::{Candidate, MAX_POSTS};

/// Path appended to a profile URL to reach its recent activity.
pub const RECENT_ACTIVITY_PATH: &str = "recent-activity/all/";

/// Selectors and settle times used while scraping.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeConfig {
    /// Link to the sender's profile inside an invitation card.
    pub profile_link: Selector,
    /// About-text strategies, tried in order.
    pub about: Vec<Selector>,
    /// How long each about strategy waits for its element.
    pub about_wait: Duration,
    pub connections: Selector,
    pub post: Selector,
    /// Pause after the profile page loads.
    pub profile_settle: Duration,
    /// Pause after the activity page loads.
    pub activity_settle: Duration,
    /// Vertical scroll applied to the profile to trigger lazy sections.
    pub scroll_dy: i64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            profile_link: Selector::css(r#"a[href*="/in/"]"#),
            about: vec![
                Selector::css("section.pv-about-section"),
                Selector::css(".pv-about__summary-text"),
                Selector::css(".pv-top-card--list-bullet"),
            ],
            about_wait: Duration::from_secs(5),
            connections: Selector::xpath("//span[contains(normalize-space(.), 'connections')]"),
            post: Selector::css("div.feed-shared-update-v2"),
            profile_settle: Duration::from_secs(5),
            activity_settle: Duration::from_secs(3),
            scroll_dy: 3000,
        }
    }
}

/// Resolve a card link against the site origin.
///
/// Hrefs are resolved the way a browser would, so relative, root-relative
/// and protocol-relative links all work. Query and fragment are dropped so
/// one profile always maps to one URL.
pub fn normalize_profile_url(href: &str, origin: &Url) -> Result<Url, url::ParseError> {
    let mut url = origin.join(href.trim())?;
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// URL of the recent-activity view for `profile_url`.
pub fn recent_activity_url(profile_url: &Url) -> Result<Url, url::ParseError> {
    let mut base = profile_url.clone();
    base.set_query(None);
    base.set_fragment(None);
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(RECENT_ACTIVITY_PATH)
}

/// Keep the digits of a connection label ("500+ connections" → 500).
pub fn parse_connection_count(label: &str) -> Option<u32> {
    let digits: String = label.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

pub struct ProfileScraper {
    session: Arc<dyn WebSession>,
    site_origin: Url,
    config: ScrapeConfig,
}

impl ProfileScraper {
    pub fn new(session: Arc<dyn WebSession>, site_origin: Url, config: ScrapeConfig) -> Self {
        Self {
            session,
            site_origin,
            config,
        }
    }

    /// Absolute profile URL linked from an invitation card.
    pub async fn profile_url(&self, card: &ElementHandle) -> Result<String, TriageError> {
        let links = self
            .session
            .locate_in(card, &self.config.profile_link)
            .await?;
        let Some(link) = links.first() else {
            return Err(TriageError::MissingProfileLink);
        };
        let href = match self.session.attribute(link, "href").await? {
            Some(href) if !href.trim().is_empty() => href,
            _ => return Err(TriageError::MissingProfileLink),
        };
        match normalize_profile_url(&href, &self.site_origin) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url.into()),
            _ => Err(TriageError::InvalidProfileLink { href }),
        }
    }

    /// Visit the profile and its activity page and build a candidate.
    pub async fn scrape(&self, profile_url: &str) -> Result<Candidate, TriageError> {
        let page = self
            .session
            .navigate(profile_url, WaitPolicy::dom_content_loaded())
            .await?;

        let (about, connections) = self.read_profile_page(&page).await;
        self.close_quietly(&page).await;

        let posts = self.collect_recent_posts(profile_url).await;

        let mut candidate = Candidate::new(profile_url)
            .with_about(about)
            .with_posts(posts);
        if let Some(count) = connections {
            candidate = candidate.with_connections(count);
        }
        debug!(
            profile = %candidate.profile_url,
            about_chars = candidate.about_text.len(),
            posts = candidate.posts.len(),
            connections = ?candidate.connection_count,
            "Profile scraped"
        );
        Ok(candidate)
    }

    async fn read_profile_page(&self, page: &PageHandle) -> (String, Option<u32>) {
        tokio::time::sleep(self.config.profile_settle).await;
        if let Err(e) = self.session.scroll(page, 0, self.config.scroll_dy).await {
            debug!(error = %e, "Scroll failed, continuing");
        }
        let about = self.extract_about(page).await;
        let connections = self.extract_connections(page).await;
        (about, connections)
    }

    /// First non-empty about text from the configured strategies.
    pub async fn extract_about(&self, page: &PageHandle) -> String {
        for selector in &self.config.about {
            match self.first_text(page, selector).await {
                Ok(text) if !text.is_empty() => return text,
                Ok(_) => debug!(selector = %selector, "About strategy found empty text"),
                Err(e) => debug!(selector = %selector, error = %e, "About strategy failed"),
            }
        }
        String::new()
    }

    pub async fn extract_connections(&self, page: &PageHandle) -> Option<u32> {
        let found = match self.session.locate_all(page, &self.config.connections).await {
            Ok(found) => found,
            Err(e) => {
                debug!(error = %e, "Connection count lookup failed");
                return None;
            }
        };
        let element = found.first()?;
        let label = self.session.inner_text(element).await.ok()?;
        let count = parse_connection_count(&label);
        if count.is_none() {
            warn!(label = %label.trim(), "Could not parse connection count");
        }
        count
    }

    /// Up to `MAX_POSTS` non-empty post texts from the activity page.
    ///
    /// Any failure yields whatever was collected so far (usually nothing).
    pub async fn collect_recent_posts(&self, profile_url: &str) -> Vec<String> {
        let url = match Url::parse(profile_url).and_then(|u| recent_activity_url(&u)) {
            Ok(url) => url,
            Err(e) => {
                warn!(profile = %profile_url, error = %e, "No activity URL for profile, no posts");
                return Vec::new();
            }
        };
        let page = match self
            .session
            .navigate(url.as_str(), WaitPolicy::dom_content_loaded())
            .await
        {
            Ok(page) => page,
            Err(e) => {
                warn!(url = %url, error = %e, "Activity page failed to load, no posts");
                return Vec::new();
            }
        };
        tokio::time::sleep(self.config.activity_settle).await;

        let mut posts = Vec::new();
        match self.session.locate_all(&page, &self.config.post).await {
            Ok(elements) => {
                for element in &elements {
                    if posts.len() == MAX_POSTS {
                        break;
                    }
                    match self.session.inner_text(element).await {
                        Ok(text) if !text.trim().is_empty() => posts.push(text.trim().to_string()),
                        Ok(_) => {}
                        Err(e) => debug!(error = %e, "Could not read post text"),
                    }
                }
            }
            Err(e) => debug!(url = %url, error = %e, "Post lookup failed"),
        }
        self.close_quietly(&page).await;
        posts
    }

    async fn first_text(
        &self,
        page: &PageHandle,
        selector: &Selector,
    ) -> Result<String, SessionError> {
        let found = self
            .session
            .wait_for(page, selector, self.config.about_wait)
            .await?;
        match found.first() {
            Some(element) => Ok(self.session.inner_text(element).await?.trim().to_string()),
            None => Ok(String::new()),
        }
    }

    async fn close_quietly(&self, page: &PageHandle) {
        if let Err(e) = self.session.close(page).await {
            debug!(url = %page.url, error = %e, "Closing page failed");
        }
    }
}
