//! Invitation queue processor: drives the decision engine over the list.
//!
//! States:
//! 1. Idle → open the invitation list and wait for cards
//! 2. Loaded(cards) → evaluate each card and apply its verdict
//! 3. Reloading → refresh the list when under the cap
//! 4. Done(reason) → close the list page and report
//!
//! Candidates are handled strictly one at a time. Per-card failures are
//! logged and counted as skipped; only failing to open the list aborts a run.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, error, info, info_span, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{ConfigError, Error};
use crate::session::{ElementHandle, PageHandle, Selector, WaitPolicy, WebSession};
use crate::triage::engine::DecisionEngine;
use crate::triage::pacing::Pacer;
use crate::triage::profile::{ProfileScraper, ScrapeConfig};
use crate::triage::rejection_log::RejectionLog;
use crate::triage::types::Verdict;

/// Path of the pending-invitation list relative to the site origin.
pub const INVITATION_MANAGER_PATH: &str = "/mynetwork/invitation-manager/";

pub const DEFAULT_SITE_ORIGIN: &str = "https://www.linkedin.com";

/// Whether verdicts are acted on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessMode {
    /// Click accept or record the rejection.
    #[default]
    Apply,
    /// Evaluate only; hard rejects are flagged in the summary.
    Report,
}

impl FromStr for ProcessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apply" => Ok(Self::Apply),
            "report" => Ok(Self::Report),
            _ => Err(format!("expected apply or report, got '{s}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Upper bound on cards processed in one run.
    pub max_invitations: usize,
    /// Settle time after the list loads or reloads.
    pub page_wait: Duration,
    /// How long to wait for the first invitation card.
    pub list_wait: Duration,
    pub site_origin: Url,
    pub invitation_path: String,
    pub card: Selector,
    /// Accept control, located inside a card.
    pub accept_button: Selector,
    pub mode: ProcessMode,
    pub scrape: ScrapeConfig,
}

impl QueueConfig {
    pub fn invitation_url(&self) -> Result<Url, url::ParseError> {
        self.site_origin.join(&self.invitation_path)
    }
}

/// Parsed `DEFAULT_SITE_ORIGIN`.
pub fn default_site_origin() -> Url {
    Url::parse(DEFAULT_SITE_ORIGIN).expect("default site origin is a valid URL")
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_invitations: 40,
            page_wait: Duration::from_secs(5),
            list_wait: Duration::from_secs(30),
            site_origin: default_site_origin(),
            invitation_path: INVITATION_MANAGER_PATH.to_string(),
            card: Selector::css(r#"div[data-view-name="pending-invitation"] div[role="listitem"]"#),
            accept_button: Selector::xpath(".//button[contains(normalize-space(.), 'Accept')]"),
            mode: ProcessMode::Apply,
            scrape: ScrapeConfig::default(),
        }
    }
}

/// What happened to one card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardOutcome {
    Accepted,
    Rejected,
    /// Could not be evaluated or acted on; no action taken.
    Skipped,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneReason {
    /// The list had no cards on first load.
    NoInvitations,
    CapReached,
    /// The list was empty after a reload.
    Exhausted,
    /// Every visible card had already been handled this run.
    NoFreshCards,
    ReloadFailed,
    Shutdown,
}

impl fmt::Display for DoneReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NoInvitations => "no pending invitations",
            Self::CapReached => "invitation cap reached",
            Self::Exhausted => "invitation list exhausted",
            Self::NoFreshCards => "no unhandled invitations left",
            Self::ReloadFailed => "list reload failed",
            Self::Shutdown => "shutdown requested",
        };
        f.write_str(label)
    }
}

/// One handled card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub profile_url: Option<String>,
    pub outcome: CardOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub mode: ProcessMode,
    pub done: DoneReason,
    /// Cards counted against the cap, whatever their outcome.
    pub processed: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub skipped: usize,
    /// Rejections that could not be written to the rejection log.
    pub log_failures: usize,
    /// Hard-rejected profiles seen in report mode.
    pub flagged: Vec<String>,
    pub decisions: Vec<Decision>,
}

impl RunSummary {
    fn new(run_id: Uuid, mode: ProcessMode) -> Self {
        Self {
            run_id,
            mode,
            done: DoneReason::NoInvitations,
            processed: 0,
            accepted: 0,
            rejected: 0,
            skipped: 0,
            log_failures: 0,
            flagged: Vec::new(),
            decisions: Vec::new(),
        }
    }

    fn record(&mut self, decision: Decision) {
        self.processed += 1;
        match decision.outcome {
            CardOutcome::Accepted => self.accepted += 1,
            CardOutcome::Rejected => self.rejected += 1,
            CardOutcome::Skipped => self.skipped += 1,
        }
        self.decisions.push(decision);
    }

    /// Outcomes in processing order.
    pub fn outcomes(&self) -> Vec<CardOutcome> {
        self.decisions.iter().map(|d| d.outcome).collect()
    }
}

enum QueueState {
    Idle,
    Loaded(Vec<ElementHandle>),
    Reloading,
    Done(DoneReason),
}

pub struct InvitationProcessor {
    session: Arc<dyn WebSession>,
    engine: DecisionEngine,
    scraper: ProfileScraper,
    rejection_log: Arc<dyn RejectionLog>,
    pacer: Arc<dyn Pacer>,
    config: QueueConfig,
    shutdown: Arc<AtomicBool>,
}

impl InvitationProcessor {
    pub fn new(
        session: Arc<dyn WebSession>,
        engine: DecisionEngine,
        rejection_log: Arc<dyn RejectionLog>,
        pacer: Arc<dyn Pacer>,
        config: QueueConfig,
    ) -> Self {
        let scraper = ProfileScraper::new(
            session.clone(),
            config.site_origin.clone(),
            config.scrape.clone(),
        );
        Self {
            session,
            engine,
            scraper,
            rejection_log,
            pacer,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Use an externally owned shutdown flag.
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Flag that stops the run before the next card when set.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Process the invitation list until the cap, the list, or a shutdown
    /// ends the run.
    ///
    /// Returns an error only when the list page cannot be opened.
    pub async fn run(&self) -> Result<RunSummary, Error> {
        let run_id = Uuid::new_v4();
        let span = info_span!("triage_run", %run_id, mode = ?self.config.mode);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<RunSummary, Error> {
        let url = self
            .config
            .invitation_url()
            .map_err(|e| ConfigError::invalid("TRIAGE_SITE_ORIGIN", e.to_string()))?;
        info!(
            url = %url,
            max_invitations = self.config.max_invitations,
            "Opening invitation list"
        );
        let list = self
            .session
            .navigate(url.as_str(), WaitPolicy::dom_content_loaded())
            .await?;

        let mut summary = RunSummary::new(run_id, self.config.mode);
        let mut seen = HashSet::new();
        let mut state = QueueState::Idle;

        let done = loop {
            state = match state {
                QueueState::Idle => match self.load_cards(&list).await {
                    Some(cards) => QueueState::Loaded(cards),
                    None => QueueState::Done(DoneReason::NoInvitations),
                },
                QueueState::Loaded(cards) => {
                    self.process_batch(&cards, &mut seen, &mut summary).await
                }
                QueueState::Reloading => self.reload(&list).await,
                QueueState::Done(reason) => break reason,
            };
        };
        summary.done = done;

        if let Err(e) = self.session.close(&list).await {
            debug!(error = %e, "Closing invitation list failed");
        }

        info!(
            done = %done,
            processed = summary.processed,
            accepted = summary.accepted,
            rejected = summary.rejected,
            skipped = summary.skipped,
            log_failures = summary.log_failures,
            flagged = summary.flagged.len(),
            "Run finished"
        );
        Ok(summary)
    }

    /// Wait for cards, then let the page settle. `None` when there are none.
    async fn load_cards(&self, list: &PageHandle) -> Option<Vec<ElementHandle>> {
        let cards = match self
            .session
            .wait_for(list, &self.config.card, self.config.list_wait)
            .await
        {
            Ok(cards) => cards,
            Err(e) if e.is_not_found() => {
                debug!("No invitation cards on the list");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Could not read invitation cards");
                return None;
            }
        };
        info!(count = cards.len(), "Invitation cards loaded");
        tokio::time::sleep(self.config.page_wait).await;
        Some(cards)
    }

    async fn reload(&self, list: &PageHandle) -> QueueState {
        debug!("Reloading invitation list");
        if let Err(e) = self
            .session
            .reload(list, WaitPolicy::dom_content_loaded())
            .await
        {
            error!(error = %e, "Invitation list reload failed");
            return QueueState::Done(DoneReason::ReloadFailed);
        }
        tokio::time::sleep(self.config.page_wait).await;
        match self.load_cards(list).await {
            Some(cards) => QueueState::Loaded(cards),
            None => QueueState::Done(DoneReason::Exhausted),
        }
    }

    async fn process_batch(
        &self,
        cards: &[ElementHandle],
        seen: &mut HashSet<String>,
        summary: &mut RunSummary,
    ) -> QueueState {
        let mut fresh = 0usize;

        for card in cards {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested, stopping before next invitation");
                return QueueState::Done(DoneReason::Shutdown);
            }
            if summary.processed >= self.config.max_invitations {
                return QueueState::Done(DoneReason::CapReached);
            }

            let profile_url = match self.scraper.profile_url(card).await {
                Ok(url) => url,
                Err(e) => {
                    error!(error = %e, "Skipping invitation: profile link unresolved");
                    summary.record(Decision {
                        profile_url: None,
                        outcome: CardOutcome::Skipped,
                        verdict: None,
                    });
                    continue;
                }
            };
            if !seen.insert(profile_url.clone()) {
                debug!(profile = %profile_url, "Already handled this run");
                continue;
            }
            fresh += 1;

            let decision = self.handle_card(card, profile_url, summary).await;
            summary.record(decision);
        }

        if fresh == 0 {
            return QueueState::Done(DoneReason::NoFreshCards);
        }
        if summary.processed >= self.config.max_invitations {
            return QueueState::Done(DoneReason::CapReached);
        }
        QueueState::Reloading
    }

    async fn handle_card(
        &self,
        card: &ElementHandle,
        profile_url: String,
        summary: &mut RunSummary,
    ) -> Decision {
        let skipped = |profile_url: String| Decision {
            profile_url: Some(profile_url),
            outcome: CardOutcome::Skipped,
            verdict: None,
        };

        let candidate = match self.scraper.scrape(&profile_url).await {
            Ok(candidate) => candidate,
            Err(e) => {
                error!(profile = %profile_url, error = %e, "Skipping invitation: profile unavailable");
                return skipped(profile_url);
            }
        };
        let verdict = match self.engine.evaluate(&candidate).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(profile = %profile_url, error = %e, "Skipping invitation: evaluation failed");
                return skipped(profile_url);
            }
        };
        info!(
            profile = %profile_url,
            score = verdict.score,
            outcome = ?verdict.outcome,
            hard_reject = verdict.hard_reject.as_ref().map(|r| r.label()),
            "Verdict"
        );
        self.pacer.pause_default().await;

        let outcome = match self.config.mode {
            ProcessMode::Apply => self.apply(card, &profile_url, &verdict, summary).await,
            ProcessMode::Report => {
                if verdict.is_hard_reject() {
                    summary.flagged.push(profile_url.clone());
                }
                if verdict.is_accept() {
                    CardOutcome::Accepted
                } else {
                    CardOutcome::Rejected
                }
            }
        };
        self.pacer.pause_default().await;

        Decision {
            profile_url: Some(profile_url),
            outcome,
            verdict: Some(verdict),
        }
    }

    async fn apply(
        &self,
        card: &ElementHandle,
        profile_url: &str,
        verdict: &Verdict,
        summary: &mut RunSummary,
    ) -> CardOutcome {
        if verdict.is_accept() {
            match self.accept_control(card).await {
                Some(button) => {
                    return match self.session.click(&button).await {
                        Ok(()) => {
                            info!(profile = %profile_url, "Invitation accepted");
                            CardOutcome::Accepted
                        }
                        Err(e) => {
                            error!(profile = %profile_url, error = %e, "Accept click failed");
                            CardOutcome::Skipped
                        }
                    };
                }
                None => {
                    warn!(profile = %profile_url, "No accept control on card, recording as rejected");
                }
            }
        }

        if let Err(e) = self.rejection_log.append(profile_url).await {
            error!(profile = %profile_url, error = %e, "Failed to record rejection");
            summary.log_failures += 1;
        }
        CardOutcome::Rejected
    }

    async fn accept_control(&self, card: &ElementHandle) -> Option<ElementHandle> {
        match self
            .session
            .locate_in(card, &self.config.accept_button)
            .await
        {
            Ok(mut buttons) if !buttons.is_empty() => Some(buttons.swap_remove(0)),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "Accept control lookup failed");
                None
            }
        }
    }
}
