//! End-to-end runs of the invitation processor.
//!
//! Each test drives the real engine, scraper and file rejection log over a
//! scripted in-memory browser session.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use invite_triage::config::TriageConfig;
use invite_triage::testing::{InstantPacer, ScriptedProfile, ScriptedSession, StubLlm};
use invite_triage::triage::profile::ScrapeConfig;
use invite_triage::triage::queue::QueueConfig;
use invite_triage::triage::rejection_log::FileRejectionLog;
use invite_triage::triage::risk::RiskGate;
use invite_triage::triage::{
    CardOutcome, DecisionEngine, DoneReason, HardReject, InvitationProcessor, RunSummary,
};

/// Maximum time any run is allowed to take before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn url(slug: &str) -> String {
    format!("https://www.linkedin.com/in/{slug}/")
}

/// Default configuration with every wait shortened to zero.
fn test_config(max_invitations: usize) -> TriageConfig {
    let mut config = TriageConfig::from_lookup(|key| match key {
        "OPENAI_API_KEY" => Some("sk-test".to_string()),
        _ => None,
    })
    .unwrap();
    config.queue = QueueConfig {
        max_invitations,
        page_wait: Duration::ZERO,
        list_wait: Duration::ZERO,
        scrape: ScrapeConfig {
            about_wait: Duration::ZERO,
            profile_settle: Duration::ZERO,
            activity_settle: Duration::ZERO,
            ..ScrapeConfig::default()
        },
        ..config.queue
    };
    config
}

async fn run(
    session: ScriptedSession,
    llm: Arc<StubLlm>,
    config: TriageConfig,
    log_path: &Path,
) -> (RunSummary, Arc<ScriptedSession>) {
    let session = Arc::new(session);
    let engine = DecisionEngine::new(config.scoring, RiskGate::new(llm, config.risk_taxonomy));
    let processor = InvitationProcessor::new(
        session.clone(),
        engine,
        Arc::new(FileRejectionLog::new(log_path)),
        Arc::new(InstantPacer::new()),
        config.queue,
    );
    let summary = timeout(TEST_TIMEOUT, processor.run())
        .await
        .expect("run timed out")
        .expect("run failed");
    (summary, session)
}

fn logged(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn blocklisted_thin_and_strong_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("rejected.txt");
    let llm = Arc::new(StubLlm::replying("0.1"));

    let session = ScriptedSession::new()
        .with_cards(["/in/alice/", "/in/bob/", "https://www.linkedin.com/in/carol/"])
        .with_profile(
            &url("alice"),
            ScriptedProfile::new()
                .about("Harvard researcher. Ask me about the globalist cabal.")
                .connections("800 connections"),
        )
        .with_profile(
            &url("bob"),
            ScriptedProfile::new()
                .about("Freelance consultant")
                .connections("10 connections"),
        )
        .with_profile(
            &url("carol"),
            ScriptedProfile::new()
                .about("MIT Professional Education alumna, Generative AI program")
                .connections("200 connections")
                .posts([
                    "Shipped a new retrieval pipeline this week, lessons learned on chunking.",
                    "Hiring two backend engineers in Boston.",
                ]),
        );

    let (summary, session) = run(session, llm.clone(), test_config(40), &log_path).await;

    assert_eq!(
        summary.outcomes(),
        vec![
            CardOutcome::Rejected,
            CardOutcome::Rejected,
            CardOutcome::Accepted
        ]
    );
    assert_eq!(summary.processed, 3);
    assert_eq!(logged(&log_path), vec![url("alice"), url("bob")]);
    assert_eq!(
        session.accepted(),
        vec!["https://www.linkedin.com/in/carol/".to_string()]
    );

    let reasons: Vec<_> = summary
        .decisions
        .iter()
        .map(|d| d.verdict.as_ref().and_then(|v| v.hard_reject.clone()))
        .collect();
    assert!(matches!(reasons[0], Some(HardReject::Blocklisted { .. })));
    assert_eq!(reasons[1], Some(HardReject::ThinNetwork { connections: 10 }));
    assert_eq!(reasons[2], None);
    assert_eq!(summary.decisions[2].verdict.as_ref().map(|v| v.score), Some(6));

    // Only carol had enough post text to classify.
    assert_eq!(llm.calls(), 1);
    // Rejected cards stay on the list, so the run ends on the reload.
    assert_eq!(summary.done, DoneReason::NoFreshCards);
    assert_eq!(session.open_pages(), 0);
}

#[tokio::test]
async fn cap_holds_across_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("rejected.txt");
    let slugs: Vec<String> = (0..7).map(|i| format!("member-{i}")).collect();

    let mut session = ScriptedSession::new()
        .with_page_size(3)
        .with_cards(slugs.iter().map(|s| format!("/in/{s}/")));
    for slug in &slugs {
        session = session.with_profile(
            &url(slug),
            ScriptedProfile::new()
                .about("Harvard Extension, Generative AI")
                .connections("500+ connections"),
        );
    }

    let (summary, session) = run(
        session,
        Arc::new(StubLlm::replying("0.0")),
        test_config(5),
        &log_path,
    )
    .await;

    assert_eq!(summary.done, DoneReason::CapReached);
    assert_eq!(summary.processed, 5);
    assert_eq!(summary.accepted, 5);
    assert_eq!(session.accepted().len(), 5);
    assert_eq!(session.reloads(), 1);
    assert!(logged(&log_path).is_empty());
}

#[tokio::test]
async fn run_terminates_when_the_list_empties() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("rejected.txt");

    let session = ScriptedSession::new()
        .with_page_size(2)
        .with_cards(["/in/p1/", "/in/p2/", "/in/p3/"])
        .with_profile(
            &url("p1"),
            ScriptedProfile::new().about("MIT").connections("90 connections"),
        )
        .with_profile(
            &url("p2"),
            ScriptedProfile::new().about("MIT").connections("90 connections"),
        )
        .with_profile(
            &url("p3"),
            ScriptedProfile::new().about("MIT").connections("90 connections"),
        );

    let (summary, _) = run(
        session,
        Arc::new(StubLlm::replying("0.0")),
        test_config(40),
        &log_path,
    )
    .await;

    assert_eq!(summary.done, DoneReason::Exhausted);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.accepted, 3);
}

#[tokio::test]
async fn high_risk_posts_are_rejected_even_with_strong_signals() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("rejected.txt");
    let session = ScriptedSession::new().with_cards(["/in/loud/"]).with_profile(
        &url("loud"),
        ScriptedProfile::new()
            .about("MIT Professional Education, Generative AI")
            .connections("900 connections")
            .posts(["A very long and very heated post about a divisive political topic."]),
    );

    let (summary, _) = run(
        session,
        Arc::new(StubLlm::replying("0.95")),
        test_config(40),
        &log_path,
    )
    .await;

    assert_eq!(summary.outcomes(), vec![CardOutcome::Rejected]);
    assert!(matches!(
        summary.decisions[0].verdict.as_ref().and_then(|v| v.hard_reject.clone()),
        Some(HardReject::HighRisk { .. })
    ));
    assert_eq!(logged(&log_path), vec![url("loud")]);
}
