use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use invite_triage::config::TriageConfig;
use invite_triage::llm::create_provider;
use invite_triage::session::WebDriverSession;
use invite_triage::triage::pacing::HumanPacer;
use invite_triage::triage::rejection_log::FileRejectionLog;
use invite_triage::triage::risk::RiskGate;
use invite_triage::triage::{DecisionEngine, InvitationProcessor, ProcessMode};

const LOG_FILE_PREFIX: &str = "invite-triage.log";

/// Console logging, plus a daily rolling file when `log_dir` is set.
///
/// The returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match TriageConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("  export OPENAI_API_KEY=sk-...   (or TRIAGE_LLM_BACKEND=anthropic)");
            return Err(e.into());
        }
    };

    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("🤝 Invite Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Mode: {:?}", config.queue.mode);
    eprintln!("   Cap: {} invitations", config.queue.max_invitations);
    eprintln!("   Rejected log: {}", config.rejected_log_path.display());

    if !config.window.is_open_now() {
        info!(window = ?config.window, "Outside active hours, nothing to do");
        eprintln!("   Outside active hours, exiting.");
        return Ok(());
    }

    let llm = create_provider(&config.llm)?;
    let engine = DecisionEngine::new(
        config.scoring.clone(),
        RiskGate::new(llm, config.risk_taxonomy.clone()),
    );

    let session = Arc::new(WebDriverSession::start(&config.browser).await?);
    info!(webdriver = %config.browser.webdriver_url, "Browser session started");

    let processor = InvitationProcessor::new(
        session.clone(),
        engine,
        Arc::new(FileRejectionLog::new(&config.rejected_log_path)),
        Arc::new(HumanPacer::new(config.pacing.clone())),
        config.queue.clone(),
    );

    let shutdown = processor.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current invitation");
            shutdown.store(true, Ordering::SeqCst);
        }
    });

    let result = processor.run().await;

    if let Err(e) = session.quit().await {
        warn!(error = %e, "Failed to close browser session");
    }

    let summary = result?;

    eprintln!();
    eprintln!("   Finished: {}", summary.done);
    eprintln!(
        "   Processed {} (accepted {}, rejected {}, skipped {})",
        summary.processed, summary.accepted, summary.rejected, summary.skipped
    );
    if summary.log_failures > 0 {
        eprintln!(
            "   ⚠ {} rejections could not be written to the log",
            summary.log_failures
        );
    }
    if config.queue.mode == ProcessMode::Report {
        eprintln!("   Flagged profiles: {}", summary.flagged.len());
        for url in &summary.flagged {
            eprintln!("     {}", url);
        }
    }

    Ok(())
}
