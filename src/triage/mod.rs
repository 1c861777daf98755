//! Invitation triage.
//!
//! Each pending invitation flows through:
//! 1. `ProfileScraper::scrape()`: about text, connection count, recent posts
//! 2. `DecisionEngine::evaluate()`: blocklist, thin network, risk gate, scoring
//! 3. `InvitationProcessor`: clicks accept or records the rejection
//!
//! Hard rejects never reach the acceptance threshold, and nothing is clicked
//! in report mode.

pub mod engine;
pub mod filter;
pub mod pacing;
pub mod profile;
pub mod queue;
pub mod rejection_log;
pub mod risk;
pub mod types;
pub mod window;

pub use engine::{DecisionEngine, ScoringPolicy};
pub use queue::{CardOutcome, DoneReason, InvitationProcessor, ProcessMode, RunSummary};
pub use types::{Candidate, HardReject, Outcome, Verdict};
