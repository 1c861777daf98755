//! Shared types for invitation triage.

use serde::{Deserialize, Serialize};

/// Score assigned to every hard-reject path.
pub const HARD_REJECT_SCORE: i32 = -10;

/// Maximum number of recent posts collected per candidate.
pub const MAX_POSTS: usize = 5;

// ── Candidate ───────────────────────────────────────────────────────

/// A pending invitation sender under evaluation.
///
/// Built fresh for each invitation card and discarded after its verdict is
/// applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Absolute profile URL; unique within a run.
    pub profile_url: String,
    /// Best-effort summary text; empty when nothing could be extracted.
    pub about_text: String,
    /// Up to `MAX_POSTS` recent posts, most recent first.
    pub posts: Vec<String>,
    /// `None` when the count was missing or unparseable.
    pub connection_count: Option<u32>,
}

impl Candidate {
    pub fn new(profile_url: impl Into<String>) -> Self {
        Self {
            profile_url: profile_url.into(),
            about_text: String::new(),
            posts: Vec::new(),
            connection_count: None,
        }
    }

    pub fn with_about(mut self, about_text: impl Into<String>) -> Self {
        self.about_text = about_text.into();
        self
    }

    pub fn with_posts<I, S>(mut self, posts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.posts = posts.into_iter().map(Into::into).take(MAX_POSTS).collect();
        self
    }

    pub fn with_connections(mut self, count: u32) -> Self {
        self.connection_count = Some(count);
        self
    }
}

// ── Verdict ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Accept,
    Reject,
}

/// Why a candidate was rejected without scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HardReject {
    /// About text or a post contains a blocklisted term.
    Blocklisted { keyword: String },
    /// Too few connections and no recognised affiliation.
    ThinNetwork { connections: u32 },
    /// Classifier risk at or above the threshold.
    HighRisk { risk: f64 },
}

impl HardReject {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Blocklisted { .. } => "blocklisted",
            Self::ThinNetwork { .. } => "thin_network",
            Self::HighRisk { .. } => "high_risk",
        }
    }
}

/// The decision engine's output for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub score: i32,
    pub outcome: Outcome,
    /// Set iff `score == HARD_REJECT_SCORE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_reject: Option<HardReject>,
    /// Risk value used for the decision (0.0 when not classified).
    pub risk: f64,
}

impl Verdict {
    pub fn hard_reject(reason: HardReject, risk: f64) -> Self {
        Self {
            score: HARD_REJECT_SCORE,
            outcome: Outcome::Reject,
            hard_reject: Some(reason),
            risk,
        }
    }

    pub fn scored(score: i32, threshold: i32, risk: f64) -> Self {
        let outcome = if score >= threshold {
            Outcome::Accept
        } else {
            Outcome::Reject
        };
        Self {
            score,
            outcome,
            hard_reject: None,
            risk,
        }
    }

    pub fn is_accept(&self) -> bool {
        self.outcome == Outcome::Accept
    }

    pub fn is_hard_reject(&self) -> bool {
        self.hard_reject.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scored_verdict_respects_threshold() {
        assert_eq!(Verdict::scored(3, 3, 0.0).outcome, Outcome::Accept);
        assert_eq!(Verdict::scored(2, 3, 0.0).outcome, Outcome::Reject);
        assert_eq!(Verdict::scored(0, 0, 0.1).outcome, Outcome::Accept);
    }

    #[test]
    fn hard_reject_uses_sentinel() {
        let verdict = Verdict::hard_reject(HardReject::ThinNetwork { connections: 4 }, 0.0);
        assert_eq!(verdict.score, HARD_REJECT_SCORE);
        assert_eq!(verdict.outcome, Outcome::Reject);
        assert!(verdict.is_hard_reject());
        assert_eq!(verdict.hard_reject.unwrap().label(), "thin_network");
    }

    #[test]
    fn candidate_keeps_at_most_five_posts() {
        let candidate = Candidate::new("https://example.test/in/a/")
            .with_posts((0..8).map(|i| format!("post {i}")));
        assert_eq!(candidate.posts.len(), MAX_POSTS);
        assert_eq!(candidate.posts[0], "post 0");
    }

    #[test]
    fn verdict_serialization_tags_reason() {
        let verdict = Verdict::hard_reject(
            HardReject::Blocklisted {
                keyword: "boogaloo".into(),
            },
            0.0,
        );
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["outcome"], "reject");
        assert_eq!(json["hard_reject"]["reason"], "blocklisted");
        assert_eq!(json["hard_reject"]["keyword"], "boogaloo");

        let accepted = serde_json::to_value(Verdict::scored(6, 3, 0.0)).unwrap();
        assert!(accepted.get("hard_reject").is_none());
    }
}
