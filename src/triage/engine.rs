//! Decision engine: scores a candidate and decides accept/reject.
//!
//! Evaluation order, each hard reject short-circuiting the rest:
//! 1. Blocklist on about text or any post (no classifier call)
//! 2. Thin network: few connections and no recognised affiliation
//! 3. Risk classification at or above the risk threshold
//! 4. Positive scoring: institution +3, course +2, enough connections +1
//!
//! The engine holds no state between candidates, so evaluating the same
//! candidate twice against a deterministic classifier gives the same verdict.

use tracing::{debug, info};

use crate::config::AcceptancePolicy;
use crate::error::TriageError;
use crate::triage::filter::KeywordSet;
use crate::triage::risk::RiskGate;
use crate::triage::types::{Candidate, HardReject, Verdict};

/// Points for an institutional affiliation in the about text.
pub const INSTITUTION_POINTS: i32 = 3;

/// Points for a recognised course name in the about text.
pub const COURSE_POINTS: i32 = 2;

/// Points for a connection count at or above the minimum.
pub const CONNECTION_POINTS: i32 = 1;

/// Keyword sets and thresholds the engine scores against.
#[derive(Debug, Clone)]
pub struct ScoringPolicy {
    pub blocklist: KeywordSet,
    pub institutions: KeywordSet,
    pub courses: KeywordSet,
    pub min_connections: u32,
    /// Hard-reject thin networks without an institutional affiliation.
    pub thin_network_reject: bool,
    /// Risk at or above this value is a hard reject.
    pub risk_threshold: f64,
    pub acceptance: AcceptancePolicy,
}

pub struct DecisionEngine {
    policy: ScoringPolicy,
    risk_gate: RiskGate,
}

impl DecisionEngine {
    pub fn new(policy: ScoringPolicy, risk_gate: RiskGate) -> Self {
        Self { policy, risk_gate }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Evaluate one candidate.
    ///
    /// Only a failed classification call is an error; the caller decides what
    /// to do with a candidate it could not evaluate.
    pub async fn evaluate(&self, candidate: &Candidate) -> Result<Verdict, TriageError> {
        let policy = &self.policy;
        let about = candidate.about_text.as_str();

        if let Some(keyword) = self.blocklisted(candidate) {
            info!(
                profile = %candidate.profile_url,
                keyword = %keyword,
                "Hard reject: blocklisted term"
            );
            return Ok(Verdict::hard_reject(
                HardReject::Blocklisted { keyword },
                0.0,
            ));
        }

        let affiliated = policy.institutions.matches(about);

        if policy.thin_network_reject
            && let Some(connections) = candidate.connection_count
            && connections < policy.min_connections
            && !affiliated
        {
            info!(
                profile = %candidate.profile_url,
                connections,
                "Hard reject: thin network without affiliation"
            );
            return Ok(Verdict::hard_reject(
                HardReject::ThinNetwork { connections },
                0.0,
            ));
        }

        let risk = self.risk_gate.assess(&candidate.posts).await?.risk();
        if risk >= policy.risk_threshold {
            info!(profile = %candidate.profile_url, risk, "Hard reject: high risk");
            return Ok(Verdict::hard_reject(HardReject::HighRisk { risk }, risk));
        }

        let mut score = 0;
        if affiliated {
            score += INSTITUTION_POINTS;
        }
        if policy.courses.matches(about) {
            score += COURSE_POINTS;
        }
        if candidate
            .connection_count
            .is_some_and(|c| c >= policy.min_connections)
        {
            score += CONNECTION_POINTS;
        }

        let verdict = Verdict::scored(score, policy.acceptance.threshold(), risk);
        debug!(
            profile = %candidate.profile_url,
            score,
            risk,
            outcome = ?verdict.outcome,
            "Candidate scored"
        );
        Ok(verdict)
    }

    fn blocklisted(&self, candidate: &Candidate) -> Option<String> {
        let blocklist = &self.policy.blocklist;
        std::iter::once(candidate.about_text.as_str())
            .chain(candidate.posts.iter().map(String::as_str))
            .find_map(|text| blocklist.first_match(text))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{DEFAULT_BLOCKLIST, DEFAULT_COURSES, DEFAULT_INSTITUTIONS};
    use crate::testing::StubLlm;
    use crate::triage::types::{HARD_REJECT_SCORE, Outcome};

    fn policy() -> ScoringPolicy {
        ScoringPolicy {
            blocklist: KeywordSet::new(DEFAULT_BLOCKLIST.iter().copied()),
            institutions: KeywordSet::new(DEFAULT_INSTITUTIONS.iter().copied()),
            courses: KeywordSet::new(DEFAULT_COURSES.iter().copied()),
            min_connections: 50,
            thin_network_reject: true,
            risk_threshold: 0.7,
            acceptance: AcceptancePolicy::Selective,
        }
    }

    fn engine_with(policy: ScoringPolicy, reply: &str) -> (DecisionEngine, Arc<StubLlm>) {
        let llm = Arc::new(StubLlm::replying(reply));
        let engine = DecisionEngine::new(policy, RiskGate::new(llm.clone(), "taxonomy"));
        (engine, llm)
    }

    fn long_post() -> String {
        "Shipped a new evaluation harness for our retrieval pipeline this week.".to_string()
    }

    #[tokio::test]
    async fn blocklisted_about_text_rejects_without_classifier() {
        let (engine, llm) = engine_with(policy(), "0.0");
        let candidate = Candidate::new("https://example.test/in/a/")
            .with_about("MIT alumnus, proud Boogaloo supporter")
            .with_posts([long_post(), long_post()])
            .with_connections(500);

        let verdict = engine.evaluate(&candidate).await.unwrap();
        assert_eq!(verdict.outcome, Outcome::Reject);
        assert_eq!(verdict.score, HARD_REJECT_SCORE);
        assert!(matches!(
            verdict.hard_reject,
            Some(HardReject::Blocklisted { ref keyword }) if keyword == "Boogaloo"
        ));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn blocklisted_post_rejects_without_classifier() {
        let (engine, llm) = engine_with(policy(), "0.0");
        let candidate = Candidate::new("https://example.test/in/b/")
            .with_about("Harvard")
            .with_posts([long_post(), "exposing the globalist cabal".to_string()]);

        let verdict = engine.evaluate(&candidate).await.unwrap();
        assert_eq!(verdict.outcome, Outcome::Reject);
        assert!(verdict.is_hard_reject());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn thin_network_without_affiliation_rejects() {
        let (engine, llm) = engine_with(policy(), "0.0");
        let candidate = Candidate::new("https://example.test/in/c/")
            .with_about("Growth hacker")
            .with_posts([long_post()])
            .with_connections(10);

        let verdict = engine.evaluate(&candidate).await.unwrap();
        assert_eq!(verdict.outcome, Outcome::Reject);
        assert_eq!(
            verdict.hard_reject,
            Some(HardReject::ThinNetwork { connections: 10 })
        );
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn thin_network_with_affiliation_is_scored() {
        let (engine, _llm) = engine_with(policy(), "0.1");
        let candidate = Candidate::new("https://example.test/in/d/")
            .with_about("Instructor, MIT Professional Education")
            .with_connections(10);

        let verdict = engine.evaluate(&candidate).await.unwrap();
        assert!(!verdict.is_hard_reject());
        assert_eq!(verdict.score, INSTITUTION_POINTS);
        assert_eq!(verdict.outcome, Outcome::Accept);
    }

    #[tokio::test]
    async fn thin_network_toggle_off_scores_instead() {
        let mut policy = policy();
        policy.thin_network_reject = false;
        let (engine, _llm) = engine_with(policy, "0.0");
        let candidate = Candidate::new("https://example.test/in/e/").with_connections(10);

        let verdict = engine.evaluate(&candidate).await.unwrap();
        assert!(!verdict.is_hard_reject());
        assert_eq!(verdict.score, 0);
        assert_eq!(verdict.outcome, Outcome::Reject);
    }

    #[tokio::test]
    async fn missing_connection_count_skips_thin_network_check() {
        let (engine, _llm) = engine_with(policy(), "0.0");
        let candidate = Candidate::new("https://example.test/in/f/").with_about("Harvard");

        let verdict = engine.evaluate(&candidate).await.unwrap();
        assert_eq!(verdict.score, INSTITUTION_POINTS);
    }

    #[tokio::test]
    async fn high_risk_rejects() {
        let (engine, llm) = engine_with(policy(), "0.7");
        let candidate = Candidate::new("https://example.test/in/g/")
            .with_about("Harvard, Generative AI")
            .with_posts([long_post()])
            .with_connections(300);

        let verdict = engine.evaluate(&candidate).await.unwrap();
        assert_eq!(verdict.outcome, Outcome::Reject);
        assert_eq!(verdict.score, HARD_REJECT_SCORE);
        assert!(matches!(verdict.hard_reject, Some(HardReject::HighRisk { .. })));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn short_posts_skip_classifier_and_score() {
        let (engine, llm) = engine_with(policy(), "0.99");
        let candidate = Candidate::new("https://example.test/in/h/")
            .with_about("Harvard")
            .with_posts(["short", "also short"])
            .with_connections(60);

        let verdict = engine.evaluate(&candidate).await.unwrap();
        assert_eq!(llm.calls(), 0);
        assert_eq!(verdict.risk, 0.0);
        assert_eq!(verdict.score, INSTITUTION_POINTS + CONNECTION_POINTS);
    }

    #[tokio::test]
    async fn full_positive_profile_scores_six() {
        let (engine, _llm) = engine_with(policy(), "0.05");
        let candidate = Candidate::new("https://example.test/in/i/")
            .with_about("MIT Professional Education, Generative AI cohort")
            .with_posts([long_post()])
            .with_connections(100);

        let verdict = engine.evaluate(&candidate).await.unwrap();
        assert_eq!(verdict.score, 6);
        assert_eq!(verdict.outcome, Outcome::Accept);
        assert!(!verdict.is_hard_reject());
    }

    #[tokio::test]
    async fn selective_and_permissive_policies_diverge() {
        let candidate = Candidate::new("https://example.test/in/j/").with_connections(75);

        let (selective, _) = engine_with(policy(), "0.0");
        let verdict = selective.evaluate(&candidate).await.unwrap();
        assert_eq!(verdict.score, CONNECTION_POINTS);
        assert_eq!(verdict.outcome, Outcome::Reject);

        let mut permissive_policy = policy();
        permissive_policy.acceptance = AcceptancePolicy::Permissive;
        let (permissive, _) = engine_with(permissive_policy, "0.0");
        assert_eq!(
            permissive.evaluate(&candidate).await.unwrap().outcome,
            Outcome::Accept
        );
    }

    #[tokio::test]
    async fn unparseable_risk_reply_does_not_reject() {
        let (engine, llm) = engine_with(policy(), "not a number");
        let candidate = Candidate::new("https://example.test/in/k/")
            .with_about("Harvard")
            .with_posts([long_post()]);

        let verdict = engine.evaluate(&candidate).await.unwrap();
        assert_eq!(llm.calls(), 1);
        assert_eq!(verdict.risk, 0.0);
        assert_eq!(verdict.outcome, Outcome::Accept);
    }

    #[tokio::test]
    async fn classifier_failure_is_an_error() {
        let llm = Arc::new(StubLlm::failing());
        let engine = DecisionEngine::new(policy(), RiskGate::new(llm, "taxonomy"));
        let candidate = Candidate::new("https://example.test/in/l/").with_posts([long_post()]);

        let err = engine.evaluate(&candidate).await.unwrap_err();
        assert!(matches!(err, TriageError::Classification(_)));
    }

    #[tokio::test]
    async fn evaluation_is_idempotent() {
        let (engine, _llm) = engine_with(policy(), "0.4");
        let candidate = Candidate::new("https://example.test/in/m/")
            .with_about("Harvard Generative AI")
            .with_posts([long_post(), long_post()])
            .with_connections(51);

        let first = engine.evaluate(&candidate).await.unwrap();
        let second = engine.evaluate(&candidate).await.unwrap();
        assert_eq!(first, second);
    }
}
