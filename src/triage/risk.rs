//! Risk classifier gate.
//!
//! Decides whether a candidate's posts carry enough text to justify an LLM
//! classification call, builds the prompt, and interprets the numeric reply.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

/// Combined post length (chars) that makes a candidate eligible.
pub const MIN_COMBINED_CHARS: usize = 100;

/// Length (chars, trimmed) of a single post that makes a candidate eligible.
pub const MIN_SINGLE_POST_CHARS: usize = 40;

/// Separator placed between posts in the prompt.
pub const POST_SEPARATOR: &str = "\n---\n";

/// A single number needs very few tokens.
const CLASSIFY_MAX_TOKENS: u32 = 16;

const CLASSIFY_TEMPERATURE: f32 = 0.0;

/// Result of running the gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RiskAssessment {
    /// Not enough text; the classifier was not called.
    Skipped,
    /// The classifier replied with a usable number.
    Scored(f64),
    /// The classifier replied with something that is not a number.
    Unparseable,
}

impl RiskAssessment {
    /// Risk value in `[0.0, 1.0]`; skipped and unparseable count as 0.0.
    pub fn risk(&self) -> f64 {
        match self {
            Self::Scored(risk) => *risk,
            Self::Skipped | Self::Unparseable => 0.0,
        }
    }
}

/// True when the posts carry enough text to be worth classifying.
pub fn is_eligible(posts: &[String]) -> bool {
    let combined: usize = posts
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| p.chars().count())
        .sum();
    combined >= MIN_COMBINED_CHARS
        || posts
            .iter()
            .any(|p| p.trim().chars().count() >= MIN_SINGLE_POST_CHARS)
}

/// Build the classification prompt.
pub fn build_prompt(taxonomy: &str, posts: &[String]) -> String {
    let joined = posts
        .iter()
        .filter(|p| !p.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(POST_SEPARATOR);
    format!(
        "Evaluate the following LinkedIn posts for extremist/divisive content across: {taxonomy}. \
         Rate overall risk 0.0–1.0, reply with a single number.\n\nPosts:\n{joined}"
    )
}

/// Parse the classifier reply. Finite numbers are clamped to `[0.0, 1.0]`.
pub fn parse_risk(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}

/// Wraps the external classifier with the eligibility rule.
pub struct RiskGate {
    llm: Arc<dyn LlmProvider>,
    taxonomy: String,
}

impl RiskGate {
    pub fn new(llm: Arc<dyn LlmProvider>, taxonomy: impl Into<String>) -> Self {
        Self {
            llm,
            taxonomy: taxonomy.into(),
        }
    }

    /// Classify `posts`, skipping the call when there is too little text.
    ///
    /// An unparseable reply is logged and reported as `Unparseable`; only a
    /// failed call is an error.
    pub async fn assess(&self, posts: &[String]) -> Result<RiskAssessment, LlmError> {
        if !is_eligible(posts) {
            debug!(posts = posts.len(), "Too little post text, skipping risk classification");
            return Ok(RiskAssessment::Skipped);
        }

        let request = CompletionRequest::new(vec![ChatMessage::user(build_prompt(
            &self.taxonomy,
            posts,
        ))])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = self.llm.complete(request).await?;

        match parse_risk(&response.content) {
            Some(risk) => {
                debug!(risk, model = self.llm.model_name(), "Risk classified");
                Ok(RiskAssessment::Scored(risk))
            }
            None => {
                warn!(
                    raw_response = %response.content,
                    "Risk classification reply is not a number, treating as 0.0"
                );
                Ok(RiskAssessment::Unparseable)
            }
        }
    }
}
