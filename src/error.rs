//! Error types for invite-triage.

use std::time::Duration;

/// Top-level error type for a triage run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Browser session errors.
///
/// `NotFound` and `Timeout` are recoverable "no data" signals; the rest are
/// transport failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No element matched selector {selector}")]
    NotFound { selector: String },

    #[error("Timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("WebDriver error {error}: {message}")]
    Protocol { error: String, message: String },

    #[error("Unexpected WebDriver response: {0}")]
    InvalidResponse(String),
}

impl SessionError {
    /// Whether this error only means "the thing we looked for is not there".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Timeout { .. })
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SessionError::Timeout {
                what: err
                    .url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "webdriver response".to_string()),
                timeout: Duration::ZERO,
            }
        } else {
            SessionError::Transport(err.to_string())
        }
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Rejection log persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum RejectionLogError {
    #[error("Failed to append to {path}: {source}")]
    Append {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Per-candidate failures that abort one evaluation but never the run.
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("Risk classification failed: {0}")]
    Classification(#[from] LlmError),

    #[error("Profile could not be loaded: {0}")]
    Profile(#[from] SessionError),

    #[error("Invitation card has no profile link")]
    MissingProfileLink,

    #[error("Invitation card link {href} is not a profile URL")]
    InvalidProfileLink { href: String },
}
