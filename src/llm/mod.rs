//! Language-model access for the risk classifier.
//!
//! A backend (OpenAI by default, or Anthropic) is picked at startup and
//! wrapped in a `RigAdapter`, so the rest of the crate only sees
//! `Arc<dyn LlmProvider>`.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rig::client::CompletionClient;
use rig::providers::{anthropic, openai};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::error::LlmError;

/// Hosted completion APIs the classifier can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAi,
    Anthropic,
}

impl LlmBackend {
    pub fn label(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    /// Environment variable the API key is read from.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4",
            Self::Anthropic => "claude-3-5-haiku-latest",
        }
    }
}

impl fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(format!("unknown LLM backend '{other}'")),
        }
    }
}

/// Backend, credentials and model for the classifier.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: SecretString,
    pub model: String,
}

/// Build the provider described by `config`.
///
/// No request is made here; a bad key only shows up on the first call.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let key = config.api_key.expose_secret();
    let backend = config.backend;

    let provider: Arc<dyn LlmProvider> = match backend {
        LlmBackend::OpenAi => {
            let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
                openai::Client::new(key).map_err(|e| client_error(backend, e))?;
            Arc::new(RigAdapter::new(
                client.completion_model(&config.model),
                &config.model,
                backend.label(),
            ))
        }
        LlmBackend::Anthropic => {
            let client: rig::client::Client<anthropic::client::AnthropicExt> =
                anthropic::Client::new(key).map_err(|e| client_error(backend, e))?;
            Arc::new(RigAdapter::new(
                client.completion_model(&config.model),
                &config.model,
                backend.label(),
            ))
        }
    };

    info!(backend = %backend, model = %config.model, "Risk classifier provider ready");
    Ok(provider)
}

fn client_error(backend: LlmBackend, err: impl fmt::Display) -> LlmError {
    LlmError::RequestFailed {
        provider: backend.label().to_string(),
        reason: format!("could not build {backend} client: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: LlmBackend) -> LlmConfig {
        LlmConfig {
            backend,
            api_key: SecretString::from("key-for-tests"),
            model: backend.default_model().to_string(),
        }
    }

    #[test]
    fn builds_each_backend_without_network() {
        for backend in [LlmBackend::OpenAi, LlmBackend::Anthropic] {
            let provider = create_provider(&config(backend)).unwrap();
            assert_eq!(provider.model_name(), backend.default_model());
        }
    }

    #[test]
    fn backend_names() {
        assert_eq!("OpenAI".parse::<LlmBackend>(), Ok(LlmBackend::OpenAi));
        assert_eq!(
            " anthropic ".parse::<LlmBackend>().map(|b| b.api_key_var()),
            Ok("ANTHROPIC_API_KEY")
        );
        assert!("mistral".parse::<LlmBackend>().is_err());
        assert_eq!(LlmBackend::Anthropic.to_string(), "anthropic");
    }
}
