//! Bridges rig-core completion models to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel, Message};

use crate::error::LlmError;
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};

/// `LlmProvider` backed by any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    provider: &'static str,
}

impl<M> RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    pub fn new(model: M, model_name: &str, provider: &'static str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider,
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let preamble = request.system_prompt();

        // Last user message is the prompt; everything before it is history.
        let mut turns: Vec<_> = request
            .messages
            .into_iter()
            .filter(|m| m.role != Role::System)
            .collect();
        let prompt = match turns.pop() {
            Some(m) if m.role == Role::User => m.content,
            _ => {
                return Err(LlmError::InvalidResponse {
                    provider: self.provider.to_string(),
                    reason: "completion request must end with a user message".to_string(),
                });
            }
        };
        let history: Vec<Message> = turns
            .into_iter()
            .map(|m| match m.role {
                Role::Assistant => Message::assistant(m.content),
                _ => Message::user(m.content),
            })
            .collect();

        let mut builder = self.model.completion_request(prompt).messages(history);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let response = builder.send().await.map_err(|e| {
            let reason = e.to_string();
            if reason.contains("401") || reason.to_ascii_lowercase().contains("unauthorized") {
                LlmError::AuthFailed {
                    provider: self.provider.to_string(),
                }
            } else {
                LlmError::RequestFailed {
                    provider: self.provider.to_string(),
                    reason,
                }
            }
        })?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            content,
            input_tokens: u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX),
            output_tokens: u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX),
            finish_reason: FinishReason::Stop,
        })
    }
}
