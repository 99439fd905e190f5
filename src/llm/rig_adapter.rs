//! Adapter from rig's `CompletionModel` to [`LlmProvider`].

use std::sync::Arc;

use async_trait::async_trait;
use rig::completion::{CompletionError, CompletionModel};
use rig::message::{AssistantContent, Message};
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role};

type ModelFactory<M> = Arc<dyn Fn(&str) -> M + Send + Sync>;

/// Wraps a rig completion model.
///
/// System messages become the preamble, the last user message is the prompt
/// and everything in between is chat history.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    provider: String,
    factory: Option<ModelFactory<M>>,
}

impl<M: CompletionModel + 'static> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider: "rig".to_string(),
            factory: None,
        }
    }

    /// Label used in errors and logs.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Allow requests to name a model other than the default.
    pub fn with_model_factory(mut self, factory: impl Fn(&str) -> M + Send + Sync + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    fn model_for(&self, requested: Option<&str>) -> (M, String) {
        match (requested, &self.factory) {
            (Some(name), Some(factory)) if name != self.model_name => {
                (factory(name), name.to_string())
            }
            _ => (self.model.clone(), self.model_name.clone()),
        }
    }
}

#[async_trait]
impl<M: CompletionModel + 'static> LlmProvider for RigAdapter<M> {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (preamble, history, prompt) = split_messages(&request.messages).ok_or_else(|| {
            LlmError::RequestFailed {
                provider: self.provider.clone(),
                reason: "request has no user message".to_string(),
            }
        })?;
        let (model, model_name) = self.model_for(request.model.as_deref());

        debug!(
            provider = %self.provider,
            model = %model_name,
            history = history.len(),
            "Sending completion request"
        );

        let mut builder = model.completion_request(prompt).messages(history);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_completion_error(&self.provider, e))?;

        let content = response_text(response.choice.iter());
        if content.trim().is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.provider.clone(),
                reason: "response contained no text".to_string(),
            });
        }

        Ok(CompletionResponse {
            content,
            model: model_name,
            input_tokens: u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX),
            output_tokens: u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX),
        })
    }
}

/// Split chat messages into (preamble, history, prompt).
///
/// Returns `None` when there is no user message to prompt with.
fn split_messages(messages: &[ChatMessage]) -> Option<(Option<String>, Vec<Message>, Message)> {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let preamble = (!system.is_empty()).then(|| system.join("\n\n"));

    let mut turns: Vec<&ChatMessage> = messages.iter().filter(|m| m.role != Role::System).collect();
    let last = turns.pop().filter(|m| m.role == Role::User)?;

    let history = turns
        .into_iter()
        .map(|m| match m.role {
            Role::Assistant => Message::assistant(m.content.clone()),
            _ => Message::user(m.content.clone()),
        })
        .collect();

    Some((preamble, history, Message::user(last.content.clone())))
}

/// Concatenate the text parts of a completion choice.
fn response_text<'a>(choice: impl IntoIterator<Item = &'a AssistantContent>) -> String {
    choice
        .into_iter()
        .filter_map(|content| match content {
            AssistantContent::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect()
}

fn map_completion_error(provider: &str, err: CompletionError) -> LlmError {
    classify_failure(provider, err.to_string())
}

/// Map a provider failure message onto an [`LlmError`].
fn classify_failure(provider: &str, message: String) -> LlmError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        LlmError::RateLimited {
            provider: provider.to_string(),
            reason: message,
        }
    } else if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("invalid api key")
    {
        LlmError::AuthFailed {
            provider: provider.to_string(),
        }
    } else {
        LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: message,
        }
    }
}
