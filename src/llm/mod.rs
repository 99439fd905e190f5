//! LLM integration.
//!
//! Supports:
//! - **Perplexity**: default backend, via rig-core
//! - **OpenAI**: via rig-core
//!
//! rig-core handles HTTP transport and `RigAdapter` bridges rig's
//! `CompletionModel` trait to our `LlmProvider` trait.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::str::FromStr;
use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Perplexity,
    OpenAi,
}

/// A model a backend is known to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ModelInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub context_tokens: u32,
}

const PERPLEXITY_MODELS: &[ModelInfo] = &[
    ModelInfo {
        name: "llama-3.1-sonar-small-128k-online",
        description: "Fast and cost-effective",
        context_tokens: 127_072,
    },
    ModelInfo {
        name: "llama-3.1-sonar-large-128k-online",
        description: "Balanced quality and speed",
        context_tokens: 127_072,
    },
    ModelInfo {
        name: "llama-3.1-sonar-huge-128k-online",
        description: "Most capable model",
        context_tokens: 127_072,
    },
];

const OPENAI_MODELS: &[ModelInfo] = &[
    ModelInfo {
        name: "gpt-4o-mini",
        description: "Fast and cost-effective",
        context_tokens: 128_000,
    },
    ModelInfo {
        name: "gpt-4o",
        description: "Most capable model",
        context_tokens: 128_000,
    },
];

impl LlmBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Perplexity => "perplexity",
            Self::OpenAi => "openai",
        }
    }

    /// Models offered by `GET /models`. Requests may still name any model.
    pub fn known_models(&self) -> &'static [ModelInfo] {
        match self {
            Self::Perplexity => PERPLEXITY_MODELS,
            Self::OpenAi => OPENAI_MODELS,
        }
    }
}

impl FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "perplexity" => Ok(Self::Perplexity),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown provider {other:?} (expected perplexity or openai)")),
        }
    }
}

impl std::fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Perplexity => create_perplexity_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_perplexity_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::perplexity;

    let client: perplexity::Client = perplexity::Client::new(config.api_key.expose_secret()).map_err(|e| {
        LlmError::RequestFailed {
            provider: "perplexity".to_string(),
            reason: format!("Failed to create Perplexity client: {}", e),
        }
    })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Perplexity (model: {})", config.model);
    Ok(Arc::new(
        RigAdapter::new(model, &config.model)
            .with_provider("perplexity")
            .with_model_factory(move |name| client.completion_model(name)),
    ))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(
        RigAdapter::new(model, &config.model)
            .with_provider("openai")
            .with_model_factory(move |name| client.completion_model(name)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: LlmBackend, model: &str) -> LlmConfig {
        LlmConfig {
            backend,
            api_key: secrecy::SecretString::from("test-key"),
            model: model.to_string(),
            max_tokens: 4000,
            temperature: 0.3,
        }
    }

    #[test]
    fn create_perplexity_provider_uses_configured_model() {
        // Clients accept any key at construction; auth fails on the first request.
        let provider =
            create_provider(&config(LlmBackend::Perplexity, "llama-3.1-sonar-large-128k-online"))
                .unwrap();
        assert_eq!(provider.model_name(), "llama-3.1-sonar-large-128k-online");
    }

    #[test]
    fn create_openai_provider_uses_configured_model() {
        let provider = create_provider(&config(LlmBackend::OpenAi, "gpt-4o")).unwrap();
        assert_eq!(provider.model_name(), "gpt-4o");
    }

    #[test]
    fn default_model_is_a_known_perplexity_model() {
        assert!(
            LlmBackend::Perplexity
                .known_models()
                .iter()
                .any(|m| m.name == crate::config::DEFAULT_MODEL)
        );
        assert!(!LlmBackend::OpenAi.known_models().is_empty());
    }

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("Perplexity".parse::<LlmBackend>(), Ok(LlmBackend::Perplexity));
        assert_eq!("openai".parse::<LlmBackend>(), Ok(LlmBackend::OpenAi));
        assert!("anthropic".parse::<LlmBackend>().is_err());
    }
}
