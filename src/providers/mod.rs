//! Language-model clients.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::ValueEnum;
use tracing::warn;

mod gemini;
mod openai;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

/// Default Gemini REST base.
pub const DEFAULT_GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Default OpenAI REST base.
pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

/// Trait implemented by concrete LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    /// Returns the complete generated text, or an error; never partial output.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Sampling bounds sent with every generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 2048,
        }
    }
}

/// Request envelope shared by the providers.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub params: GenerationParams,
}

/// Which model service to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    Gemini,
    #[value(name = "openai")]
    OpenAi,
}

impl ProviderKind {
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-1.5-flash",
            Self::OpenAi => "gpt-4o-mini",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Gemini => DEFAULT_GEMINI_BASE,
            Self::OpenAi => DEFAULT_OPENAI_BASE,
        }
    }
}

/// Everything needed to construct a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

/// Builds the configured provider, or `None` when no usable API key is set.
pub fn build_provider(settings: &ProviderSettings) -> Option<Arc<dyn LlmProvider>> {
    let api_key = settings
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())?
        .to_string();
    let built: Result<Arc<dyn LlmProvider>> = match settings.kind {
        ProviderKind::Gemini => GeminiProvider::new(
            api_key,
            settings.base_url.clone(),
            settings.model.clone(),
            settings.timeout,
        )
        .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
        ProviderKind::OpenAi => OpenAiProvider::new(
            api_key,
            settings.base_url.clone(),
            settings.model.clone(),
            settings.timeout,
        )
        .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
    };
    match built {
        Ok(provider) => Some(provider),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "language model provider unavailable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(kind: ProviderKind, api_key: Option<&str>) -> ProviderSettings {
        ProviderSettings {
            kind,
            api_key: api_key.map(str::to_string),
            model: kind.default_model().to_string(),
            base_url: kind.default_base_url().to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn missing_or_blank_key_builds_nothing() {
        assert!(build_provider(&settings(ProviderKind::Gemini, None)).is_none());
        assert!(build_provider(&settings(ProviderKind::OpenAi, Some("   "))).is_none());
    }

    #[test]
    fn builds_requested_provider() {
        let gemini = build_provider(&settings(ProviderKind::Gemini, Some("g-key"))).expect("gemini");
        assert_eq!(gemini.name(), "gemini");
        let openai = build_provider(&settings(ProviderKind::OpenAi, Some("sk-test"))).expect("openai");
        assert_eq!(openai.name(), "openai");
    }
}
