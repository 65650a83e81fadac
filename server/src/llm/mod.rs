//! LLM: multi-provider gateway for chat completions.
//!
//! DESIGN
//! ======
//! Every provider is optional and enabled by its API key. `LlmClient` looks
//! the requested model up in the registry and dispatches to the provider
//! that serves it: Anthropic natively, `OpenAI` and Google through the
//! OpenAI-compatible client pointed at different base URLs.

pub mod anthropic;
pub mod config;
pub mod openai;
pub mod registry;
mod sse;
pub mod tools;
pub mod types;

use config::LlmConfig;
use registry::Provider;
pub use types::LlmChat;
use types::{ChatRequest, ChatResponse, ChatStream, LlmError};

// =============================================================================
// CLIENT DISPATCH
// =============================================================================

/// Concrete LLM client holding one HTTP client per configured provider.
pub struct LlmClient {
    anthropic: Option<anthropic::AnthropicClient>,
    openai: Option<openai::OpenAiClient>,
    google: Option<openai::OpenAiClient>,
}

enum Route<'a> {
    Anthropic(&'a anthropic::AnthropicClient),
    OpenAiCompatible(&'a openai::OpenAiClient),
}

impl LlmClient {
    /// Build clients for every provider that has a key.
    ///
    /// # Errors
    ///
    /// Returns an error if a provider HTTP client fails to build.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let anthropic = config
            .anthropic_api_key
            .clone()
            .map(|key| anthropic::AnthropicClient::new(key, config.timeouts))
            .transpose()?;
        let openai = config
            .openai_api_key
            .clone()
            .map(|key| openai::OpenAiClient::new(key, &config.openai_base_url, config.timeouts))
            .transpose()?;
        let google = config
            .google_api_key
            .clone()
            .map(|key| openai::OpenAiClient::new(key, &config.google_base_url, config.timeouts))
            .transpose()?;
        Ok(Self { anthropic, openai, google })
    }

    fn route(&self, model: &str) -> Result<Route<'_>, LlmError> {
        let info = registry::find(model).ok_or_else(|| LlmError::UnknownModel(model.to_string()))?;
        let unavailable = || LlmError::ProviderUnavailable { provider: info.provider.as_str() };
        match info.provider {
            Provider::Anthropic => self.anthropic.as_ref().map(Route::Anthropic).ok_or_else(unavailable),
            Provider::OpenAi => self.openai.as_ref().map(Route::OpenAiCompatible).ok_or_else(unavailable),
            Provider::Google => self.google.as_ref().map(Route::OpenAiCompatible).ok_or_else(unavailable),
        }
    }
}

#[async_trait::async_trait]
impl LlmChat for LlmClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        match self.route(&request.model)? {
            Route::Anthropic(c) => c.chat(request).await,
            Route::OpenAiCompatible(c) => c.chat(request).await,
        }
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream, LlmError> {
        match self.route(&request.model)? {
            Route::Anthropic(c) => c.chat_stream(request).await,
            Route::OpenAiCompatible(c) => c.chat_stream(request).await,
        }
    }

    fn serves(&self, provider: Provider) -> bool {
        match provider {
            Provider::Anthropic => self.anthropic.is_some(),
            Provider::OpenAi => self.openai.is_some(),
            Provider::Google => self.google.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::config::{LlmTimeouts, DEFAULT_GOOGLE_OPENAI_BASE_URL, DEFAULT_OPENAI_BASE_URL};
    use super::*;
    use crate::error::ErrorCode;

    fn config(anthropic: bool, google: bool) -> LlmConfig {
        LlmConfig {
            anthropic_api_key: anthropic.then(|| "sk-ant".to_string()),
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.into(),
            google_api_key: google.then(|| "g-key".to_string()),
            google_base_url: DEFAULT_GOOGLE_OPENAI_BASE_URL.into(),
            timeouts: LlmTimeouts { request_secs: 5, connect_secs: 1 },
        }
    }

    #[test]
    fn serves_only_configured_providers() {
        let client = LlmClient::from_config(&config(true, false)).unwrap();
        assert!(client.serves(Provider::Anthropic));
        assert!(!client.serves(Provider::OpenAi));
        assert!(!client.serves(Provider::Google));
    }

    #[test]
    fn route_rejects_unknown_model() {
        let client = LlmClient::from_config(&config(true, true)).unwrap();
        let err = client.route("gpt-9").err().unwrap();
        assert_eq!(err.error_code(), "E_UNKNOWN_MODEL");
    }

    #[test]
    fn route_rejects_unconfigured_provider() {
        let client = LlmClient::from_config(&config(true, false)).unwrap();
        let err = client.route("gpt-4o").err().unwrap();
        assert!(matches!(err, LlmError::ProviderUnavailable { provider: "openai" }));
        assert!(client.route("gemini-2.5-pro").is_err());
    }

    #[test]
    fn google_routes_through_openai_compatible_client() {
        let client = LlmClient::from_config(&config(false, true)).unwrap();
        assert!(matches!(client.route("gemini-2.5-flash"), Ok(Route::OpenAiCompatible(_))));
        assert!(client.route("claude-sonnet-4-5-20250929").is_err());
    }
}
