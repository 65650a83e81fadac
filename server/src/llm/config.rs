//! LLM provider configuration parsed from environment variables.

use crate::config::{Lookup, parse_or};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GOOGLE_OPENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEFAULT_LLM_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LLM_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub google_api_key: Option<String>,
    pub google_base_url: String,
    pub timeouts: LlmTimeouts,
}

impl LlmConfig {
    /// Build typed LLM config.
    ///
    /// Each provider is enabled by its key:
    /// - `ANTHROPIC_API_KEY`
    /// - `OPENAI_API_KEY` (`OPENAI_BASE_URL` overrides the endpoint)
    /// - `GOOGLE_GENERATIVE_AI_API_KEY` (`GOOGLE_OPENAI_BASE_URL` overrides
    ///   the OpenAI-compatible endpoint)
    ///
    /// Timeouts: `LLM_REQUEST_TIMEOUT_SECS` (120), `LLM_CONNECT_TIMEOUT_SECS` (10).
    #[must_use]
    pub fn from_lookup(lookup: Lookup<'_>) -> Self {
        let base_url = |key: &str, default: &str| {
            lookup(key).unwrap_or_else(|| default.to_string()).trim_end_matches('/').to_string()
        };
        Self {
            anthropic_api_key: lookup("ANTHROPIC_API_KEY"),
            openai_api_key: lookup("OPENAI_API_KEY"),
            openai_base_url: base_url("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            google_api_key: lookup("GOOGLE_GENERATIVE_AI_API_KEY"),
            google_base_url: base_url("GOOGLE_OPENAI_BASE_URL", DEFAULT_GOOGLE_OPENAI_BASE_URL),
            timeouts: LlmTimeouts {
                request_secs: parse_or(lookup, "LLM_REQUEST_TIMEOUT_SECS", DEFAULT_LLM_REQUEST_TIMEOUT_SECS),
                connect_secs: parse_or(lookup, "LLM_CONNECT_TIMEOUT_SECS", DEFAULT_LLM_CONNECT_TIMEOUT_SECS),
            },
        }
    }

    #[must_use]
    pub fn any_provider(&self) -> bool {
        self.anthropic_api_key.is_some() || self.openai_api_key.is_some() || self.google_api_key.is_some()
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
