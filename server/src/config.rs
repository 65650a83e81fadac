//! Server configuration, read once at startup.
//!
//! DESIGN
//! ======
//! Every knob is an environment variable with a default. Parsing goes
//! through a `Lookup` function instead of `std::env` directly so tests can
//! feed a map without touching process state. Blank values count as unset;
//! unparsable numbers fall back to the default.

use std::str::FromStr;
use std::time::Duration;

use crate::llm::config::LlmConfig;

pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_CHAT_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const DEFAULT_TITLE_MODEL: &str = "claude-haiku-4-5-20251001";
pub const DEFAULT_TITLE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CHAT_MAX_TOKENS: u32 = 8192;
pub const DEFAULT_CHAT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_CHAT_MAX_STEPS: usize = 5;
pub const DEFAULT_CHAT_THINKING_BUDGET: u32 = 4096;
pub const DEFAULT_CHAT_MAX_DURATION_SECS: u64 = 300;
pub const DEFAULT_CHAT_STREAM_BUFFER: usize = 64;

/// Process environment, with blank values treated as unset.
#[must_use]
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

pub(crate) fn parse_or<T>(lookup: Lookup<'_>, key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// CHAT
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub default_model: String,
    pub title_model: String,
    pub title_timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_steps: usize,
    pub thinking_budget: u32,
    pub max_duration: Duration,
    pub stream_buffer: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_CHAT_MODEL.into(),
            title_model: DEFAULT_TITLE_MODEL.into(),
            title_timeout: Duration::from_secs(DEFAULT_TITLE_TIMEOUT_SECS),
            max_tokens: DEFAULT_CHAT_MAX_TOKENS,
            temperature: DEFAULT_CHAT_TEMPERATURE,
            max_steps: DEFAULT_CHAT_MAX_STEPS,
            thinking_budget: DEFAULT_CHAT_THINKING_BUDGET,
            max_duration: Duration::from_secs(DEFAULT_CHAT_MAX_DURATION_SECS),
            stream_buffer: DEFAULT_CHAT_STREAM_BUFFER,
        }
    }
}

impl ChatConfig {
    #[must_use]
    pub fn from_lookup(lookup: Lookup<'_>) -> Self {
        Self {
            default_model: lookup("CHAT_DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.into()),
            title_model: lookup("TITLE_MODEL").unwrap_or_else(|| DEFAULT_TITLE_MODEL.into()),
            title_timeout: Duration::from_secs(parse_or(lookup, "TITLE_TIMEOUT_SECS", DEFAULT_TITLE_TIMEOUT_SECS)),
            max_tokens: parse_or(lookup, "CHAT_MAX_TOKENS", DEFAULT_CHAT_MAX_TOKENS),
            temperature: parse_or(lookup, "CHAT_TEMPERATURE", DEFAULT_CHAT_TEMPERATURE),
            max_steps: parse_or(lookup, "CHAT_MAX_STEPS", DEFAULT_CHAT_MAX_STEPS).max(1),
            thinking_budget: parse_or(lookup, "CHAT_THINKING_BUDGET", DEFAULT_CHAT_THINKING_BUDGET),
            max_duration: Duration::from_secs(parse_or(
                lookup,
                "CHAT_MAX_DURATION_SECS",
                DEFAULT_CHAT_MAX_DURATION_SECS,
            )),
            stream_buffer: parse_or(lookup, "CHAT_STREAM_BUFFER", DEFAULT_CHAT_STREAM_BUFFER).max(1),
        }
    }
}

// =============================================================================
// SERVER
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    /// `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Enables the `webSearch` / `webExtract` tools.
    pub tavily_api_key: Option<String>,
    pub chat: ChatConfig,
    pub llm: LlmConfig,
}

impl ServerConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(&env_lookup)
    }

    #[must_use]
    pub fn from_lookup(lookup: Lookup<'_>) -> Self {
        Self {
            port: parse_or(lookup, "PORT", DEFAULT_PORT),
            database_url: lookup("DATABASE_URL"),
            db_max_connections: parse_or(lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            tavily_api_key: lookup("TAVILY_API_KEY"),
            chat: ChatConfig::from_lookup(lookup),
            llm: LlmConfig::from_lookup(lookup),
        }
    }
}
