use std::collections::HashMap;

use super::*;

fn config_from(pairs: &[(&str, &str)]) -> LlmConfig {
    let env: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
    LlmConfig::from_lookup(&|key: &str| env.get(key).cloned())
}

#[test]
fn defaults_without_keys() {
    let cfg = config_from(&[]);
    assert!(!cfg.any_provider());
    assert_eq!(cfg.openai_base_url, DEFAULT_OPENAI_BASE_URL);
    assert_eq!(cfg.google_base_url, DEFAULT_GOOGLE_OPENAI_BASE_URL);
    assert_eq!(
        cfg.timeouts,
        LlmTimeouts { request_secs: DEFAULT_LLM_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_LLM_CONNECT_TIMEOUT_SECS }
    );
}

#[test]
fn keys_enable_providers_and_urls_are_trimmed() {
    let cfg = config_from(&[
        ("ANTHROPIC_API_KEY", "sk-ant"),
        ("OPENAI_API_KEY", "sk-test"),
        ("OPENAI_BASE_URL", "https://example.test/v1/"),
        ("LLM_REQUEST_TIMEOUT_SECS", "42"),
        ("LLM_CONNECT_TIMEOUT_SECS", "7"),
    ]);
    assert!(cfg.any_provider());
    assert_eq!(cfg.anthropic_api_key.as_deref(), Some("sk-ant"));
    assert_eq!(cfg.openai_base_url, "https://example.test/v1");
    assert!(cfg.google_api_key.is_none());
    assert_eq!(cfg.timeouts, LlmTimeouts { request_secs: 42, connect_secs: 7 });
}

#[test]
fn unparsable_timeout_falls_back() {
    let cfg = config_from(&[("LLM_REQUEST_TIMEOUT_SECS", "soon")]);
    assert_eq!(cfg.timeouts.request_secs, DEFAULT_LLM_REQUEST_TIMEOUT_SECS);
}
