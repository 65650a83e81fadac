//! Web search backend for the `webSearch` / `webExtract` tools.
//!
//! DESIGN
//! ======
//! The chat turn only knows the `WebSearch` trait. `TavilyClient` is the
//! HTTP implementation; tests substitute a stub. Results are returned in
//! the backend's ranking order and serialized straight into tool output.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorCode;

const TAVILY_BASE_URL: &str = "https://api.tavily.com";
const SEARCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Request(String),
    #[error("search backend returned status {status}: {body}")]
    Response { status: u16, body: String },
    #[error("search response parse failed: {0}")]
    Parse(String),
}

impl ErrorCode for SearchError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Request(_) => "E_SEARCH_REQUEST",
            Self::Response { .. } => "E_SEARCH_RESPONSE",
            Self::Parse(_) => "E_SEARCH_PARSE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Response { status: 429 | 500..=599, .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedPage {
    pub url: String,
    pub raw_content: String,
}

#[async_trait::async_trait]
pub trait WebSearch: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`SearchError`] if the backend call fails.
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<SearchResult>, SearchError>;

    /// # Errors
    ///
    /// Returns a [`SearchError`] if the backend call fails.
    async fn extract(&self, urls: &[String]) -> Result<Vec<ExtractedPage>, SearchError>;
}

// =============================================================================
// TAVILY
// =============================================================================

pub struct TavilyClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct TavilySearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct TavilyExtractResponse {
    #[serde(default)]
    results: Vec<TavilyExtracted>,
}

#[derive(Deserialize)]
struct TavilyExtracted {
    url: String,
    #[serde(default)]
    raw_content: String,
}

impl TavilyClient {
    /// # Errors
    ///
    /// Returns `SearchError::Request` if the HTTP client cannot be built.
    pub fn new(api_key: String) -> Result<Self, SearchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| SearchError::Request(e.to_string()))?;
        Ok(Self { http, api_key, base_url: TAVILY_BASE_URL.to_string() })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<String, SearchError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;
        if status != 200 {
            return Err(SearchError::Response { status, body: text });
        }
        Ok(text)
    }
}

fn parse_search(text: &str) -> Result<Vec<SearchResult>, SearchError> {
    let parsed: TavilySearchResponse = serde_json::from_str(text).map_err(|e| SearchError::Parse(e.to_string()))?;
    Ok(parsed.results)
}

fn parse_extract(text: &str) -> Result<Vec<ExtractedPage>, SearchError> {
    let parsed: TavilyExtractResponse = serde_json::from_str(text).map_err(|e| SearchError::Parse(e.to_string()))?;
    Ok(parsed
        .results
        .into_iter()
        .map(|page| ExtractedPage { url: page.url, raw_content: page.raw_content })
        .collect())
}

#[async_trait::async_trait]
impl WebSearch for TavilyClient {
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<SearchResult>, SearchError> {
        let body = serde_json::json!({ "query": query, "max_results": max_results });
        let text = self.post("/search", &body).await?;
        parse_search(&text)
    }

    async fn extract(&self, urls: &[String]) -> Result<Vec<ExtractedPage>, SearchError> {
        let body = serde_json::json!({ "urls": urls });
        let text = self.post("/extract", &body).await?;
        parse_extract(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_results_in_order() {
        let text = serde_json::json!({
            "query": "rust",
            "results": [
                { "title": "The Rust Book", "url": "https://doc.rust-lang.org/book/", "content": "Learn", "score": 0.9 },
                { "title": "Rust", "url": "https://www.rust-lang.org/" }
            ]
        })
        .to_string();
        let results = parse_search(&text).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://doc.rust-lang.org/book/");
        assert_eq!(results[1].content, "");
    }

    #[test]
    fn parses_extract_results() {
        let text = serde_json::json!({
            "results": [{ "url": "https://example.com", "raw_content": "Example Domain" }],
            "failed_results": []
        })
        .to_string();
        let pages = parse_extract(&text).unwrap();
        assert_eq!(pages, vec![ExtractedPage { url: "https://example.com".into(), raw_content: "Example Domain".into() }]);
    }

    #[test]
    fn bad_body_is_a_parse_error() {
        assert!(matches!(parse_search("<html>"), Err(SearchError::Parse(_))));
    }

    #[test]
    fn rate_limits_are_retryable() {
        assert!(SearchError::Response { status: 429, body: String::new() }.retryable());
        assert!(!SearchError::Response { status: 401, body: String::new() }.retryable());
    }
}
