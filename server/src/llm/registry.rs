//! Model registry: which models exist, who serves them, what they cost.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenAi,
    Google,
}

impl Provider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Google => "google",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub provider: Provider,
    pub label: &'static str,
    /// USD per 1K input tokens.
    pub input_cost_per_1k: f64,
    /// USD per 1K output tokens.
    pub output_cost_per_1k: f64,
    /// Supports extended thinking / reasoning effort.
    pub reasoning: bool,
}

pub const MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "claude-sonnet-4-5-20250929",
        provider: Provider::Anthropic,
        label: "Claude Sonnet 4.5",
        input_cost_per_1k: 0.003,
        output_cost_per_1k: 0.015,
        reasoning: true,
    },
    ModelInfo {
        id: "claude-haiku-4-5-20251001",
        provider: Provider::Anthropic,
        label: "Claude Haiku 4.5",
        input_cost_per_1k: 0.001,
        output_cost_per_1k: 0.005,
        reasoning: true,
    },
    ModelInfo {
        id: "claude-opus-4-1-20250805",
        provider: Provider::Anthropic,
        label: "Claude Opus 4.1",
        input_cost_per_1k: 0.015,
        output_cost_per_1k: 0.075,
        reasoning: true,
    },
    ModelInfo {
        id: "gpt-4o",
        provider: Provider::OpenAi,
        label: "GPT-4o",
        input_cost_per_1k: 0.0025,
        output_cost_per_1k: 0.01,
        reasoning: false,
    },
    ModelInfo {
        id: "gpt-4o-mini",
        provider: Provider::OpenAi,
        label: "GPT-4o mini",
        input_cost_per_1k: 0.000_15,
        output_cost_per_1k: 0.0006,
        reasoning: false,
    },
    ModelInfo {
        id: "gpt-4.1",
        provider: Provider::OpenAi,
        label: "GPT-4.1",
        input_cost_per_1k: 0.002,
        output_cost_per_1k: 0.008,
        reasoning: false,
    },
    ModelInfo {
        id: "gemini-2.5-pro",
        provider: Provider::Google,
        label: "Gemini 2.5 Pro",
        input_cost_per_1k: 0.001_25,
        output_cost_per_1k: 0.01,
        reasoning: true,
    },
    ModelInfo {
        id: "gemini-2.5-flash",
        provider: Provider::Google,
        label: "Gemini 2.5 Flash",
        input_cost_per_1k: 0.0003,
        output_cost_per_1k: 0.0025,
        reasoning: true,
    },
];

#[must_use]
pub fn find(id: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|model| model.id == id)
}

/// Cost in USD of one call: tokens / 1000 × per-1K price.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate_cost(model: &ModelInfo, input_tokens: u64, output_tokens: u64) -> f64 {
    let input = input_tokens as f64 / 1000.0 * model.input_cost_per_1k;
    let output = output_tokens as f64 / 1000.0 * model.output_cost_per_1k;
    input + output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        for (i, a) in MODELS.iter().enumerate() {
            assert!(MODELS.iter().skip(i + 1).all(|b| b.id != a.id), "duplicate {}", a.id);
        }
    }

    #[test]
    fn find_known_and_unknown() {
        assert_eq!(find("gpt-4o").map(|m| m.provider), Some(Provider::OpenAi));
        assert_eq!(find("gemini-2.5-flash").map(|m| m.provider), Some(Provider::Google));
        assert!(find("gpt-9").is_none());
    }

    #[test]
    fn cost_uses_per_thousand_pricing() {
        let sonnet = find("claude-sonnet-4-5-20250929").unwrap();
        let cost = estimate_cost(sonnet, 2000, 1000);
        assert!((cost - (0.006 + 0.015)).abs() < 1e-12);
        assert!(estimate_cost(sonnet, 0, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn every_provider_has_a_model() {
        for provider in [Provider::Anthropic, Provider::OpenAi, Provider::Google] {
            assert!(MODELS.iter().any(|m| m.provider == provider), "{}", provider.as_str());
        }
    }
}
