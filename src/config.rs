//! Environment-driven pipeline configuration.
//!
//! Exactly one provider is selected at process start; switching providers
//! requires reconfiguration, not a runtime call. All tuning knobs carry
//! defaults so embedders only set what they need.

use std::time::Duration;

use crate::pipeline::gateway::RetryPolicy;
use crate::pipeline::summarize::SummarizeOptions;

/// Environment variable prefix shared by every knob.
const ENV_PREFIX: &str = "CONDENSE_";

/// The closed set of upstream providers the gateway can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Local Ollama instance (`/api/generate`).
    Ollama,
    /// Any `/v1/chat/completions`-dialect server (OpenAI, OpenRouter, vLLM).
    OpenAiCompat,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAiCompat => "openai-compat",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" | "openai-compat" | "openrouter" => Some(Self::OpenAiCompat),
            _ => None,
        }
    }

    /// Default base URL for the provider's public endpoint.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::OpenAiCompat => "https://api.openai.com",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub provider: ProviderKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Bound on any single provider call.
    pub request_timeout: Duration,
    /// Total attempts per gateway invocation (first try included).
    pub max_attempts: u32,
    /// Backoff base for generic retryable failures.
    pub base_delay: Duration,
    /// Larger backoff base for rate-limit failures without a Retry-After.
    pub rate_limit_base_delay: Duration,
    /// Documents estimated below this many tokens are summarized in one call.
    pub direct_threshold_tokens: usize,
    /// Token budget per chunk window.
    pub chunk_max_tokens: usize,
    /// Token overlap between consecutive chunk windows.
    pub chunk_overlap_tokens: usize,
    /// Pause between chunk map calls to stay under provider rate limits.
    pub inter_chunk_delay: Duration,
    /// Corrective re-prompts allowed after unparseable output, per request.
    pub max_parse_retries: u32,
    /// Hard cap on document characters accepted per job.
    pub max_input_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            base_url: ProviderKind::Ollama.default_base_url().to_string(),
            api_key: None,
            model: "llama3".to_string(),
            request_timeout: Duration::from_secs(60),
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            rate_limit_base_delay: Duration::from_secs(5),
            direct_threshold_tokens: 2000,
            chunk_max_tokens: 2000,
            chunk_overlap_tokens: 100,
            inter_chunk_delay: Duration::from_millis(500),
            max_parse_retries: 2,
            max_input_chars: 400_000,
        }
    }
}

impl PipelineConfig {
    /// Read configuration from `CONDENSE_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup,
    /// so configuration parsing stays testable without touching the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("PROVIDER") {
            match ProviderKind::from_str(&raw) {
                Some(kind) => {
                    config.provider = kind;
                    config.base_url = kind.default_base_url().to_string();
                }
                None => {
                    tracing::warn!(value = %raw, "unknown provider name, keeping default");
                }
            }
        }
        if let Some(url) = lookup("BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(key) = lookup("API_KEY") {
            if !key.trim().is_empty() {
                config.api_key = Some(key);
            }
        }
        if let Some(model) = lookup("MODEL") {
            if !model.trim().is_empty() {
                config.model = model.trim().to_string();
            }
        }
        if let Some(secs) = lookup("TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            config.request_timeout = Duration::from_secs(secs);
        }

        config
    }

    /// Retry tuning consumed by the gateway.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            rate_limit_base_delay: self.rate_limit_base_delay,
        }
    }

    /// Strategy tuning consumed by the summarizer.
    pub fn summarize_options(&self) -> SummarizeOptions {
        SummarizeOptions {
            direct_threshold_tokens: self.direct_threshold_tokens,
            chunk_max_tokens: self.chunk_max_tokens,
            chunk_overlap_tokens: self.chunk_overlap_tokens,
            inter_chunk_delay: self.inter_chunk_delay,
            max_parse_retries: self.max_parse_retries,
            max_input_chars: self.max_input_chars,
            ..SummarizeOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_spec_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.rate_limit_base_delay, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.direct_threshold_tokens, 2000);
        assert_eq!(config.chunk_max_tokens, 2000);
        assert_eq!(config.chunk_overlap_tokens, 100);
        assert_eq!(config.max_parse_retries, 2);
    }

    #[test]
    fn provider_selection_updates_base_url() {
        let config = PipelineConfig::from_lookup(lookup_from(&[("PROVIDER", "openai")]));
        assert_eq!(config.provider, ProviderKind::OpenAiCompat);
        assert_eq!(config.base_url, "https://api.openai.com");
    }

    #[test]
    fn explicit_base_url_overrides_provider_default() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("PROVIDER", "openai"),
            ("BASE_URL", "https://openrouter.ai/api/"),
        ]));
        assert_eq!(config.base_url, "https://openrouter.ai/api");
    }

    #[test]
    fn unknown_provider_keeps_default() {
        let config = PipelineConfig::from_lookup(lookup_from(&[("PROVIDER", "mainframe")]));
        assert_eq!(config.provider, ProviderKind::Ollama);
    }

    #[test]
    fn blank_api_key_treated_as_absent() {
        let config = PipelineConfig::from_lookup(lookup_from(&[("API_KEY", "  ")]));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn timeout_parsed_from_env() {
        let config = PipelineConfig::from_lookup(lookup_from(&[("TIMEOUT_SECS", "120")]));
        assert_eq!(config.request_timeout, Duration::from_secs(120));
    }

    #[test]
    fn provider_kind_roundtrip() {
        for kind in [ProviderKind::Ollama, ProviderKind::OpenAiCompat] {
            assert_eq!(ProviderKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ProviderKind::from_str("openrouter"), Some(ProviderKind::OpenAiCompat));
        assert_eq!(ProviderKind::from_str(""), None);
    }
}
