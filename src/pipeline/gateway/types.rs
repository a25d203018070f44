//! Request, completion and provider types shared across the gateway.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::GatewayError;

/// The pipeline feature a prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureKind {
    Explain,
    Roadmap,
    Rewrite,
    DocumentChunk,
    DocumentFinal,
}

impl FeatureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explain => "explain",
            Self::Roadmap => "roadmap",
            Self::Rewrite => "rewrite",
            Self::DocumentChunk => "document-chunk",
            Self::DocumentFinal => "document-final",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "explain" => Some(Self::Explain),
            "roadmap" => Some(Self::Roadmap),
            "rewrite" => Some(Self::Rewrite),
            "document-chunk" => Some(Self::DocumentChunk),
            "document-final" => Some(Self::DocumentFinal),
            _ => None,
        }
    }

    pub fn all() -> &'static [FeatureKind] {
        &[
            Self::Explain,
            Self::Roadmap,
            Self::Rewrite,
            Self::DocumentChunk,
            Self::DocumentFinal,
        ]
    }
}

impl std::fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One model invocation. Immutable, constructed per call.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    pub feature: FeatureKind,
    pub system_text: String,
    pub user_text: String,
    pub max_tokens: u32,
    pub stop_sequences: Vec<String>,
}

/// Raw provider reply, before token accounting.
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub content: String,
    /// `(prompt, completion)` counts when the provider reports usage.
    pub reported_usage: Option<(u32, u32)>,
}

/// Token counts attached to a successful completion.
///
/// Counts are either both provider-reported or both estimated; the two
/// sources are never mixed within one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// True when the counts came from the `ceil(chars / 4)` approximation.
    pub estimated: bool,
}

impl TokenUsage {
    pub fn reported(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            estimated: false,
        }
    }

    /// Estimate both sides from character counts.
    pub fn estimated(prompt_chars: usize, completion_chars: usize) -> Self {
        let prompt_tokens = approx_token_count_from_chars(prompt_chars);
        let completion_tokens = approx_token_count_from_chars(completion_chars);
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            estimated: true,
        }
    }
}

/// Successful gateway invocation.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
    /// Provider attempts spent, retries included.
    pub attempts: u32,
}

/// Approximate tokens as `ceil(chars / 4)`.
///
/// Used whenever the provider does not report usage, and by the
/// summarizer's strategy decision; downstream consumers see one
/// consistent estimate.
pub fn approx_token_count(text: &str) -> u32 {
    approx_token_count_from_chars(text.chars().count())
}

pub fn approx_token_count_from_chars(chars: usize) -> u32 {
    ((chars + 3) / 4) as u32
}

/// Capability interface every provider variant implements.
///
/// One call to `complete` issues exactly one network request; retries
/// live in the [`Gateway`](super::Gateway), not in providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(&self, request: &PromptRequest) -> Result<ProviderReply, GatewayError>;

    /// Short provider name for logs and job metrics.
    fn name(&self) -> &'static str;
}
