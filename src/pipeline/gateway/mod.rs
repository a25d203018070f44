//! Model invocation gateway.
//!
//! One uniform contract over interchangeable providers: a prompt tuple
//! goes in, a completion with token accounting comes out, and every
//! failure is classified into a small taxonomy that drives retry policy.

pub mod invoke;
pub mod providers;
pub mod types;

pub use invoke::{Gateway, RetryPolicy};
pub use providers::{build_provider, MockProvider, OllamaProvider, OpenAiCompatProvider};
pub use types::{
    approx_token_count, Completion, FeatureKind, ModelProvider, PromptRequest, ProviderReply,
    TokenUsage,
};

use thiserror::Error;

/// Categorized failure from a provider call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("provider unreachable: {0}")]
    Network(String),

    #[error("rate limited by provider: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("provider server error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("provider rejected credentials (status {status})")]
    Auth { status: u16 },

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("provider rejected request: {0}")]
    BadRequest(String),

    #[error("unexpected provider failure: {0}")]
    Unknown(String),
}

impl GatewayError {
    /// Retryable failures: connection problems, rate limits, 5xx.
    /// Auth, missing-model and bad-request failures cannot succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Server { .. }
        )
    }

    /// Stable kind label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::RateLimited { .. } => "rate_limited",
            Self::Server { .. } => "server",
            Self::Auth { .. } => "auth",
            Self::ModelNotFound(_) => "model_not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unknown(_) => "unknown",
        }
    }
}
