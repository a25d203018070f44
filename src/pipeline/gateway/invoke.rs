//! Retrying invocation wrapper around the active provider.

use std::time::Duration;

use super::types::{Completion, ModelProvider, PromptRequest, ProviderReply, TokenUsage};
use super::GatewayError;

/// Retry tuning for the gateway.
///
/// Delays are injected so tests can run with millisecond bases.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per invocation, first try included.
    pub max_attempts: u32,
    /// Backoff base for generic retryable failures.
    pub base_delay: Duration,
    /// Backoff base for rate limits without a Retry-After hint.
    pub rate_limit_base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            rate_limit_base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, after `attempt` (1-based) failed.
    ///
    /// Rate limits prefer the provider's Retry-After; otherwise they back
    /// off on a larger exponential schedule than generic failures.
    pub fn delay_after(&self, attempt: u32, error: &GatewayError) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        match error {
            GatewayError::RateLimited {
                retry_after_secs: Some(secs),
                ..
            } => Duration::from_secs(*secs),
            GatewayError::RateLimited { .. } => self.rate_limit_base_delay.saturating_mul(factor),
            _ => self.base_delay.saturating_mul(factor),
        }
    }
}

/// Provider-agnostic invocation gateway with bounded retries.
pub struct Gateway {
    provider: Box<dyn ModelProvider>,
    policy: RetryPolicy,
}

impl Gateway {
    pub fn new(provider: Box<dyn ModelProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Send one prompt through the active provider.
    ///
    /// Retries connection, rate-limit and 5xx failures up to the policy's
    /// attempt budget; all other failures escalate immediately. After
    /// exhausting attempts the last failure is returned.
    pub async fn invoke(&self, request: &PromptRequest) -> Result<Completion, GatewayError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.provider.complete(request).await {
                Ok(reply) => {
                    tracing::debug!(
                        provider = self.provider.name(),
                        feature = %request.feature,
                        attempt,
                        "gateway call succeeded"
                    );
                    return Ok(account(request, reply, attempt));
                }
                Err(err) => {
                    let fatal = !err.is_retryable();
                    let exhausted = attempt >= self.policy.max_attempts;
                    tracing::warn!(
                        provider = self.provider.name(),
                        feature = %request.feature,
                        attempt,
                        kind = err.kind(),
                        fatal,
                        error = %err,
                        "gateway call failed"
                    );
                    if fatal || exhausted {
                        return Err(err);
                    }
                    let delay = self.policy.delay_after(attempt, &err);
                    tracing::debug!(
                        delay_ms = delay.as_millis() as u64,
                        "backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Attach token accounting: provider-reported counts when present,
/// otherwise the `ceil(chars / 4)` estimate for both sides.
fn account(request: &PromptRequest, reply: ProviderReply, attempts: u32) -> Completion {
    let usage = match reply.reported_usage {
        Some((prompt_tokens, completion_tokens)) => {
            TokenUsage::reported(prompt_tokens, completion_tokens)
        }
        None => TokenUsage::estimated(
            request.system_text.chars().count() + request.user_text.chars().count(),
            reply.content.chars().count(),
        ),
    };
    Completion {
        content: reply.content,
        usage,
        attempts,
    }
}
