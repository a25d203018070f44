//! Concrete providers behind the [`ModelProvider`] trait.
//!
//! The active provider is selected once at startup from configuration;
//! adding a provider means adding one variant here, not touching call
//! sites.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{PipelineConfig, ProviderKind};

use super::types::{ModelProvider, PromptRequest, ProviderReply};
use super::GatewayError;

/// Build the configured provider. Called once at process start.
pub fn build_provider(config: &PipelineConfig) -> Box<dyn ModelProvider> {
    match config.provider {
        ProviderKind::Ollama => Box::new(OllamaProvider::new(
            &config.base_url,
            &config.model,
            config.request_timeout,
        )),
        ProviderKind::OpenAiCompat => Box::new(OpenAiCompatProvider::new(
            &config.base_url,
            config.api_key.clone(),
            &config.model,
            config.request_timeout,
        )),
    }
}

/// Map an HTTP status to the gateway failure taxonomy.
fn classify_status(status: u16, retry_after_secs: Option<u64>, body: &str) -> GatewayError {
    match status {
        401 | 403 => GatewayError::Auth { status },
        404 => GatewayError::ModelNotFound(truncate_body(body)),
        429 => GatewayError::RateLimited {
            message: truncate_body(body),
            retry_after_secs,
        },
        400 => GatewayError::BadRequest(truncate_body(body)),
        s if s >= 500 => GatewayError::Server {
            status,
            message: truncate_body(body),
        },
        _ => GatewayError::Unknown(format!("status {status}: {}", truncate_body(body))),
    }
}

fn classify_transport(err: &reqwest::Error) -> GatewayError {
    if err.is_connect() || err.is_timeout() {
        GatewayError::Network(err.to_string())
    } else {
        GatewayError::Unknown(err.to_string())
    }
}

/// Keep provider error bodies short enough for logs and user messages.
fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    if trimmed.len() <= MAX {
        return trimmed.to_string();
    }
    let mut cut = MAX;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &trimmed[..cut])
}

fn retry_after_secs(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("Failed to create HTTP client")
}

// ──────────────────────────────────────────────
// Ollama
// ──────────────────────────────────────────────

/// Local Ollama instance via `/api/generate`, non-streaming.
pub struct OllamaProvider {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: http_client(timeout),
        }
    }
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: OllamaOptions<'a>,
}

#[derive(Serialize)]
struct OllamaOptions<'a> {
    num_predict: i32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    async fn complete(&self, request: &PromptRequest) -> Result<ProviderReply, GatewayError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt: &request.user_text,
            system: &request.system_text,
            stream: false,
            options: OllamaOptions {
                num_predict: request.max_tokens as i32,
                stop: &request.stop_sequences,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), retry_after, &body));
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Unknown(format!("malformed provider response: {e}")))?;

        Ok(ProviderReply {
            content: parsed.response,
            reported_usage: parsed.prompt_eval_count.zip(parsed.eval_count),
        })
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

// ──────────────────────────────────────────────
// OpenAI-compatible chat completions
// ──────────────────────────────────────────────

/// Any `/v1/chat/completions`-dialect server, bearer-token auth.
pub struct OpenAiCompatProvider {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: &str, api_key: Option<String>, model: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            client: http_client(timeout),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageContent,
}

#[derive(Deserialize)]
struct ChatMessageContent {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl ModelProvider for OpenAiCompatProvider {
    async fn complete(&self, request: &PromptRequest) -> Result<ProviderReply, GatewayError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_text,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_text,
                },
            ],
            max_tokens: request.max_tokens,
            stop: &request.stop_sequences,
            stream: false,
        };

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), retry_after, &body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Unknown(format!("malformed provider response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GatewayError::Unknown("provider returned no choices".into()))?;

        Ok(ProviderReply {
            content,
            reported_usage: parsed
                .usage
                .map(|u| (u.prompt_tokens, u.completion_tokens)),
        })
    }

    fn name(&self) -> &'static str {
        "openai-compat"
    }
}

// ──────────────────────────────────────────────
// Mock
// ──────────────────────────────────────────────

/// Scriptable provider double for tests and offline development.
///
/// Clones share the same script and call record, so a test can keep one
/// handle while the gateway owns another.
#[derive(Clone, Default)]
pub struct MockProvider {
    inner: Arc<MockInner>,
}

#[derive(Default)]
struct MockInner {
    replies: Mutex<VecDeque<Result<ProviderReply, GatewayError>>>,
    default_reply: Mutex<String>,
    requests: Mutex<Vec<PromptRequest>>,
}

impl MockProvider {
    /// A mock whose unscripted calls return `default_reply`.
    pub fn new(default_reply: &str) -> Self {
        let mock = Self::default();
        *mock.inner.default_reply.lock().expect("mock lock") = default_reply.to_string();
        mock
    }

    /// Queue one successful reply without reported usage.
    pub fn enqueue_ok(&self, content: &str) {
        self.enqueue(Ok(ProviderReply {
            content: content.to_string(),
            reported_usage: None,
        }));
    }

    /// Queue one failure.
    pub fn enqueue_err(&self, error: GatewayError) {
        self.enqueue(Err(error));
    }

    pub fn enqueue(&self, result: Result<ProviderReply, GatewayError>) {
        self.inner.replies.lock().expect("mock lock").push_back(result);
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<PromptRequest> {
        self.inner.requests.lock().expect("mock lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.requests.lock().expect("mock lock").len()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn complete(&self, request: &PromptRequest) -> Result<ProviderReply, GatewayError> {
        self.inner
            .requests
            .lock()
            .expect("mock lock")
            .push(request.clone());
        if let Some(scripted) = self.inner.replies.lock().expect("mock lock").pop_front() {
            return scripted;
        }
        Ok(ProviderReply {
            content: self.inner.default_reply.lock().expect("mock lock").clone(),
            reported_usage: None,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
