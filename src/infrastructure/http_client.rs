//! HTTP backend for the text generation service
//!
//! Speaks the OpenAI-compatible `POST {base}/chat/completions` protocol. One
//! client and one rate limiter are shared by every worker.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, USER_AGENT},
};
use serde::{Deserialize, Serialize};

use crate::infrastructure::config::GenerationConfig;
use crate::infrastructure::errors::GenerationError;

/// One request to the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub timeout: Duration,
}

/// Anything that can turn a prompt into text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client with client-side rate limiting
pub struct OpenAiChatBackend {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    endpoint: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiChatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatBackend")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl OpenAiChatBackend {
    /// Build from config, reading the API key from the configured environment variable.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| GenerationError::MissingApiKey {
                env_var: config.api_key_env.clone(),
            })?;
        Self::new(config, api_key)
    }

    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self, GenerationError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("cellfill/", env!("CARGO_PKG_VERSION"))),
        );

        let client = Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| GenerationError::Transport(format!("failed to create HTTP client: {e}")))?;

        let per_second = NonZeroU32::new(config.max_requests_per_second).ok_or_else(|| {
            GenerationError::Transport("rate limit must be greater than 0".to_string())
        })?;
        let rate_limiter = RateLimiter::direct(Quota::per_second(per_second));

        Ok(Self {
            client,
            rate_limiter,
            endpoint: chat_completions_url(&config.api_base_url),
            api_key,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// `{base}/chat/completions`, tolerating a trailing slash on `base`.
#[must_use]
pub fn chat_completions_url(base: &str) -> String {
    format!("{}/chat/completions", base.trim_end_matches('/'))
}

/// Pull the first choice's text out of a response body.
pub fn extract_completion_text(body: &str) -> Result<String, GenerationError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| GenerationError::MalformedResponse("response has no choices".to_string()))
}

#[async_trait]
impl CompletionBackend for OpenAiChatBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        self.rate_limiter.until_ready().await;

        let body = ChatCompletionBody {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
        };

        tracing::trace!("POST {} model={}", self.endpoint, request.model);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::from_reqwest(&e, request.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::from_reqwest(&e, request.timeout))?;

        if !status.is_success() {
            return Err(GenerationError::from_status(status.as_u16(), &text));
        }

        extract_completion_text(&text)
    }
}
