//! Content generation with retry and model fallback
//!
//! Wraps a [`CompletionBackend`] with the attempt plan from [`RetryPolicy`].
//! Every failure is absorbed here: callers only ever see text or `None`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::FillTask;
use crate::infrastructure::config::GenerationConfig;
use crate::infrastructure::errors::GenerationError;
use crate::infrastructure::http_client::{CompletionBackend, CompletionRequest};
use crate::infrastructure::retry_policy::RetryPolicy;

/// Produces text for one cell. `None` means the task failed.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, task: &FillTask) -> Option<String>;
}

/// Fill `{term}` and `{section}` in a prompt template.
#[must_use]
pub fn render_prompt(template: &str, entity_name: &str, section_label: &str) -> String {
    let mut out = String::with_capacity(template.len() + entity_name.len() + section_label.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{term}") {
            out.push_str(entity_name);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{section}") {
            out.push_str(section_label);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

pub struct GenerationClient<B> {
    backend: Arc<B>,
    policy: RetryPolicy,
    system_prompt: String,
    prompt_template: String,
    request_timeout: Duration,
}

impl<B: CompletionBackend> GenerationClient<B> {
    pub fn new(backend: Arc<B>, config: &GenerationConfig) -> Self {
        Self {
            backend,
            policy: RetryPolicy::from(config),
            system_prompt: config.system_prompt.clone(),
            prompt_template: config.prompt_template.clone(),
            request_timeout: config.request_timeout(),
        }
    }

    async fn call(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        match tokio::time::timeout(request.timeout, self.backend.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(request.timeout)),
        }
    }
}

#[async_trait]
impl<B: CompletionBackend + 'static> ContentGenerator for GenerationClient<B> {
    async fn generate(&self, task: &FillTask) -> Option<String> {
        let (row, col) = (task.row(), task.col());
        let user_prompt = render_prompt(&self.prompt_template, &task.entity_name, &task.section_label);

        for plan in self.policy.attempts() {
            let request = CompletionRequest {
                model: plan.model.to_string(),
                system_prompt: self.system_prompt.clone(),
                user_prompt: user_prompt.clone(),
                timeout: self.request_timeout,
            };

            match self.call(&request).await {
                Ok(text) if self.policy.accepts(&text, plan.is_final) => {
                    if plan.is_final && plan.attempt > 0 {
                        info!(row, col, model = plan.model, "Fallback model produced content");
                    } else {
                        debug!(row, col, attempt = plan.attempt + 1, model = plan.model, "Generated content");
                    }
                    return Some(text.trim().to_string());
                }
                Ok(text) => {
                    warn!(
                        row,
                        col,
                        attempt = plan.attempt + 1,
                        model = plan.model,
                        chars = text.trim().chars().count(),
                        "Response too short, retrying"
                    );
                }
                Err(e) => {
                    warn!(
                        row,
                        col,
                        attempt = plan.attempt + 1,
                        model = plan.model,
                        "Generation failed: {}",
                        e
                    );
                }
            }

            if !plan.is_final {
                tokio::time::sleep(self.policy.delay_for(plan.attempt)).await;
            }
        }

        warn!(
            row,
            col,
            term = %task.entity_name,
            section = %task.section_label,
            "All {} attempts failed",
            self.policy.total_attempts()
        );
        None
    }
}
