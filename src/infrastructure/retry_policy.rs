//! Attempt plan for a single generation task
//!
//! `max_retries` attempts with the primary model, then one attempt with the
//! fallback model. Backoff is linear in the attempt number.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::infrastructure::config::{GenerationConfig, defaults};

/// Retry policy settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts with the primary model
    pub max_retries: u32,
    /// Backoff unit; attempt `n` (0-based) is followed by `base_delay * (n + 1)`
    pub base_delay: Duration,
    /// Non-final attempts need strictly more characters than this
    pub min_content_chars: usize,
    pub primary_model: String,
    pub fallback_model: String,
}

/// What one attempt does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPlan<'a> {
    pub attempt: u32,
    pub model: &'a str,
    pub is_final: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            base_delay: Duration::from_millis(defaults::RETRY_BASE_DELAY_MS),
            min_content_chars: defaults::MIN_CONTENT_CHARS,
            primary_model: defaults::PRIMARY_MODEL.to_string(),
            fallback_model: defaults::FALLBACK_MODEL.to_string(),
        }
    }
}

impl From<&GenerationConfig> for RetryPolicy {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay(),
            min_content_chars: config.min_content_chars,
            primary_model: config.primary_model.clone(),
            fallback_model: config.fallback_model.clone(),
        }
    }
}

impl RetryPolicy {
    /// Primary attempts plus the fallback attempt.
    #[must_use]
    pub const fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Plan for `attempt`, or `None` once the plan is exhausted.
    #[must_use]
    pub fn attempt_plan(&self, attempt: u32) -> Option<AttemptPlan<'_>> {
        if attempt > self.max_retries {
            return None;
        }
        let is_final = attempt == self.max_retries;
        let model = if is_final {
            self.fallback_model.as_str()
        } else {
            self.primary_model.as_str()
        };
        Some(AttemptPlan {
            attempt,
            model,
            is_final,
        })
    }

    /// Iterate the whole plan in order.
    pub fn attempts(&self) -> impl Iterator<Item = AttemptPlan<'_>> {
        (0..self.total_attempts()).filter_map(move |attempt| self.attempt_plan(attempt))
    }

    /// Wait after a failed or rejected non-final attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_add(1))
    }

    /// Acceptance rule: long enough on regular attempts, any non-empty text on the final one.
    #[must_use]
    pub fn accepts(&self, text: &str, is_final: bool) -> bool {
        let trimmed = text.trim();
        if is_final {
            !trimmed.is_empty()
        } else {
            trimmed.chars().count() > self.min_content_chars
        }
    }
}
