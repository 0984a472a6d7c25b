//! Opt-in retry decorator for LLM clients
//!
//! The invocation adapter never retries. Callers that want retries wrap
//! their client in [`RetryingClient`] before handing it to the adapter.

use crate::llm_client::{CompletionRequest, LlmClient, LlmError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first; 1 disables retries
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed sleep between attempts
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_backoff_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 1
    }
}

pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: LlmClient> RetryingClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: LlmClient> LlmClient for RetryingClient<C> {
    fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.complete(request) {
                Ok(text) => return Ok(text),
                Err(e) if attempt < attempts => {
                    warn!(attempt, attempts, "backend call failed, retrying: {}", e);
                    if self.policy.backoff_ms > 0 {
                        std::thread::sleep(Duration::from_millis(self.policy.backoff_ms));
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
