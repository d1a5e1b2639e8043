use common::{RagError, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Outcome of one provider call attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Rate limits, connection drops, timeouts, 5xx: worth another try
    Transient(String),
    /// Anything else fails the call immediately
    Fatal(String),
}

impl CallError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("status {}: {}", status, body);
        let code = status.as_u16();
        if matches!(code, 408 | 409 | 429) || status.is_server_error() {
            Self::Transient(message)
        } else {
            Self::Fatal(message)
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_builder() || err.is_decode() {
            Self::Fatal(err.to_string())
        } else {
            Self::Transient(err.to_string())
        }
    }
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(msg) | Self::Fatal(msg) => f.write_str(msg),
        }
    }
}

/// Linear backoff: the wait after attempt `n` is `n * base_interval`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_interval_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_interval: Duration::from_millis(base_interval_ms),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn delay_for(&self, attempt: usize) -> Duration {
        self.base_interval * attempt as u32
    }

    /// Run `f` until it succeeds, fails fatally, or attempts run out.
    pub async fn retry<F, Fut, T>(&self, operation_name: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, CallError>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match f().await {
                Ok(result) => {
                    if attempt > 1 {
                        info!(
                            operation = operation_name,
                            attempts = attempt,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(CallError::Fatal(msg)) => {
                    return Err(RagError::provider(format!(
                        "{} failed: {}",
                        operation_name, msg
                    )));
                }
                Err(CallError::Transient(msg)) => {
                    if attempt >= self.max_attempts {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %msg,
                            "Operation failed after max retries"
                        );
                        return Err(RagError::provider(format!(
                            "Max retries exceeded for {}. Last error: {}",
                            operation_name, msg
                        )));
                    }

                    let backoff = self.delay_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis(),
                        error = %msg,
                        "Operation failed, retrying"
                    );

                    sleep(backoff).await;
                }
            }
        }
    }
}
