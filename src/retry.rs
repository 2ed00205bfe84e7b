//! Bounded-retry combinator
//!
//! Wraps a single external call with a fixed attempt budget and a fixed
//! delay between attempts. No exponential backoff, no jitter. The same
//! combinator serves tool invocations and, when configured with a larger
//! budget, language-model invocations.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::Result;

/// Attempt budget and inter-attempt delay for one external call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Run `operation` until it succeeds, a non-retryable error is raised, or
/// the attempt budget is exhausted. Returns the first success or the last
/// error observed.
pub async fn run_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    op_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                warn!(
                    op = op_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %error,
                    "Attempt failed"
                );

                if !error.is_retryable() {
                    return Err(error);
                }
                last_error = Some(error);

                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    // max_attempts >= 1, so at least one error was recorded
    Err(last_error.unwrap_or_else(|| {
        crate::error::PipelineError::ToolFailed {
            tool: op_name.to_string(),
            cause: "retry budget exhausted".to_string(),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient(tool: &str) -> PipelineError {
        PipelineError::ToolFailed {
            tool: tool.to_string(),
            cause: "connection reset".to_string(),
        }
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = run_with_retry(fast_policy(3), "flaky", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(transient("flaky"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_budget() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = run_with_retry(fast_policy(3), "down", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient("down")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = run_with_retry(fast_policy(3), "unknown", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PipelineError::UnknownTool("bloomberg".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(PipelineError::UnknownTool(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_attempt_policy() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = run_with_retry(RetryPolicy::no_retry(), "llm", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient("llm")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
