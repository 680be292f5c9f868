use std::future::Future;
use std::time::Duration;

use dropgate_types::{DropgateError, Result};
use tracing::warn;

/// Exponential backoff policy for a single retriable operation (spec.md
/// §4.2 point 6: default 1 s → 30 s cap, 5 retries).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_retries: 5,
        }
    }
}

/// A phase pair the caller can use to surface `retry-wait → retry` between
/// attempts (spec.md §4.2's phase list).
pub enum RetrySignal {
    Waiting { attempt: u32, delay: Duration },
    Retrying { attempt: u32 },
}

/// Retries `op` under `policy`, re-running the exact same logical attempt
/// (callers are expected to resend identical bytes at the identical offset —
/// this helper only owns the backoff/give-up decision, not the I/O).
pub async fn retry_with_backoff<F, Fut, T>(
    policy: RetryPolicy,
    mut on_signal: impl FnMut(RetrySignal),
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    let mut backoff = policy.initial_backoff;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retriable() && attempt < policy.max_retries => {
                attempt += 1;
                warn!("attempt {} failed, retrying: {}", attempt, e);
                on_signal(RetrySignal::Waiting { attempt, delay: backoff });
                tokio::time::sleep(backoff).await;
                on_signal(RetrySignal::Retrying { attempt });
                backoff = (backoff * 2).min(policy.max_backoff);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Maps an HTTP status code into the retriable/non-retriable classification
/// spec.md §4.2 describes (5xx and timeouts retry, 4xx doesn't).
pub fn classify_status(status: u16, context: &str) -> DropgateError {
    if status == 413 {
        DropgateError::validation(format!("{context}: file too large"))
    } else if (400..500).contains(&status) {
        DropgateError::validation(format!("{context}: request rejected ({status})"))
    } else {
        DropgateError::network(format!("{context}: server error ({status})"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            max_retries: 5,
        };

        let result: Result<u32> = retry_with_backoff(policy, |_| {}, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(DropgateError::network("transient"))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retriable_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<()> = retry_with_backoff(policy, |_| {}, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DropgateError::validation("bad request"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            max_retries: 2,
        };

        let result: Result<()> = retry_with_backoff(policy, |_| {}, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DropgateError::network("down"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
