//! Retry and timeout wrappers
//!
//! Applied by adapters around individual collaborator calls. The orchestrator
//! itself never retries; each phase makes its remote calls exactly once.

use crate::error::{Error, Result};
use backoff::backoff::Backoff;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

// =============================================================================
// Retry Policy
// =============================================================================

/// Fixed-delay retry policy bounded by a total attempt count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A policy that makes exactly one attempt
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    fn schedule(&self) -> FixedSchedule {
        FixedSchedule {
            delay: self.delay,
            retries_left: self.max_attempts.saturating_sub(1),
            max_retries: self.max_attempts.saturating_sub(1),
        }
    }
}

struct FixedSchedule {
    delay: Duration,
    retries_left: u32,
    max_retries: u32,
}

impl Backoff for FixedSchedule {
    fn reset(&mut self) {
        self.retries_left = self.max_retries;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries_left == 0 {
            return None;
        }
        self.retries_left -= 1;
        Some(self.delay)
    }
}

// =============================================================================
// Wrappers
// =============================================================================

/// Run `op` under `policy`, retrying errors that report themselves retryable
pub async fn retry<T, F, Fut>(policy: RetryPolicy, operation: &str, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_when(policy, operation, op, Error::is_retryable).await
}

/// Run `op` under `policy`, retrying only errors accepted by `retryable`
pub async fn retry_when<T, F, Fut, P>(
    policy: RetryPolicy,
    operation: &str,
    mut op: F,
    retryable: P,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&Error) -> bool,
{
    let classify = |err: Error| {
        if retryable(&err) {
            backoff::Error::transient(err)
        } else {
            backoff::Error::permanent(err)
        }
    };

    backoff::future::retry_notify(
        policy.schedule(),
        || {
            let attempt = op();
            async move { attempt.await.map_err(classify) }
        },
        |err: Error, wait: Duration| {
            warn!("{} failed, retrying in {:?}: {}", operation, wait, err);
        },
    )
    .await
}

/// Bound a future by a deadline, surfacing expiry as [`Error::Timeout`]
pub async fn with_timeout<T, Fut>(after: Duration, operation: &str, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            after,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_errors() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(5));

        let value = retry(policy, "probe", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::connection("san", "refused"))
            } else {
                Ok(42)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(5));

        let result: Result<()> = retry(policy, "probe", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::connection("san", "refused"))
        })
        .await;

        assert_matches!(result, Err(Error::Connection { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_on_permanent_error() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry(RetryPolicy::default(), "probe", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Authentication {
                target: "san".into(),
            })
        })
        .await;

        assert_matches!(result, Err(Error::Authentication { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_when_custom_predicate() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(4, Duration::from_secs(1));

        let result: Result<()> = retry_when(
            policy,
            "mkfs",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::operation("mkfs", "device busy"))
            },
            |e| matches!(e, Error::Operation { .. }),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_once_policy_makes_single_attempt() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry(RetryPolicy::once(), "probe", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::connection("san", "refused"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_expires() {
        let result: Result<()> = with_timeout(Duration::from_secs(2), "fio", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        assert_matches!(result, Err(Error::Timeout { after, .. }) if after == Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let value = with_timeout(Duration::from_secs(2), "echo", async { Ok("done") })
            .await
            .unwrap();
        assert_eq!(value, "done");
    }
}
