// Retry-with-backoff for throttled exchanges.
//
// The default policy retries forever with a fixed 5 second wait. Callers that
// cannot tolerate an unbounded loop set `max_retries` and/or `max_elapsed`.

use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::StageError;

/// Wait between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed(Duration),
    /// `base * 2^attempt`, capped at `max`, optionally with jitter of
    /// `[0, base/2)` that never pushes the delay past `max`.
    Exponential {
        base: Duration,
        max: Duration,
        jitter: bool,
    },
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries (not counting the initial attempt).
    /// `None` retries until success, a fatal error, or cancellation.
    pub max_retries: Option<u32>,
    /// Give up once the next wait would end past this much time since the
    /// first attempt.
    pub max_elapsed: Option<Duration>,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: None,
            max_elapsed: None,
            backoff: Backoff::Fixed(Duration::from_secs(5)),
        }
    }
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            backoff: Backoff::Fixed(delay),
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }

    /// Compute the delay for a given attempt number (0-indexed).
    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let (base, max, jitter) = match &self.backoff {
            Backoff::Fixed(delay) => return *delay,
            Backoff::Exponential { base, max, jitter } => (*base, *max, *jitter),
        };

        // 2^attempt via checked shift so attempts >= 32 saturate.
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let capped = base.checked_mul(multiplier).unwrap_or(max).min(max);

        if !jitter {
            return capped;
        }

        let jitter_range_ms = saturating_millis(base) / 2;
        let remaining_ms = saturating_millis(max.saturating_sub(capped));
        let jitter_limit_ms = jitter_range_ms.min(remaining_ms);
        if jitter_limit_ms == 0 {
            return capped;
        }

        let jitter_ms = rand::rng().random_range(0..jitter_limit_ms);
        (capped + Duration::from_millis(jitter_ms)).min(max)
    }

    fn exhausted(&self, attempt: u32, started: Instant, next_delay: Duration) -> bool {
        if self.max_retries.is_some_and(|max| attempt >= max) {
            return true;
        }
        self.max_elapsed
            .is_some_and(|limit| started.elapsed() + next_delay > limit)
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Result of a single attempt, used by the caller to signal retryability.
pub enum RetryAction<T> {
    Success(T),
    /// Transient failure; wait and try again.
    Retry(StageError),
    /// Permanent failure; stop immediately.
    Fail(StageError),
}

/// Execute an async operation with retry-and-backoff.
///
/// `operation` receives the current attempt number (0-indexed). When the
/// policy is exhausted the last retryable error is returned wrapped in
/// [`StageError::Throttled`].
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T, StageError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = RetryAction<T>>,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        if token.is_cancelled() {
            return Err(StageError::Cancelled);
        }

        let err = match operation(attempt).await {
            RetryAction::Success(value) => return Ok(value),
            RetryAction::Fail(err) => return Err(err),
            RetryAction::Retry(err) => err,
        };

        let delay = policy.delay_for_attempt(attempt);
        if policy.exhausted(attempt, started, delay) {
            return Err(StageError::Throttled {
                attempts: attempt.saturating_add(1),
                last: Box::new(err),
            });
        }

        warn!(
            attempt = attempt + 1,
            max = ?policy.max_retries,
            delay_ms = saturating_millis(delay),
            error = %err,
            "Retrying after transient error"
        );

        tokio::select! {
            _ = token.cancelled() => return Err(StageError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn throttled() -> StageError {
        StageError::upstream(StatusCode::TOO_MANY_REQUESTS, "slow down")
    }

    #[test]
    fn default_policy_is_unbounded_fixed_five_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, None);
        assert_eq!(policy.max_elapsed, None);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(5));
    }

    #[test]
    fn millis_saturate_instead_of_wrapping() {
        assert_eq!(saturating_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn exponential_delay_respects_max_cap() {
        let policy = RetryPolicy {
            backoff: Backoff::Exponential {
                base: Duration::from_millis(500),
                max: Duration::from_secs(5),
                jitter: false,
            },
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn exponential_jitter_does_not_exceed_max_cap() {
        let policy = RetryPolicy {
            backoff: Backoff::Exponential {
                base: Duration::from_millis(500),
                max: Duration::from_secs(1),
                jitter: true,
            },
            ..RetryPolicy::default()
        };
        for _ in 0..32 {
            assert!(policy.delay_for_attempt(10) <= Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_exactly_k_waits() {
        let policy = RetryPolicy::default();
        let token = CancellationToken::new();
        let attempts = AtomicU32::new(0);
        let started = Instant::now();

        let result = retry_with_backoff(&policy, &token, |attempt| {
            attempts.fetch_add(1, Ordering::Relaxed);
            async move {
                if attempt < 3 {
                    RetryAction::Retry(throttled())
                } else {
                    RetryAction::Success("token")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "token");
        assert_eq!(attempts.load(Ordering::Relaxed), 4);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(15));
        assert!(elapsed < Duration::from_secs(16));
    }

    #[tokio::test]
    async fn fails_immediately_on_non_retryable() {
        let policy = RetryPolicy::fixed(Duration::from_millis(1));
        let token = CancellationToken::new();
        let attempts = AtomicU32::new(0);

        let result: Result<u32, _> = retry_with_backoff(&policy, &token, |_| {
            attempts.fetch_add(1, Ordering::Relaxed);
            async { RetryAction::Fail(StageError::malformed("bad json", "<html>")) }
        })
        .await;

        assert!(matches!(result, Err(StageError::Malformed { .. })));
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn max_retries_exhausts_into_throttled() {
        let policy = RetryPolicy::fixed(Duration::from_millis(1)).with_max_retries(2);
        let token = CancellationToken::new();
        let attempts = AtomicU32::new(0);

        let result: Result<u32, _> = retry_with_backoff(&policy, &token, |_| {
            attempts.fetch_add(1, Ordering::Relaxed);
            async { RetryAction::Retry(throttled()) }
        })
        .await;

        // Initial attempt + 2 retries.
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
        match result {
            Err(StageError::Throttled { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.is_throttle());
            }
            other => panic!("expected throttled, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn max_elapsed_bounds_the_loop() {
        let policy = RetryPolicy::fixed(Duration::from_secs(5))
            .with_max_elapsed(Duration::from_secs(12));
        let token = CancellationToken::new();
        let attempts = AtomicU32::new(0);

        let result: Result<u32, _> = retry_with_backoff(&policy, &token, |_| {
            attempts.fetch_add(1, Ordering::Relaxed);
            async { RetryAction::Retry(throttled()) }
        })
        .await;

        // Waits at 0s and 5s fit; the third would end at 15s.
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
        assert!(matches!(result, Err(StageError::Throttled { attempts: 3, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let policy = RetryPolicy::default();
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            canceller.cancel();
        });

        let result: Result<u32, _> =
            retry_with_backoff(&policy, &token, |_| async { RetryAction::Retry(throttled()) })
                .await;

        assert!(matches!(result, Err(StageError::Cancelled)));
    }

    #[tokio::test]
    async fn cancelled_token_skips_first_attempt() {
        let policy = RetryPolicy::default();
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<u32, _> =
            retry_with_backoff(&policy, &token, |_| async { RetryAction::Success(1u32) }).await;
        assert!(matches!(result, Err(StageError::Cancelled)));
    }
}
