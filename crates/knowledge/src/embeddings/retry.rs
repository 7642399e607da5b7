//! Exponential backoff for rate-limited provider calls.

use docchat_core::{AppError, AppResult};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Decides whether an error is a rate-limit signal worth retrying.
pub type RetryClassifier = fn(&AppError) -> bool;

/// Retry schedule shared by every provider call.
///
/// Only errors accepted by `classifier` are retried. The delay before retry
/// `n` (starting at 0) is `base_delay * factor^n`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    pub classifier: RetryClassifier,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            factor: 2,
            max_delay: Duration::from_secs(60),
            classifier: is_rate_limited,
        }
    }
}

/// Error from a retried operation and how many calls were made.
#[derive(Debug)]
pub struct RetryFailure {
    pub error: AppError,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.saturating_pow(attempt);
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }

    pub fn should_retry(&self, error: &AppError) -> bool {
        (self.classifier)(error)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// runs out of retries or `cancel` fires. Success carries the number of
    /// calls made.
    ///
    /// Exhausted retries surface as [`AppError::RateLimitExhausted`];
    /// cancellation as [`AppError::Cancelled`].
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<(T, u32), RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryFailure {
                    error: AppError::Cancelled,
                    attempts: attempt,
                });
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(AppError::Cancelled),
                result = operation() => result,
            };

            let error = match result {
                Ok(value) => return Ok((value, attempt + 1)),
                Err(error) => error,
            };

            let attempts = attempt + 1;
            if matches!(error, AppError::Cancelled) || !self.should_retry(&error) {
                return Err(RetryFailure { error, attempts });
            }

            if attempt >= self.max_retries {
                tracing::warn!("Giving up after {} attempts: {}", attempts, error);
                return Err(RetryFailure {
                    error: AppError::RateLimitExhausted {
                        attempts,
                        message: error.to_string(),
                    },
                    attempts,
                });
            }

            let delay = self.delay_for(attempt);
            tracing::warn!(
                "Rate limited (attempt {}/{}), retrying in {}ms",
                attempts,
                self.max_retries + 1,
                delay.as_millis()
            );

            if let Err(error) = sleep_or_cancel(delay, cancel).await {
                return Err(RetryFailure { error, attempts });
            }
            attempt += 1;
        }
    }
}

/// Default classifier: an explicit rate-limit error, or a provider message
/// that looks like one.
pub fn is_rate_limited(error: &AppError) -> bool {
    if error.is_rate_limit() {
        return true;
    }
    let message = error.to_string().to_lowercase();
    message.contains("429") || message.contains("exhausted") || message.contains("rate limit")
}

/// Sleep for `delay` unless `cancel` fires first.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> AppResult<()> {
    if delay.is_zero() {
        return if cancel.is_cancelled() {
            Err(AppError::Cancelled)
        } else {
            Ok(())
        };
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(5),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn test_classifier() {
        assert!(is_rate_limited(&AppError::RateLimited("slow down".into())));
        assert!(is_rate_limited(&AppError::Llm("HTTP 429 Too Many Requests".into())));
        assert!(is_rate_limited(&AppError::Llm("Resource has been exhausted".into())));
        assert!(is_rate_limited(&AppError::Other("Rate limit reached".into())));
        assert!(!is_rate_limited(&AppError::Llm("connection refused".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let result = policy(5)
            .run(&cancel, move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AppError::RateLimited("429".into()))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), ("done", 3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let cancel = CancellationToken::new();

        let failure = policy(2)
            .run(&cancel, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AppError::RateLimited("quota".into()))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(failure.attempts, 3);
        assert!(matches!(
            failure.error,
            AppError::RateLimitExhausted { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_non_retryable_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let cancel = CancellationToken::new();

        let failure = policy(5)
            .run(&cancel, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AppError::Llm("bad request".into()))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(failure.error, AppError::Llm(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let failure = policy(5)
            .run(&cancel, || async {
                Err::<(), _>(AppError::RateLimited("429".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(failure.error, AppError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let failure = policy(5)
            .run(&cancel, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(failure.error, AppError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
