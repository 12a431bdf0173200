// Caller-side retry: exponential backoff with jitter around any fallible
// async operation, typically a whole `Pipeline::generate` call.

use std::future::Future;
use std::time::Duration;

use festive_spark_types::{Error, RetryPolicy};
use rand::Rng;

/// Run `operation`, retrying retryable failures according to `policy`.
///
/// - Errors with `retryable == false` (invalid input, auth failures, aborts)
///   are returned at once.
/// - A `retry_after` hint longer than `policy.max_delay` is returned at once
///   rather than slept through.
/// - Otherwise the delay is `base_delay * backoff_multiplier^attempt`, capped
///   at `max_delay`, optionally scaled by a random factor in `[0.5, 1.5]`.
///
/// `policy.on_retry` sees `(error, attempt, delay)` before each sleep.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 0;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let hint_too_long = err
            .retry_after
            .is_some_and(|hint| hint.as_secs_f64() > policy.max_delay);
        if !err.retryable || hint_too_long || attempt >= policy.max_retries {
            return Err(err);
        }

        let delay = calculate_delay(policy, attempt, err.retry_after);
        tracing::debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying after failure"
        );
        if let Some(callback) = &policy.on_retry {
            callback(&err, attempt, delay);
        }
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Delay before retry number `attempt` (zero-based).
pub(crate) fn calculate_delay(
    policy: &RetryPolicy,
    attempt: u32,
    retry_after: Option<Duration>,
) -> Duration {
    if let Some(hint) = retry_after {
        return hint;
    }

    let mut secs = (policy.base_delay * policy.backoff_multiplier.powi(attempt as i32))
        .min(policy.max_delay);
    if policy.jitter {
        secs *= rand::thread_rng().gen_range(0.5..=1.5);
    }
    // Jitter may push past the cap.
    Duration::from_secs_f64(secs.min(policy.max_delay).max(0.0))
}
