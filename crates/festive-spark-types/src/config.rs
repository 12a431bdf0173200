use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Type alias for the on_retry callback to reduce complexity.
pub type OnRetryCallback = Arc<dyn Fn(&crate::error::Error, u32, Duration) + Send + Sync>;

/// Caller-side retry policy for failed generations.
///
/// The pipeline itself never retries; callers opt in through `with_retry`.
#[derive(Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (default: 2).
    pub max_retries: u32,
    /// Base delay in seconds before first retry (default: 1.0).
    pub base_delay: f64,
    /// Maximum delay in seconds between retries (default: 60.0).
    pub max_delay: f64,
    /// Multiplier for exponential backoff (default: 2.0).
    pub backoff_multiplier: f64,
    /// Whether to add random jitter to delays (default: true).
    pub jitter: bool,
    /// Called before each retry attempt with (error, attempt_number, delay).
    #[serde(skip)]
    pub on_retry: Option<OnRetryCallback>,
}

impl Clone for RetryPolicy {
    fn clone(&self) -> Self {
        Self {
            max_retries: self.max_retries,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
            on_retry: self.on_retry.clone(),
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("jitter", &self.jitter)
            .field("on_retry", &self.on_retry.as_ref().map(|_| "..."))
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: 1.0,
            max_delay: 60.0,
            backoff_multiplier: 2.0,
            jitter: true,
            on_retry: None,
        }
    }
}

/// Transport-level timeouts for HTTP backends.
///
/// These bound a single HTTP exchange; the pipeline adds no timeout of its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackendTimeout {
    /// Connection timeout in seconds (default: 10.0).
    pub connect: f64,
    /// Request timeout in seconds (default: 120.0).
    pub request: f64,
}

impl Default for BackendTimeout {
    fn default() -> Self {
        Self {
            connect: 10.0,
            request: 120.0,
        }
    }
}
