//! Retry policies.
//!
//! A [`RetryPolicy`] is consulted by the dispatcher after every failed attempt
//! with the failure's [`FaultKind`] and the 1-based number of the attempt that
//! just failed. It answers with a [`RetryDecision`].
//!
//! Application failures are deterministic business outcomes, so none of the
//! built-in policies retry them unless `retry_application_errors` is set.
//! Retrying a non-idempotent remote operation can execute it more than once.

use chanrpc_common::FaultKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the dispatcher should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Propagate the failure to the caller
    GiveUp,
    /// Run another attempt after waiting for the given delay
    RetryAfter(Duration),
}

/// Decides whether and when a failed call is attempted again.
///
/// Policies are shared between concurrent calls, so implementations must not
/// keep unsynchronized per-call state.
pub trait RetryPolicy: Send + Sync {
    fn should_retry(&self, fault: FaultKind, attempt: u32) -> RetryDecision;
}

fn is_retryable(fault: FaultKind, retry_application_errors: bool) -> bool {
    match fault {
        FaultKind::Communication => true,
        FaultKind::Application => retry_application_errors,
    }
}

/// Never retries. The default policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetryPolicy;

impl RetryPolicy for NoRetryPolicy {
    fn should_retry(&self, _fault: FaultKind, _attempt: u32) -> RetryDecision {
        RetryDecision::GiveUp
    }
}

/// Retries up to `max_retries` times with a constant delay.
#[derive(Debug, Clone)]
pub struct FixedRetryPolicy {
    /// Maximum number of retries (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// Delay before every retry
    pub delay: Duration,
    /// Whether application failures are retried too
    pub retry_application_errors: bool,
}

impl FixedRetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            retry_application_errors: false,
        }
    }

    pub fn retry_application_errors(mut self, enabled: bool) -> Self {
        self.retry_application_errors = enabled;
        self
    }
}

impl RetryPolicy for FixedRetryPolicy {
    fn should_retry(&self, fault: FaultKind, attempt: u32) -> RetryDecision {
        if attempt > self.max_retries || !is_retryable(fault, self.retry_application_errors) {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.delay)
    }
}

/// Configuration for exponential backoff.
///
/// # Default Configuration
///
/// - `max_retries`: 3
/// - `initial_backoff_ms`: 50
/// - `max_backoff_ms`: 5000
/// - `backoff_multiplier`: 2.0
/// - `jitter_factor`: 0.1
/// - `retry_application_errors`: false
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (excluding initial attempt)
    ///
    /// Total attempts = max_retries + 1
    pub max_retries: u32,
    /// Backoff before the first retry, in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound for any single backoff, in milliseconds
    pub max_backoff_ms: u64,
    /// Each retry waits: previous_backoff * multiplier
    pub backoff_multiplier: f64,
    /// Relative jitter applied to each backoff (0.0 - 1.0)
    pub jitter_factor: f64,
    /// Whether application failures are retried too
    pub retry_application_errors: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 5000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            retry_application_errors: false,
        }
    }
}

/// Retries with exponentially growing, jittered delays.
///
/// - Attempt 1 fails: wait `initial_backoff_ms`
/// - Attempt 2 fails: wait `initial_backoff_ms * multiplier`
/// - Attempt n fails: wait `initial_backoff_ms * multiplier^(n-1)`
/// - Every delay is jittered by `±jitter_factor` and capped at `max_backoff_ms`
///
/// # Example
///
/// ```
/// use chanrpc_client::{ExponentialBackoffPolicy, RetryConfig, RetryDecision, RetryPolicy};
/// use chanrpc_common::FaultKind;
/// use std::time::Duration;
///
/// let policy = ExponentialBackoffPolicy::new(RetryConfig {
///     jitter_factor: 0.0,
///     ..RetryConfig::default()
/// });
///
/// assert_eq!(
///     policy.should_retry(FaultKind::Communication, 2),
///     RetryDecision::RetryAfter(Duration::from_millis(100))
/// );
/// assert_eq!(policy.should_retry(FaultKind::Application, 1), RetryDecision::GiveUp);
/// ```
#[derive(Debug, Clone)]
pub struct ExponentialBackoffPolicy {
    config: RetryConfig,
}

impl ExponentialBackoffPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Backoff to apply after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.config.initial_backoff_ms as f64 * self.config.backoff_multiplier.powi(exponent);

        let jitter_factor = self.config.jitter_factor.clamp(0.0, 1.0);
        let jitter = 1.0 + (fastrand::f64() - 0.5) * 2.0 * jitter_factor;

        let capped_ms = (base_ms * jitter).min(self.config.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped_ms as u64)
    }
}

impl Default for ExponentialBackoffPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy for ExponentialBackoffPolicy {
    fn should_retry(&self, fault: FaultKind, attempt: u32) -> RetryDecision {
        if attempt > self.config.max_retries || !is_retryable(fault, self.config.retry_application_errors) {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.backoff_for(attempt))
    }
}
