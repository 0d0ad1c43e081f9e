//! Session behavior configuration.

use std::time::Duration;

/// Retry behavior for requests that fail before a response is received.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each subsequent one.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

/// Configuration for session monitoring and request handling.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Remaining lifetime at which the expiry warning fires.
    pub warning_threshold: Duration,
    /// Remaining lifetime at which the near-expiry hint is set.
    pub near_expiry_threshold: Duration,
    /// How often the monitor re-reads the stored token.
    pub check_interval: Duration,
    /// User inactivity after which the session is considered abandoned.
    pub inactivity_timeout: Duration,
    /// Grace between the inactivity transition and the forced logout.
    pub inactivity_grace: Duration,
    /// Network-error retry behavior.
    pub retry: RetryPolicy,
    /// Per-attempt request timeout.
    pub request_timeout: Duration,
    /// Value of the `X-API-Version` header sent on every request.
    pub api_version: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            warning_threshold: Duration::from_secs(5 * 60),
            near_expiry_threshold: Duration::from_secs(10 * 60),
            check_interval: Duration::from_secs(30),
            inactivity_timeout: Duration::from_secs(30 * 60),
            inactivity_grace: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
            api_version: "1".to_string(),
        }
    }
}
