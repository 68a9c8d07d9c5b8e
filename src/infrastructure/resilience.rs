//! Resilience patterns for external API calls

use crate::application::errors::{ApiError, VulnerabilityError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Retry configuration for exponential backoff
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first call included
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Default backoff with a custom attempt budget; zero is treated as one
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }
}

/// Execute a function with exponential backoff retry logic
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, VulnerabilityError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, VulnerabilityError>>,
{
    let mut attempts = 0;
    let mut delay = config.initial_delay;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if attempts >= config.max_attempts || !is_retryable_error(&error) {
                    return Err(error);
                }

                warn!(
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying request after failure"
                );
                tokio::time::sleep(delay).await;

                delay = std::cmp::min(
                    Duration::from_millis(
                        (delay.as_millis() as f64 * config.backoff_multiplier) as u64,
                    ),
                    config.max_delay,
                );
            }
        }
    }
}

/// Check if an error is retryable: network failures, timeouts, 429 and 5xx
pub fn is_retryable_error(error: &VulnerabilityError) -> bool {
    match error {
        VulnerabilityError::Network(_) => true,
        VulnerabilityError::Timeout { .. } => true,
        VulnerabilityError::RateLimit { .. } => true,
        VulnerabilityError::Api(ApiError::Http { status, .. }) => *status >= 500 || *status == 429,
        _ => false,
    }
}

/// Spaces out requests so that at most `requests` start in any `window`.
///
/// Shared by every worker through an `Arc`; each caller reserves the next free
/// slot under the lock and sleeps outside it.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(requests: u32, window: Duration) -> Self {
        let interval = if requests == 0 {
            Duration::ZERO
        } else {
            window / requests
        };
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until this caller may issue its request
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }

        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next_slot {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next_slot = Some(slot + self.interval);
            slot
        };

        if slot > Instant::now() {
            debug!(wait_ms = (slot - Instant::now()).as_millis() as u64, "Rate limited");
            tokio::time::sleep_until(slot).await;
        }
    }
}
