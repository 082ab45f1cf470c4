//! Retry helper with exponential backoff and jitter
//!
//! Used two ways: [`RetryHelper::execute`] runs an operation until it succeeds
//! or the attempt budget is spent (register writes), while
//! [`RetryHelper::record_failure`] / [`RetryHelper::is_due`] pace attempts that
//! are spread over poll cycles (device reconnects).

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

/// Growth stops here; the delay is capped at `max_delay` long before
const MAX_BACKOFF_EXPONENT: u32 = 32;

/// Retry error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetryError<E: std::fmt::Display> {
    /// Every attempt failed; carries the last error
    #[error("Failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum attempts (0 means unlimited)
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
    /// Backoff multiplier for exponential delay
    pub backoff_multiplier: f64,
    /// Whether to add ±25% jitter to delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// Reconnect pacing: unlimited attempts, 1 s doubling up to 60 s
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// `attempts` tries back to back, no delay
    pub fn immediate(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Create from configuration values
    pub fn from_config(
        max_attempts: u32,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            backoff_multiplier,
            jitter: true,
        }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts > 0 && attempts >= self.max_attempts
    }
}

/// Attempt statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetryStats {
    pub total_attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Retry helper tracking consecutive failures
#[derive(Debug)]
pub struct RetryHelper {
    policy: RetryPolicy,
    /// Consecutive failed attempts
    failures: u32,
    next_attempt: Option<Instant>,
    stats: RetryStats,
}

impl RetryHelper {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            next_attempt: None,
            stats: RetryStats::default(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn stats(&self) -> &RetryStats {
        &self.stats
    }

    /// Consecutive failures since the last success
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Delay to wait after the current number of consecutive failures
    pub fn calculate_next_delay(&self) -> Duration {
        let exponent = self.failures.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let max_secs = self.policy.max_delay.as_secs_f64();
        let secs = self.policy.initial_delay.as_secs_f64()
            * self.policy.backoff_multiplier.powi(exponent as i32);
        let mut delay = if secs.is_finite() && secs < max_secs {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            self.policy.max_delay
        };

        if self.policy.jitter {
            let jitter_range = delay.as_millis() as f64 * 0.25;
            if jitter_range > 0.0 {
                let jitter = rand::thread_rng().gen_range(-jitter_range..jitter_range);
                let delay_ms = (delay.as_millis() as f64 + jitter).max(0.0);
                delay = Duration::from_millis(delay_ms as u64);
            }
        }

        delay
    }

    pub fn record_success(&mut self) {
        self.stats.total_attempts += 1;
        self.stats.successes += 1;
        self.failures = 0;
        self.next_attempt = None;
    }

    /// Count a failure and schedule the next attempt; returns the delay
    pub fn record_failure(&mut self) -> Duration {
        self.stats.total_attempts += 1;
        self.stats.failures += 1;
        self.failures = self.failures.saturating_add(1);
        let delay = self.calculate_next_delay();
        self.next_attempt = Some(Instant::now() + delay);
        delay
    }

    /// Whether a paced attempt may run now
    pub fn is_due(&self, now: Instant) -> bool {
        if self.policy.exhausted(self.failures) {
            return false;
        }
        self.next_attempt.map_or(true, |at| now >= at)
    }

    /// Run `op` until it succeeds or the policy's attempts are used up
    pub async fn execute<F, Fut, T, E>(&mut self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.failures = 0;
        loop {
            match op().await {
                Ok(value) => {
                    if self.failures > 0 {
                        debug!("Succeeded on attempt {}", self.failures + 1);
                    }
                    self.record_success();
                    return Ok(value);
                },
                Err(err) => {
                    let delay = self.record_failure();
                    warn!(
                        "Attempt {}/{} failed: {}",
                        self.failures,
                        if self.policy.max_attempts == 0 {
                            "∞".to_string()
                        } else {
                            self.policy.max_attempts.to_string()
                        },
                        err
                    );

                    if self.policy.exhausted(self.failures) {
                        let attempts = self.failures;
                        self.failures = 0;
                        self.next_attempt = None;
                        return Err(RetryError::Exhausted {
                            attempts,
                            last: err,
                        });
                    }

                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                },
            }
        }
    }
}
