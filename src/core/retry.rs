//! Bounded retry with exponential backoff for calls to the registry.
//!
//! A [`RetryPolicy`] is built once per logical operation type and shared
//! read-only. [`RetryPolicy::run`] drives an async operation until it
//! succeeds, fails with a non-retryable [`ErrorRecord`], or the attempt or
//! wait budget is exhausted.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::error::ErrorRecord;

/// Retry parameters for one logical operation type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub base_delay: Duration,

    /// Multiplier applied to the delay after every failed attempt.
    pub backoff_factor: f64,

    /// Optional symmetric jitter bound added to each delay.
    pub jitter: Option<Duration>,

    /// Upper bound on the cumulative time spent waiting between attempts.
    pub max_total_wait: Duration,

    /// Upper bound on a single attempt. Elapsing counts as a network error.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            backoff_factor: 1.5,
            jitter: None,
            max_total_wait: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy that runs the operation once, still bounded by the timeout.
    pub fn no_retry(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            attempt_timeout,
            ..Self::default()
        }
    }

    /// Nominal delay after `attempt` failures (1-based), before jitter and caps.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if secs > 0.0 {
            // Too large for a Duration: the total-wait cap applies anyway
            Duration::try_from_secs_f64(secs).unwrap_or(self.max_total_wait)
        } else {
            Duration::ZERO
        }
    }

    /// Worst-case duration of a call under this policy.
    pub fn max_call_duration(&self) -> Duration {
        self.attempt_timeout
            .saturating_mul(self.max_attempts.max(1))
            .saturating_add(self.max_total_wait)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let Some(bound) = self.jitter.filter(|j| !j.is_zero()) else {
            return delay;
        };
        let bound = bound.as_secs_f64();
        let offset = rand::thread_rng().gen_range(-bound..=bound);
        Duration::try_from_secs_f64((delay.as_secs_f64() + offset).max(0.0)).unwrap_or(delay)
    }

    /// Run `op` under this policy.
    ///
    /// `operation` names the call in logs and in the exhaustion message.
    /// Non-retryable failures are returned unchanged on first occurrence.
    /// After the last permitted attempt the failures are folded into one
    /// record whose cause chain lists every attempt, newest first.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, ErrorRecord>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ErrorRecord>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut failures: Vec<ErrorRecord> = Vec::new();
        let mut waited = Duration::ZERO;

        for attempt in 1..=max_attempts {
            let outcome = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ErrorRecord::network(format!(
                    "{} timed out after {:?}",
                    operation, self.attempt_timeout
                ))),
            };

            let err = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                debug!("{} failed with non-retryable error: {}", operation, err);
                return Err(err);
            }

            failures.push(err);

            if attempt == max_attempts {
                break;
            }

            let remaining = self.max_total_wait.saturating_sub(waited);
            let delay = self.jittered(self.delay_for(attempt)).min(remaining);
            if delay.is_zero() && remaining.is_zero() {
                warn!(
                    "{}: retry wait budget of {:?} exhausted after {} attempts",
                    operation, self.max_total_wait, attempt
                );
                break;
            }

            warn!(
                "Attempt {}/{} failed for {}: {}. Retrying in {:?}",
                attempt,
                max_attempts,
                operation,
                failures.last().map(|f| f.message()).unwrap_or_default(),
                delay
            );
            tokio::time::sleep(delay).await;
            waited += delay;
        }

        error!(
            "All {} attempts failed for {}",
            failures.len(),
            operation
        );
        Err(exhausted(operation, failures))
    }
}

/// Fold every attempt's failure into one record.
fn exhausted(operation: &str, failures: Vec<ErrorRecord>) -> ErrorRecord {
    let attempts = failures.len();
    let mut chain: Option<ErrorRecord> = None;
    let mut last = None;

    for (index, failure) in failures.into_iter().enumerate() {
        let mut record = ErrorRecord::new(
            failure.kind(),
            format!("attempt {}: {}", index + 1, failure.message()),
        )
        .with_retryable(failure.is_retryable());
        if let Some(previous) = chain.take() {
            record = record.with_cause(previous);
        }
        last = Some((failure.kind(), failure.message().to_string()));
        chain = Some(record);
    }

    let (kind, message) =
        last.unwrap_or((super::error::ErrorKind::Internal, "no attempt was made".to_string()));
    let summary = ErrorRecord::new(
        kind,
        format!(
            "{} failed after {} attempt{}: {}",
            operation,
            attempts,
            if attempts == 1 { "" } else { "s" },
            message
        ),
    )
    .with_retryable(false);

    match chain {
        Some(chain) => summary.with_cause(chain),
        None => summary,
    }
}

/// Retry policies per logical operation type, fixed for the process run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicies {
    /// Entity searches (single and bulk).
    pub search: RetryPolicy,

    /// Full report downloads.
    pub report: RetryPolicy,

    /// Service, data and session status lookups.
    pub status: RetryPolicy,

    /// Health probes. Kept short so `/health` answers promptly.
    pub health: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            search: RetryPolicy::default(),
            report: RetryPolicy::default(),
            status: RetryPolicy::default(),
            health: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(500),
                backoff_factor: 2.0,
                jitter: None,
                max_total_wait: Duration::from_secs(2),
                attempt_timeout: Duration::from_secs(10),
            },
        }
    }
}
