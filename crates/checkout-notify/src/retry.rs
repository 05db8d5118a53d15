//! Retrying Delivery Channel
//!
//! Bounded-retry sender for the backend notification. Every attempt races
//! the request against a timeout; failed attempts are followed by an
//! exponential pause of `2^(i-1) * base_delay` before attempt `i + 1`.
//!
//! ```text
//! attempt 1 ──✗── 2s ── attempt 2 ──✗── 4s ── attempt 3 ──✗── Exhausted
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use checkout_core::NotifyConfig;
use serde_json::Value;
use tokio::time::{Instant, sleep, timeout};

use crate::error::{DeliveryError, TransportError};
use crate::transport::Transport;

/// Attempt budget and timing for one delivery
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Time allowed for each attempt
    pub per_attempt_timeout: Duration,

    /// Pause after the first failed attempt
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            per_attempt_timeout: Duration::from_millis(20_000),
            base_delay: Duration::from_millis(2_000),
        }
    }
}

impl RetryPolicy {
    pub const fn from_config(config: &NotifyConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            per_attempt_timeout: config.per_attempt_timeout(),
            base_delay: config.base_delay(),
        }
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Pause between failed attempt `attempt` and the next one
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Record of one attempt, kept only for logging
#[derive(Clone, Debug)]
pub struct DeliveryAttempt {
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub timed_out: bool,
    pub http_status: Option<u16>,
}

impl DeliveryAttempt {
    fn start(attempt_number: u32) -> Self {
        Self {
            attempt_number,
            started_at: Utc::now(),
            timed_out: false,
            http_status: None,
        }
    }
}

/// Bounded-retry JSON sender
#[derive(Clone)]
pub struct RetryingChannel {
    transport: Arc<dyn Transport>,
}

impl RetryingChannel {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Deliver `payload`, retrying until it is accepted or the budget runs out
    pub async fn send(
        &self,
        endpoint: &str,
        payload: &Value,
        policy: &RetryPolicy,
    ) -> Result<Value, DeliveryError> {
        if policy.max_attempts == 0 {
            return Err(DeliveryError::InvalidPolicy(
                "max_attempts must be at least 1".into(),
            ));
        }

        let mut attempt_number = 1;
        loop {
            let mut attempt = DeliveryAttempt::start(attempt_number);
            let clock = Instant::now();

            let err = match timeout(
                policy.per_attempt_timeout,
                self.transport.post_json(endpoint, payload),
            )
            .await
            {
                Ok(Ok(delivered)) => {
                    tracing::info!(
                        endpoint,
                        attempt = attempt_number,
                        status = delivered.status,
                        "Delivery accepted"
                    );
                    return Ok(delivered.body);
                }
                Ok(Err(err)) => {
                    attempt.http_status = err.http_status();
                    err
                }
                Err(_) => {
                    attempt.timed_out = true;
                    TransportError::Timeout(policy.per_attempt_timeout)
                }
            };

            tracing::warn!(
                endpoint,
                attempt = attempt.attempt_number,
                max_attempts = policy.max_attempts,
                started_at = %attempt.started_at,
                timed_out = attempt.timed_out,
                http_status = ?attempt.http_status,
                elapsed_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Delivery attempt failed"
            );

            if attempt_number >= policy.max_attempts {
                return Err(DeliveryError::Exhausted {
                    attempts: attempt_number,
                    last: err,
                });
            }

            sleep(policy.backoff_after(attempt_number)).await;
            attempt_number += 1;
        }
    }
}
