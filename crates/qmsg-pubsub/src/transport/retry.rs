//! Bounded retry around transport calls.
//!
//! Per call: attempt -> success | transient error (attempts left: try again)
//! | transient error (budget spent: re-raise as-is) | permanent error (wrap,
//! no retry). Attempts run strictly one after another.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use bytes::Bytes;

use qmsg_core::error::{QmsgError, Result, TransportError};
use qmsg_core::protocol::Attributes;

use super::{Delivery, RawMessage, Transport};
use crate::config::RetrySection;

/// Attempt budget and delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// First delay; zero retries immediately.
    pub backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::ZERO,
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl From<&RetrySection> for RetryPolicy {
    fn from(section: &RetrySection) -> Self {
        Self {
            max_attempts: section.max_attempts,
            backoff: Duration::from_millis(section.backoff_ms),
            max_backoff: Duration::from_millis(section.max_backoff_ms),
            multiplier: section.multiplier,
        }
    }
}

/// Delay schedule for one retried call. No jitter and no elapsed-time limit:
/// the attempt budget alone ends the loop.
pub fn build_backoff(policy: &RetryPolicy) -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: policy.backoff,
        initial_interval: policy.backoff,
        max_interval: policy.max_backoff.max(policy.backoff),
        randomization_factor: 0.0,
        multiplier: policy.multiplier.max(1.0),
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent. The last error is returned unchanged.
pub async fn retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    op_name: &'static str,
    is_retryable: P,
    mut op: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut schedule = build_backoff(policy);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if is_retryable(&e) && attempt < max_attempts => {
                let delay = schedule.next_backoff().unwrap_or(policy.max_backoff);
                tracing::warn!(
                    op = op_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                attempt += 1;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Transport bound to one topic/subscription pair, with the retry policy
/// applied to every call.
#[derive(Clone)]
pub struct RetryingClient {
    transport: Arc<dyn Transport>,
    topic: String,
    subscription: String,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        topic: impl Into<String>,
        subscription: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            topic: topic.into(),
            subscription: subscription.into(),
            policy,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn publish(&self, payload: Bytes, attributes: &Attributes) -> Result<String> {
        let res = retry(&self.policy, "publish", TransportError::is_transient, || {
            self.transport
                .publish(&self.topic, payload.clone(), attributes)
        })
        .await;
        classify(res, "error while sending a message")
    }

    pub async fn pull(&self) -> Result<Option<RawMessage>> {
        let res = retry(&self.policy, "pull", TransportError::is_transient, || {
            self.transport.pull(&self.subscription)
        })
        .await;
        classify(res, "error while pulling a message")
    }

    pub async fn acknowledge(&self, ack_id: &str) -> Result<()> {
        let res = retry(&self.policy, "acknowledge", TransportError::is_transient, || {
            self.transport.acknowledge(&self.subscription, ack_id)
        })
        .await;
        classify(res, "error while acknowledging a message")
    }

    pub async fn subscribe(&self) -> Result<Delivery> {
        let res = retry(&self.policy, "subscribe", TransportError::is_transient, || {
            self.transport.subscribe(&self.subscription)
        })
        .await;
        classify(res, "error while subscribing")
    }
}

impl std::fmt::Debug for RetryingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingClient")
            .field("topic", &self.topic)
            .field("subscription", &self.subscription)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Exhausted transient errors pass through unchanged; permanent ones become
/// `QmsgError::Client`.
fn classify<T>(res: std::result::Result<T, TransportError>, message: &str) -> Result<T> {
    res.map_err(|e| {
        if e.is_transient() {
            QmsgError::Transport(e)
        } else {
            QmsgError::Client {
                message: message.to_owned(),
                source: e,
            }
        }
    })
}
