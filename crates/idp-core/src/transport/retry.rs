//! At-least-once delivery with bounded retries.

use std::time::Duration;

use tracing::{debug, error, warn};

use super::{Envelope, MessageId, Subscriber};
use crate::error::ErrorKind;
use crate::models::config::DeliveryConfig;

/// How many times, and how patiently, a delivery is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first; at least 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Retry without waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Backoff before attempt `attempt + 1`, doubling per attempt up to the cap.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&DeliveryConfig::default())
    }
}

impl From<&DeliveryConfig> for RetryPolicy {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// A delivery that exhausted its attempts or failed permanently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub subscriber: String,
    pub message_id: MessageId,
    pub topic: String,
    pub body: String,
    pub kind: ErrorKind,
    pub error: String,
    pub attempts: u32,
}

/// Final state of one (message, subscriber) delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    DeadLettered(DeadLetter),
}

/// Result of delivering one message to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub subscriber: String,
    pub message_id: MessageId,
    pub attempts: u32,
    pub outcome: DeliveryOutcome,
}

impl DeliveryReport {
    pub fn is_delivered(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Delivered)
    }
}

/// Deliver `envelope` to `subscriber`, retrying retryable failures.
///
/// `InvalidRequest` failures are dead-lettered on the first attempt.
pub async fn deliver_with_retry(
    subscriber: &dyn Subscriber,
    mut envelope: Envelope,
    policy: &RetryPolicy,
) -> DeliveryReport {
    let mut attempt = 1;

    loop {
        envelope.attempt = attempt;

        match subscriber.deliver(&envelope).await {
            Ok(()) => {
                debug!(
                    "{} handled message {} on attempt {}",
                    subscriber.name(),
                    envelope.message_id,
                    attempt
                );
                return DeliveryReport {
                    subscriber: subscriber.name().to_string(),
                    message_id: envelope.message_id,
                    attempts: attempt,
                    outcome: DeliveryOutcome::Delivered,
                };
            }
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let backoff = policy.backoff_after(attempt);
                warn!(
                    "{} failed message {} (attempt {}/{}, {}): {}; retrying in {:?}",
                    subscriber.name(),
                    envelope.message_id,
                    attempt,
                    policy.max_attempts,
                    e.kind(),
                    e,
                    backoff
                );
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
                attempt += 1;
            }
            Err(e) => {
                error!(
                    "{} gave up on message {} after {} attempt(s) ({}): {}",
                    subscriber.name(),
                    envelope.message_id,
                    attempt,
                    e.kind(),
                    e
                );
                let dead = DeadLetter {
                    subscriber: subscriber.name().to_string(),
                    message_id: envelope.message_id.clone(),
                    topic: envelope.topic,
                    body: envelope.body,
                    kind: e.kind(),
                    error: e.to_string(),
                    attempts: attempt,
                };
                return DeliveryReport {
                    subscriber: dead.subscriber.clone(),
                    message_id: envelope.message_id,
                    attempts: attempt,
                    outcome: DeliveryOutcome::DeadLettered(dead),
                };
            }
        }
    }
}
