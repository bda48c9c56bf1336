//! In-process fan-out topic.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info_span};

use super::{
    DeadLetter, DeliveryOutcome, DeliveryReport, Envelope, MessageId, MessagePublisher,
    OutboundMessage, RetryPolicy, Subscriber, deliver_with_retry,
};
use crate::error::NotificationError;

/// A topic that hands every published message to each subscriber
/// independently.
///
/// Each subscriber gets its own copy and its own retry loop, running as a
/// separate task. No ordering holds between subscribers, and one
/// subscriber's failure never affects another's delivery.
pub struct FanoutTopic {
    name: String,
    policy: RetryPolicy,
    subscribers: Vec<Arc<dyn Subscriber>>,
    in_flight: Mutex<JoinSet<()>>,
    reports: Arc<Mutex<Vec<DeliveryReport>>>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
}

impl FanoutTopic {
    pub fn new(name: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            subscribers: Vec::new(),
            in_flight: Mutex::new(JoinSet::new()),
            reports: Arc::new(Mutex::new(Vec::new())),
            dead_letters: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Attach a subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Wait for every delivery started so far, returning the reports
    /// collected since the previous call.
    pub async fn settle(&self) -> Vec<DeliveryReport> {
        let mut pending = {
            let mut guard = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        while pending.join_next().await.is_some() {}

        let mut reports = self.reports.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *reports)
    }

    /// Every delivery this topic has given up on.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MessagePublisher for FanoutTopic {
    async fn publish(&self, message: OutboundMessage) -> Result<MessageId, NotificationError> {
        if message.topic != self.name {
            return Err(NotificationError::UnknownTopic(message.topic));
        }

        let message_id = uuid::Uuid::new_v4().to_string();
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);

        // Drop finished task handles; their reports are already recorded.
        while in_flight.try_join_next().is_some() {}

        for subscriber in &self.subscribers {
            let envelope = Envelope {
                message_id: message_id.clone(),
                topic: message.topic.clone(),
                subject: message.subject.clone(),
                body: message.body.clone(),
                attempt: 0,
            };
            let span = info_span!(
                "delivery",
                topic = %self.name,
                subscriber = %subscriber.name(),
                message_id = %message_id
            );
            let subscriber = Arc::clone(subscriber);
            let policy = self.policy.clone();
            let reports = Arc::clone(&self.reports);
            let dead_letters = Arc::clone(&self.dead_letters);

            in_flight.spawn(
                async move {
                    let report = deliver_with_retry(subscriber.as_ref(), envelope, &policy).await;
                    if let DeliveryOutcome::DeadLettered(dead) = &report.outcome {
                        dead_letters
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(dead.clone());
                    }
                    reports
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(report);
                }
                .instrument(span),
            );
        }

        debug!(
            "Published {} to {} ({} subscribers)",
            message_id,
            self.name,
            self.subscribers.len()
        );
        Ok(message_id)
    }
}
