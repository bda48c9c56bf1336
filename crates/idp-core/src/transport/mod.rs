//! Publish/subscribe transport.
//!
//! Publishers hand a message to a topic and return. Subscribers receive
//! their own copy of every message, possibly more than once, and signal
//! failure through [`PipelineError`] so the transport can retry.

mod fanout;
mod outbox;
mod recording;
mod retry;

pub use fanout::FanoutTopic;
pub use outbox::OutboxPublisher;
pub use recording::RecordingPublisher;
pub use retry::{DeadLetter, DeliveryOutcome, DeliveryReport, RetryPolicy, deliver_with_retry};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{NotificationError, PipelineError};

/// Identifier assigned to a message when it is published.
pub type MessageId = String;

/// A message handed to a publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            subject: None,
            body: body.into(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// A message as seen by one subscriber on one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub message_id: MessageId,
    pub topic: String,
    pub subject: Option<String>,
    pub body: String,
    /// 1-based delivery attempt.
    pub attempt: u32,
}

/// Sends messages to a topic.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish one message. Returns once the transport has accepted it.
    async fn publish(&self, message: OutboundMessage) -> Result<MessageId, NotificationError>;
}

/// Receives messages from a topic.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Name used in logs and delivery reports.
    fn name(&self) -> &str;

    /// Handle one delivery. Errors are classified by their kind tag.
    async fn deliver(&self, envelope: &Envelope) -> Result<(), PipelineError>;
}
