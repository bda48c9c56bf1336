use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{MessageId, MessagePublisher, OutboundMessage};
use crate::error::NotificationError;

/// Publisher that keeps every accepted message in memory.
///
/// Can be told to reject the next N publishes.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<OutboundMessage>>,
    failures_left: AtomicU32,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` publishes.
    pub fn fail_next(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Messages accepted so far.
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(&self, message: OutboundMessage) -> Result<MessageId, NotificationError> {
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(NotificationError::Rejected(format!(
                "{} unavailable",
                message.topic
            )));
        }

        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        messages.push(message);
        Ok(format!("msg-{}", messages.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fail_next() {
        let publisher = RecordingPublisher::new();
        publisher.fail_next(1);

        assert!(publisher.publish(OutboundMessage::new("alerts", "a")).await.is_err());
        assert!(publisher.publish(OutboundMessage::new("alerts", "b")).await.is_ok());

        let messages = publisher.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body, "b");
    }
}
