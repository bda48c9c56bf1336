use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use super::{MessageId, MessagePublisher, OutboundMessage};
use crate::error::NotificationError;

/// Publisher appending each message as one JSON line to a file.
///
/// Stands in for a human-facing channel (mail, chat) when running locally.
#[derive(Debug)]
pub struct OutboxPublisher {
    topic: String,
    path: PathBuf,
    write_lock: Mutex<()>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboxLine<'a> {
    message_id: &'a str,
    published_at: String,
    #[serde(flatten)]
    message: &'a OutboundMessage,
}

impl OutboxPublisher {
    pub fn new(topic: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            topic: topic.into(),
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl MessagePublisher for OutboxPublisher {
    async fn publish(&self, message: OutboundMessage) -> Result<MessageId, NotificationError> {
        if message.topic != self.topic {
            return Err(NotificationError::UnknownTopic(message.topic));
        }

        let message_id = uuid::Uuid::new_v4().to_string();
        let mut line = serde_json::to_string(&OutboxLine {
            message_id: &message_id,
            published_at: Utc::now().to_rfc3339(),
            message: &message,
        })?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        info!(
            "Notification {} written to {}: {}",
            message_id,
            self.path.display(),
            message.subject.as_deref().unwrap_or("(no subject)")
        );
        Ok(message_id)
    }
}
