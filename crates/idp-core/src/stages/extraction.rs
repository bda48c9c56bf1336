use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::{NotificationError, PipelineError, Result};
use crate::extract::FieldExtractor;
use crate::models::events::StorageEvent;
use crate::models::invoice::{ExtractionRecord, InvoiceId};
use crate::transport::{Envelope, MessagePublisher, OutboundMessage, Subscriber};

/// Subject attached to published extraction records.
pub const INVOICE_PROCESSED_SUBJECT: &str = "Invoice Processed";

/// Turns a storage-creation event into one published extraction record.
pub struct ExtractionStage {
    extractor: Arc<dyn FieldExtractor>,
    publisher: Arc<dyn MessagePublisher>,
    topic: String,
}

impl ExtractionStage {
    pub fn new(
        extractor: Arc<dyn FieldExtractor>,
        publisher: Arc<dyn MessagePublisher>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            extractor,
            publisher,
            topic: topic.into(),
        }
    }

    /// Extract the stored document and publish the record.
    ///
    /// Publishes exactly once on success and never on failure. Re-running
    /// on the same event yields a record with the same invoice id.
    pub async fn on_document_stored(&self, event: &StorageEvent) -> Result<ExtractionRecord> {
        info!("Processing file: {} from bucket: {}", event.key, event.bucket);

        let invoice_id = InvoiceId::from_storage_key(&event.key)?;
        let fields = self.extractor.extract(&event.document()).await?;
        let record = ExtractionRecord::new(invoice_id, event.bucket.clone(), fields);

        let body = record.to_message_body().map_err(NotificationError::from)?;
        let message =
            OutboundMessage::new(&self.topic, body).with_subject(INVOICE_PROCESSED_SUBJECT);
        let message_id = self.publisher.publish(message).await?;

        info!(
            "Published invoice {} ({}, {}, {}) as {}",
            record.invoice_id,
            record.vendor,
            record.total,
            record.extraction_mode.as_str(),
            message_id
        );
        Ok(record)
    }
}

#[async_trait]
impl Subscriber for ExtractionStage {
    fn name(&self) -> &str {
        "extraction"
    }

    async fn deliver(&self, envelope: &Envelope) -> std::result::Result<(), PipelineError> {
        let event = StorageEvent::from_json(&envelope.body)?;
        self.on_document_stored(&event).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::extract::{HIGH_VENDOR, SimulatedExtractor};
    use crate::models::invoice::ExtractionMode;
    use crate::storage::{InMemoryObjectStore, ObjectStore};
    use crate::transport::RecordingPublisher;
    use rust_decimal::Decimal;

    async fn stage_with(
        keys: &[&str],
    ) -> (ExtractionStage, Arc<RecordingPublisher>) {
        let store = Arc::new(InMemoryObjectStore::new("invoices"));
        for key in keys {
            store.put_object(key, b"scan".to_vec(), "image/jpeg").await.unwrap();
        }
        let extractor = Arc::new(SimulatedExtractor::new(
            store,
            Decimal::new(1000, 2),
            Decimal::new(120000, 2),
            Some(11),
        ));
        let publisher = Arc::new(RecordingPublisher::new());
        (
            ExtractionStage::new(extractor, publisher.clone(), "invoice-events"),
            publisher,
        )
    }

    #[tokio::test]
    async fn test_publishes_one_record() {
        let (stage, publisher) = stage_with(&["high-invoice.pdf"]).await;

        let record = stage
            .on_document_stored(&StorageEvent::new("invoices", "high-invoice.pdf"))
            .await
            .unwrap();

        assert_eq!(record.invoice_id.as_str(), "high-invoice.pdf");
        assert_eq!(record.vendor, HIGH_VENDOR);
        assert_eq!(record.total, Decimal::new(150000, 2));
        assert_eq!(record.extraction_mode, ExtractionMode::Simulated);

        let messages = publisher.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "invoice-events");
        assert_eq!(messages[0].subject.as_deref(), Some(INVOICE_PROCESSED_SUBJECT));
        assert_eq!(ExtractionRecord::from_message_body(&messages[0].body).unwrap(), record);
    }

    #[tokio::test]
    async fn test_redelivery_keeps_identity() {
        let (stage, publisher) = stage_with(&["7f3c-scan.jpg"]).await;
        let event = StorageEvent::new("invoices", "7f3c-scan.jpg");

        let first = stage.on_document_stored(&event).await.unwrap();
        let second = stage.on_document_stored(&event).await.unwrap();

        assert_eq!(first.invoice_id, second.invoice_id);
        assert_eq!(publisher.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_document_publishes_nothing() {
        let (stage, publisher) = stage_with(&[]).await;

        let err = stage
            .on_document_stored(&StorageEvent::new("invoices", "gone.pdf"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ExtractionUnavailable);
        assert!(err.is_retryable());
        assert!(publisher.messages().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_is_propagated() {
        let (stage, publisher) = stage_with(&["low-receipt.pdf"]).await;
        publisher.fail_next(1);

        let err = stage
            .on_document_stored(&StorageEvent::new("invoices", "low-receipt.pdf"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Notification);
    }
}
