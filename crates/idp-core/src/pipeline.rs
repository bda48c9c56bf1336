//! Pipeline assembly.
//!
//! Wires the three stages onto two in-process fan-out topics:
//!
//! ```text
//! storage-events --> extraction --> invoice-events --+--> persistence
//!                                                    +--> validation --> alerts
//! ```
//!
//! Every client is constructed by the caller and injected here.

use std::sync::Arc;

use tracing::info;

use crate::error::{NotificationError, Result};
use crate::extract::{FieldExtractor, build_extractor};
use crate::models::config::IdpConfig;
use crate::models::events::StorageEvent;
use crate::stages::{ExtractionStage, PersistenceStage, ThresholdPolicy, ValidationStage};
use crate::storage::{ObjectStore, RecordStore};
use crate::transport::{
    DeadLetter, DeliveryReport, FanoutTopic, MessageId, MessagePublisher, OutboundMessage,
    RetryPolicy,
};

/// The assembled invoice pipeline.
pub struct Pipeline {
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    storage_events: Arc<FanoutTopic>,
    invoice_events: Arc<FanoutTopic>,
}

impl Pipeline {
    /// Assemble the pipeline with the extractor selected by `config`.
    pub fn new(
        config: &IdpConfig,
        objects: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
        alerts: Arc<dyn MessagePublisher>,
    ) -> Self {
        let extractor = build_extractor(&config.extraction, Arc::clone(&objects));
        Self::with_extractor(config, objects, records, alerts, extractor)
    }

    /// Assemble the pipeline around an explicit extractor.
    pub fn with_extractor(
        config: &IdpConfig,
        objects: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
        alerts: Arc<dyn MessagePublisher>,
        extractor: Arc<dyn FieldExtractor>,
    ) -> Self {
        let policy = RetryPolicy::from(&config.delivery);

        let invoice_events = Arc::new(
            FanoutTopic::new(&config.topics.invoice_events, policy.clone())
                .with_subscriber(Arc::new(PersistenceStage::new(Arc::clone(&records))))
                .with_subscriber(Arc::new(ValidationStage::new(
                    ThresholdPolicy::new(config.validation.threshold),
                    alerts,
                    &config.topics.alerts,
                ))),
        );

        let extraction = ExtractionStage::new(
            extractor,
            Arc::clone(&invoice_events) as Arc<dyn MessagePublisher>,
            &config.topics.invoice_events,
        );
        let storage_events = Arc::new(
            FanoutTopic::new(&config.topics.storage_events, policy)
                .with_subscriber(Arc::new(extraction)),
        );

        info!(
            "Pipeline ready: {} -> {} -> {} (threshold {})",
            config.topics.storage_events,
            config.topics.invoice_events,
            config.topics.alerts,
            config.validation.threshold
        );

        Self {
            objects,
            records,
            storage_events,
            invoice_events,
        }
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    /// Emit the storage-creation notification for `key`.
    pub async fn document_stored(&self, key: &str) -> Result<MessageId> {
        let event = StorageEvent::new(self.objects.bucket(), key);
        let body = serde_json::to_string(&event).map_err(NotificationError::from)?;

        let message_id = self
            .storage_events
            .publish(OutboundMessage::new(self.storage_events.name(), body))
            .await?;
        Ok(message_id)
    }

    /// Store a document and notify the pipeline.
    pub async fn ingest(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<MessageId> {
        self.objects.put_object(key, body, content_type).await?;
        self.document_stored(key).await
    }

    /// Wait until every delivery triggered so far has finished.
    ///
    /// Storage events settle first, so records they publish are in flight
    /// before the invoice-events topic is awaited.
    pub async fn settle(&self) -> Vec<DeliveryReport> {
        let mut reports = self.storage_events.settle().await;
        reports.extend(self.invoice_events.settle().await);
        reports
    }

    /// Deliveries either topic gave up on.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        let mut dead = self.storage_events.dead_letters();
        dead.extend(self.invoice_events.dead_letters());
        dead
    }
}
