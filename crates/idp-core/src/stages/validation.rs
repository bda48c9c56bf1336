use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::invoice::{AlertEvent, ExtractionRecord};
use crate::transport::{Envelope, MessagePublisher, OutboundMessage, Subscriber};

/// Alert policy: a record alerts when its total is strictly greater than
/// the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    pub threshold: Decimal,
}

impl ThresholdPolicy {
    pub fn new(threshold: Decimal) -> Self {
        Self { threshold }
    }

    pub fn evaluate(&self, record: &ExtractionRecord) -> Option<AlertEvent> {
        if record.total > self.threshold {
            Some(AlertEvent {
                invoice_id: record.invoice_id.clone(),
                vendor: record.vendor.clone(),
                total: record.total,
                threshold: self.threshold,
            })
        } else {
            None
        }
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::new(Decimal::new(100000, 2))
    }
}

/// Applies the threshold policy and sends alerts.
pub struct ValidationStage {
    policy: ThresholdPolicy,
    publisher: Arc<dyn MessagePublisher>,
    alerts_topic: String,
}

impl ValidationStage {
    pub fn new(
        policy: ThresholdPolicy,
        publisher: Arc<dyn MessagePublisher>,
        alerts_topic: impl Into<String>,
    ) -> Self {
        Self {
            policy,
            publisher,
            alerts_topic: alerts_topic.into(),
        }
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    /// Evaluate `record` and publish at most one alert for it.
    ///
    /// Returns the alert that was sent, if any. A redelivered record may
    /// alert again.
    pub async fn on_extraction_record(
        &self,
        record: &ExtractionRecord,
    ) -> Result<Option<AlertEvent>> {
        let Some(alert) = self.policy.evaluate(record) else {
            debug!(
                "Invoice {} total {} within threshold {}",
                record.invoice_id, record.total, self.policy.threshold
            );
            return Ok(None);
        };

        info!(
            "High value invoice detected: {} ({} > {})",
            alert.invoice_id, alert.total, alert.threshold
        );

        let message =
            OutboundMessage::new(&self.alerts_topic, alert.body()).with_subject(alert.subject());
        self.publisher.publish(message).await?;

        info!("Alert sent for invoice {}", alert.invoice_id);
        Ok(Some(alert))
    }
}

#[async_trait]
impl Subscriber for ValidationStage {
    fn name(&self) -> &str {
        "validation"
    }

    async fn deliver(&self, envelope: &Envelope) -> std::result::Result<(), PipelineError> {
        let record = ExtractionRecord::from_message_body(&envelope.body)?;
        self.on_extraction_record(&record).await.map(|_| ())
    }
}
