use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::models::invoice::{ExtractionRecord, PersistedInvoice};
use crate::storage::RecordStore;
use crate::transport::{Envelope, Subscriber};

/// Stores one record per invoice id.
pub struct PersistenceStage {
    store: Arc<dyn RecordStore>,
}

impl PersistenceStage {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Upsert the record under its invoice id.
    ///
    /// The total is written as exact decimal text. A repeated delivery
    /// overwrites the item with an identical one.
    pub async fn on_extraction_record(
        &self,
        record: &ExtractionRecord,
    ) -> Result<PersistedInvoice> {
        let invoice = PersistedInvoice::from(record);

        self.store
            .put_item(invoice.invoice_id.as_str(), invoice.to_item())
            .await?;

        info!(
            "Saved invoice {} to {}",
            invoice.invoice_id,
            self.store.table()
        );
        Ok(invoice)
    }
}

#[async_trait]
impl Subscriber for PersistenceStage {
    fn name(&self) -> &str {
        "persistence"
    }

    async fn deliver(&self, envelope: &Envelope) -> std::result::Result<(), PipelineError> {
        let record = ExtractionRecord::from_message_body(&envelope.body)?;
        self.on_extraction_record(&record).await.map(|_| ())
    }
}
