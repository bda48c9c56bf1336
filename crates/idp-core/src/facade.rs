//! Query facade: upload grants and invoice listing.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{PipelineError, Result, StoreError};
use crate::models::invoice::{PersistedInvoice, UploadGrant};
use crate::storage::{ObjectStore, RecordStore};

/// Content type assumed when the caller does not name one.
pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Boundary view of a persisted invoice.
///
/// `total` is decoded to a plain JSON number here and nowhere earlier.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceView {
    pub invoice_id: String,
    pub bucket: String,
    pub vendor: String,
    pub total: f64,
    pub extraction_mode: String,
}

impl From<&PersistedInvoice> for InvoiceView {
    fn from(invoice: &PersistedInvoice) -> Self {
        Self {
            invoice_id: invoice.invoice_id.to_string(),
            bucket: invoice.bucket.clone(),
            vendor: invoice.vendor.clone(),
            total: invoice.total.to_f64().unwrap_or_default(),
            extraction_mode: invoice.extraction_mode.as_str().to_string(),
        }
    }
}

/// Read/write-adjacent operations exposed to uploaders and dashboards.
pub struct QueryFacade {
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    grant_ttl: Duration,
}

impl QueryFacade {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
        grant_ttl: Duration,
    ) -> Self {
        Self {
            objects,
            records,
            grant_ttl,
        }
    }

    /// Mint a short-lived, single-object upload grant.
    ///
    /// The key is `{uuid}-{filename}`. A missing or blank filename is
    /// rejected before anything is minted.
    pub async fn request_upload_grant(
        &self,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<UploadGrant> {
        let filename = match filename {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(PipelineError::invalid("filename parameter is required")),
        };
        let content_type = content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        let key = format!("{}-{}", uuid::Uuid::new_v4(), filename);
        let presigned = self
            .objects
            .presign_put(&key, content_type, self.grant_ttl)
            .await
            .map_err(|e| match e {
                StoreError::InvalidKey(reason) => {
                    PipelineError::invalid(format!("invalid filename: {}", reason))
                }
                other => PipelineError::from(other),
            })?;

        info!("Issued upload grant for {}", key);
        Ok(UploadGrant {
            upload_url: presigned.url,
            key,
            expires_at: presigned.expires_at,
        })
    }

    /// Every stored invoice, in store order.
    ///
    /// Items that cannot be decoded are logged and skipped.
    pub async fn list_invoices(&self) -> Result<Vec<PersistedInvoice>> {
        let items = self.records.scan().await?;
        let total = items.len();

        let invoices: Vec<PersistedInvoice> = items
            .iter()
            .filter_map(|item| match PersistedInvoice::from_item(item) {
                Ok(invoice) => Some(invoice),
                Err(e) => {
                    warn!("Skipping unreadable record in {}: {}", self.records.table(), e);
                    None
                }
            })
            .collect();

        info!("Listed {} of {} records", invoices.len(), total);
        Ok(invoices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::invoice::{ExtractedFields, ExtractionMode, ExtractionRecord, InvoiceId};
    use crate::storage::{AttributeValue, InMemoryObjectStore, InMemoryRecordStore, Item};

    fn facade() -> (QueryFacade, Arc<InMemoryObjectStore>, Arc<InMemoryRecordStore>) {
        let objects = Arc::new(InMemoryObjectStore::with_public_url(
            "invoices",
            "http://localhost:8080/objects",
        ));
        let records = Arc::new(InMemoryRecordStore::new("invoices"));
        (
            QueryFacade::new(objects.clone(), records.clone(), Duration::from_secs(300)),
            objects,
            records,
        )
    }

    #[tokio::test]
    async fn test_missing_filename_mints_nothing() {
        let (facade, objects, _) = facade();

        for filename in [None, Some(""), Some("   ")] {
            let err = facade.request_upload_grant(filename, None).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRequest);
            assert_eq!(err.status_code(), 400);
        }
        assert!(objects.is_empty().await);
    }

    #[tokio::test]
    async fn test_grant_key_and_url() {
        let (facade, objects, _) = facade();

        let grant = facade
            .request_upload_grant(Some("receipt.png"), Some("image/png"))
            .await
            .unwrap();

        assert!(grant.key.ends_with("-receipt.png"));
        assert_eq!(grant.key.len(), 36 + 1 + "receipt.png".len());
        assert!(grant
            .upload_url
            .starts_with(&format!("http://localhost:8080/objects/{}?token=", grant.key)));
        let ttl = grant.expires_at - chrono::Utc::now();
        assert!(ttl.num_seconds() > 290 && ttl.num_seconds() <= 300);

        let token = grant.upload_url.split("token=").nth(1).unwrap().split('&').next().unwrap();
        objects.put_with_grant(&grant.key, token, b"png".to_vec()).await.unwrap();
        assert_eq!(objects.get_object(&grant.key).await.unwrap().content_type, "image/png");
    }

    #[tokio::test]
    async fn test_content_type_defaults_to_jpeg() {
        let (facade, objects, _) = facade();

        let grant = facade.request_upload_grant(Some("scan.jpg"), None).await.unwrap();
        let token = grant.upload_url.split("token=").nth(1).unwrap().split('&').next().unwrap();
        objects.put_with_grant(&grant.key, token, vec![1]).await.unwrap();

        assert_eq!(
            objects.get_object(&grant.key).await.unwrap().content_type,
            DEFAULT_CONTENT_TYPE
        );
    }

    #[tokio::test]
    async fn test_list_skips_corrupt_items() {
        let (facade, _, records) = facade();
        let record = ExtractionRecord::new(
            InvoiceId::from_storage_key("a.pdf").unwrap(),
            "invoices",
            ExtractedFields {
                vendor: "Acme".to_string(),
                total: rust_decimal::Decimal::new(129999, 2),
                mode: ExtractionMode::Engine,
            },
        );
        records
            .put_item("a.pdf", PersistedInvoice::from(&record).to_item())
            .await
            .unwrap();
        let mut broken = Item::new();
        broken.insert("vendor".to_string(), AttributeValue::S("nobody".to_string()));
        records.put_item("broken", broken).await.unwrap();

        let invoices = facade.list_invoices().await.unwrap();
        assert_eq!(invoices.len(), 1);

        let view = InvoiceView::from(&invoices[0]);
        assert_eq!(view.invoice_id, "a.pdf");
        assert_eq!(view.total, 1299.99);
        assert_eq!(view.extraction_mode, "engine");
    }
}
