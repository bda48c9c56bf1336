use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info};

use super::rules::{expense_fields, summarize_expense};
use super::{FieldExtractor, Result};
use crate::document::document_text;
use crate::error::{ExtractionError, StoreError};
use crate::models::events::DocumentRef;
use crate::models::invoice::{ExtractedFields, ExtractionMode};
use crate::storage::ObjectStore;

/// Extraction engine adapter reading the document's text layer.
pub struct TextEngineExtractor {
    store: Arc<dyn ObjectStore>,
}

impl TextEngineExtractor {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FieldExtractor for TextEngineExtractor {
    fn name(&self) -> &str {
        "text-engine"
    }

    async fn extract(&self, document: &DocumentRef) -> Result<ExtractedFields> {
        let start = Instant::now();

        let object = self
            .store
            .get_object(&document.key)
            .await
            .map_err(|e| ExtractionError::Unavailable {
                key: document.key.clone(),
                reason: match e {
                    StoreError::NotFound { .. } => "document not found".to_string(),
                    other => other.to_string(),
                },
            })?;

        if object.body.is_empty() {
            return Err(ExtractionError::Unavailable {
                key: document.key.clone(),
                reason: "document is empty".to_string(),
            });
        }

        let text = document_text(&object.body).map_err(|source| ExtractionError::Document {
            key: document.key.clone(),
            source,
        })?;

        let fields = expense_fields(&text);
        debug!("Found {} summary fields in {}", fields.len(), document.key);

        let summary = summarize_expense(&fields).ok_or_else(|| ExtractionError::Unparseable {
            key: document.key.clone(),
            reason: "no TOTAL field found".to_string(),
        })?;

        info!(
            "Extracted {} / {} from {} in {}ms",
            summary.vendor,
            summary.total,
            document.key,
            start.elapsed().as_millis()
        );

        Ok(ExtractedFields {
            vendor: summary.vendor,
            total: summary.total,
            mode: ExtractionMode::Engine,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryObjectStore;
    use rust_decimal::Decimal;

    fn doc(key: &str) -> DocumentRef {
        DocumentRef {
            bucket: "invoices".to_string(),
            key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn test_extracts_from_text_document() {
        let store = Arc::new(InMemoryObjectStore::new("invoices"));
        store
            .put_object(
                "receipt.txt",
                b"Bill From: Corner Shop\nSubtotal: 40.00\nGrand Total: 45.10\n".to_vec(),
                "text/plain",
            )
            .await
            .unwrap();

        let fields = TextEngineExtractor::new(store)
            .extract(&doc("receipt.txt"))
            .await
            .unwrap();

        assert_eq!(fields.vendor, "Corner Shop");
        assert_eq!(fields.total, Decimal::new(4510, 2));
        assert_eq!(fields.mode, ExtractionMode::Engine);
    }

    #[tokio::test]
    async fn test_missing_and_empty_documents_are_unavailable() {
        let store = Arc::new(InMemoryObjectStore::new("invoices"));
        store.put_object("empty.pdf", Vec::new(), "application/pdf").await.unwrap();
        let engine = TextEngineExtractor::new(store);

        assert!(matches!(
            engine.extract(&doc("missing.pdf")).await,
            Err(ExtractionError::Unavailable { .. })
        ));
        assert!(matches!(
            engine.extract(&doc("empty.pdf")).await,
            Err(ExtractionError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_corrupt_pdf_is_a_document_error() {
        let store = Arc::new(InMemoryObjectStore::new("invoices"));
        store
            .put_object("broken.pdf", b"%PDF-1.4 garbage".to_vec(), "application/pdf")
            .await
            .unwrap();

        let err = TextEngineExtractor::new(store)
            .extract(&doc("broken.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Document { .. }));
        assert!(err.allows_fallback());
    }
}
