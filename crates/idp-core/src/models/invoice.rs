//! Invoice data models flowing between pipeline stages.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PipelineError, StoreError};
use crate::storage::{AttributeValue, Item};

/// Stable invoice identity derived from the stored document's key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(String);

impl InvoiceId {
    /// Derive the identity from a storage key.
    ///
    /// The key is used verbatim, so redelivery of the same storage event
    /// always yields the same identity.
    pub fn from_storage_key(key: &str) -> Result<Self, PipelineError> {
        if key.trim().is_empty() {
            return Err(PipelineError::invalid("storage key is empty"));
        }
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the vendor and total of a record were obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Read from the document by the extraction engine.
    Engine,
    /// Synthesized without reading the document's contents.
    Simulated,
    /// Producer did not say (older messages and records).
    #[default]
    Unspecified,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Engine => "engine",
            ExtractionMode::Simulated => "simulated",
            ExtractionMode::Unspecified => "unspecified",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "engine" => ExtractionMode::Engine,
            "simulated" => ExtractionMode::Simulated,
            _ => ExtractionMode::Unspecified,
        }
    }
}

/// Fields produced by a field extractor for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFields {
    /// Vendor name (free text).
    pub vendor: String,
    /// Invoice total.
    pub total: Decimal,
    /// Whether these fields are genuine or simulated.
    pub mode: ExtractionMode,
}

/// Structured result of processing one document, published to the
/// invoice-events topic.
///
/// `total` is carried on the wire as a JSON number written with its exact
/// decimal digits. Decoding keeps the scale of numeric input and also
/// accepts a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRecord {
    pub invoice_id: InvoiceId,
    pub bucket: String,
    pub vendor: String,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub total: Decimal,
    #[serde(default)]
    pub extraction_mode: ExtractionMode,
}

impl ExtractionRecord {
    pub fn new(invoice_id: InvoiceId, bucket: impl Into<String>, fields: ExtractedFields) -> Self {
        Self {
            invoice_id,
            bucket: bucket.into(),
            vendor: fields.vendor,
            total: fields.total,
            extraction_mode: fields.mode,
        }
    }

    /// Encode as a topic message body.
    pub fn to_message_body(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode a topic message body.
    ///
    /// A malformed body will never decode on redelivery, so it is reported
    /// as `InvalidRequest`.
    pub fn from_message_body(body: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(body)
            .map_err(|e| PipelineError::invalid(format!("malformed extraction record: {}", e)))
    }
}

/// Durable form of an extraction record, keyed by invoice id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedInvoice {
    pub invoice_id: InvoiceId,
    pub bucket: String,
    pub vendor: String,
    pub total: Decimal,
    pub extraction_mode: ExtractionMode,
}

impl From<&ExtractionRecord> for PersistedInvoice {
    fn from(record: &ExtractionRecord) -> Self {
        Self {
            invoice_id: record.invoice_id.clone(),
            bucket: record.bucket.clone(),
            vendor: record.vendor.clone(),
            total: record.total,
            extraction_mode: record.extraction_mode,
        }
    }
}

impl PersistedInvoice {
    /// Encode into a store item. `total` becomes an exact decimal number
    /// attribute.
    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert(
            "invoiceId".to_string(),
            AttributeValue::S(self.invoice_id.to_string()),
        );
        item.insert("bucket".to_string(), AttributeValue::S(self.bucket.clone()));
        item.insert("vendor".to_string(), AttributeValue::S(self.vendor.clone()));
        item.insert("total".to_string(), AttributeValue::number(self.total));
        item.insert(
            "extractionMode".to_string(),
            AttributeValue::S(self.extraction_mode.as_str().to_string()),
        );
        item
    }

    /// Decode a store item.
    ///
    /// A missing invoice id is a hard error. A missing or unparseable total
    /// falls back to zero with a warning.
    pub fn from_item(item: &Item) -> Result<Self, StoreError> {
        let invoice_id = item
            .get("invoiceId")
            .and_then(AttributeValue::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StoreError::Corrupt("item has no invoiceId".to_string()))?;

        let text = |name: &str| {
            item.get(name)
                .and_then(AttributeValue::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let total = match item.get("total").map(AttributeValue::raw) {
            Some(raw) => Decimal::from_str(raw).unwrap_or_else(|_| {
                warn!("Invoice {} has unparseable total {:?}, using 0", invoice_id, raw);
                Decimal::ZERO
            }),
            None => {
                warn!("Invoice {} has no total, using 0", invoice_id);
                Decimal::ZERO
            }
        };

        Ok(Self {
            invoice_id: InvoiceId(invoice_id.to_string()),
            bucket: text("bucket"),
            vendor: text("vendor"),
            total,
            extraction_mode: ExtractionMode::parse(&text("extractionMode")),
        })
    }
}

/// Transient alert raised when an invoice total exceeds the threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub invoice_id: InvoiceId,
    pub vendor: String,
    pub total: Decimal,
    pub threshold: Decimal,
}

impl AlertEvent {
    /// Notification subject line.
    pub fn subject(&self) -> String {
        format!("Alert: High Invoice from {}", self.vendor)
    }

    /// Notification body for the human-facing channel.
    pub fn body(&self) -> String {
        format!(
            "High Value Invoice Detected!\n\n\
             Invoice ID: {}\n\
             Vendor: {}\n\
             Total: ${}\n\
             Threshold: ${}\n\n\
             Please review this invoice immediately.",
            self.invoice_id, self.vendor, self.total, self.threshold
        )
    }
}

/// Time-limited, single-object write credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadGrant {
    pub upload_url: String,
    pub key: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(total: &str) -> ExtractionRecord {
        ExtractionRecord::new(
            InvoiceId::from_storage_key("high-invoice.pdf").unwrap(),
            "invoices",
            ExtractedFields {
                vendor: "Luxury Corp (Simulated)".to_string(),
                total: Decimal::from_str(total).unwrap(),
                mode: ExtractionMode::Simulated,
            },
        )
    }

    #[test]
    fn test_invoice_id_rejects_empty_key() {
        assert!(InvoiceId::from_storage_key("").is_err());
        assert!(InvoiceId::from_storage_key("   ").is_err());
        assert_eq!(
            InvoiceId::from_storage_key("a/b.pdf").unwrap().as_str(),
            "a/b.pdf"
        );
    }

    #[test]
    fn test_record_wire_format() {
        let body = record("1500.00").to_message_body().unwrap();

        assert_eq!(
            body,
            concat!(
                r#"{"invoiceId":"high-invoice.pdf","bucket":"invoices","#,
                r#""vendor":"Luxury Corp (Simulated)","total":1500.00,"#,
                r#""extractionMode":"simulated"}"#,
            )
        );
    }

    #[test]
    fn test_record_keeps_scale_of_numeric_total() {
        for (body, expected) in [
            (r#"{"invoiceId":"x.pdf","bucket":"b","vendor":"V","total":1500.00}"#, "1500.00"),
            (r#"{"invoiceId":"x.pdf","bucket":"b","vendor":"V","total":0.30}"#, "0.30"),
            (r#"{"invoiceId":"x.pdf","bucket":"b","vendor":"V","total":50}"#, "50"),
            (r#"{"invoiceId":"x.pdf","bucket":"b","vendor":"V","total":"1299.99"}"#, "1299.99"),
        ] {
            let decoded = ExtractionRecord::from_message_body(body).unwrap();
            assert_eq!(decoded.total.to_string(), expected);
            assert!(
                decoded
                    .to_message_body()
                    .unwrap()
                    .contains(&format!(r#""total":{},"#, expected))
            );
        }
    }

    #[test]
    fn test_record_defaults_extraction_mode() {
        let decoded = ExtractionRecord::from_message_body(
            r#"{"invoiceId":"x.pdf","bucket":"b","vendor":"V","total":50}"#,
        )
        .unwrap();
        assert_eq!(decoded.total, Decimal::from(50));
        assert_eq!(decoded.extraction_mode, ExtractionMode::Unspecified);
    }

    #[test]
    fn test_malformed_record_is_not_retryable() {
        let err = ExtractionRecord::from_message_body("{not json").unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_item_keeps_exact_decimal() {
        let invoice = PersistedInvoice::from(&record("1299.99"));
        let item = invoice.to_item();

        assert_eq!(item["total"], AttributeValue::N("1299.99".to_string()));

        let decoded = PersistedInvoice::from_item(&item).unwrap();
        assert_eq!(decoded.total.to_string(), "1299.99");
        assert_eq!(decoded, invoice);
    }

    #[test]
    fn test_item_with_bad_total_falls_back_to_zero() {
        let mut item = PersistedInvoice::from(&record("10.00")).to_item();
        item.insert("total".to_string(), AttributeValue::N("ten".to_string()));

        let decoded = PersistedInvoice::from_item(&item).unwrap();
        assert_eq!(decoded.total, Decimal::ZERO);
    }

    #[test]
    fn test_item_without_id_is_corrupt() {
        let mut item = PersistedInvoice::from(&record("10.00")).to_item();
        item.remove("invoiceId");
        assert!(PersistedInvoice::from_item(&item).is_err());
    }

    #[test]
    fn test_alert_text() {
        let alert = AlertEvent {
            invoice_id: InvoiceId::from_storage_key("high-invoice.pdf").unwrap(),
            vendor: "Luxury Corp (Simulated)".to_string(),
            total: Decimal::new(150000, 2),
            threshold: Decimal::new(100000, 2),
        };

        assert_eq!(alert.subject(), "Alert: High Invoice from Luxury Corp (Simulated)");
        assert!(alert.body().contains("Invoice ID: high-invoice.pdf"));
        assert!(alert.body().contains("Total: $1500.00"));
    }
}
