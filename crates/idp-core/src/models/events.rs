//! Storage-creation notifications that trigger extraction.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Reference to a stored document, resolvable to bytes in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub bucket: String,
    pub key: String,
}

/// One storage-creation notification: a new object landed in `bucket` at `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEvent {
    pub bucket: String,
    pub key: String,
}

impl StorageEvent {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn document(&self) -> DocumentRef {
        DocumentRef {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
        }
    }

    /// Decode a notification body.
    ///
    /// Accepts the flat `{bucket, key}` shape and the S3 notification
    /// envelope. Only the first record of an envelope is used; each
    /// activation handles one document.
    pub fn from_json(body: &str) -> Result<Self, PipelineError> {
        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| PipelineError::invalid(format!("malformed storage event: {}", e)))?;

        if let Some(record) = value.get("Records").and_then(|r| r.get(0)) {
            let envelope: S3Record = serde_json::from_value(record.clone())
                .map_err(|e| PipelineError::invalid(format!("malformed S3 record: {}", e)))?;
            return Ok(Self::new(envelope.s3.bucket.name, envelope.s3.object.key));
        }

        serde_json::from_value(value)
            .map_err(|e| PipelineError::invalid(format!("malformed storage event: {}", e)))
    }
}

#[derive(Deserialize)]
struct S3Record {
    s3: S3Entity,
}

#[derive(Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Deserialize)]
struct S3Object {
    key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flat_event() {
        let event = StorageEvent::from_json(r#"{"bucket":"invoices","key":"a.pdf"}"#).unwrap();
        assert_eq!(event, StorageEvent::new("invoices", "a.pdf"));
    }

    #[test]
    fn test_s3_envelope() {
        let body = r#"{
            "Records": [
                {"eventName": "ObjectCreated:Put",
                 "s3": {"bucket": {"name": "invoices"},
                        "object": {"key": "high-invoice.pdf", "size": 12}}}
            ]
        }"#;
        let event = StorageEvent::from_json(body).unwrap();
        assert_eq!(event, StorageEvent::new("invoices", "high-invoice.pdf"));
    }

    #[test]
    fn test_malformed_event() {
        let err = StorageEvent::from_json(r#"{"bucket":"invoices"}"#).unwrap_err();
        assert!(!err.is_retryable());
    }
}
