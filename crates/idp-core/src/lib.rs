//! Core library for the invoice document pipeline.
//!
//! This crate provides:
//! - Invoice data models and the messages passed between stages
//! - Field extraction (text engine over PDF/text documents, or simulated)
//! - Extraction, persistence, and validation stages
//! - Storage and publish/subscribe ports with in-process adapters
//! - The query facade and its HTTP routing

pub mod api;
pub mod document;
pub mod error;
pub mod extract;
pub mod facade;
pub mod models;
pub mod pipeline;
pub mod stages;
pub mod storage;
pub mod transport;

pub use api::{ApiRequest, ApiResponse};
pub use error::{ErrorKind, PipelineError, Result};
pub use extract::{FieldExtractor, build_extractor};
pub use facade::{InvoiceView, QueryFacade};
pub use models::config::IdpConfig;
pub use models::events::{DocumentRef, StorageEvent};
pub use models::invoice::{
    AlertEvent, ExtractedFields, ExtractionMode, ExtractionRecord, InvoiceId, PersistedInvoice,
    UploadGrant,
};
pub use pipeline::Pipeline;
pub use rust_decimal::Decimal;
pub use stages::{ExtractionStage, PersistenceStage, ThresholdPolicy, ValidationStage};
pub use storage::{ObjectStore, RecordStore};
pub use transport::{MessagePublisher, Subscriber};
