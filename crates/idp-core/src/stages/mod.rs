//! Pipeline stages.
//!
//! Each stage is a topic subscriber: it decodes its message body, does one
//! job, and reports failure through [`crate::error::PipelineError`].

mod extraction;
mod persistence;
mod validation;

pub use extraction::{ExtractionStage, INVOICE_PROCESSED_SUBJECT};
pub use persistence::PersistenceStage;
pub use validation::{ThresholdPolicy, ValidationStage};
