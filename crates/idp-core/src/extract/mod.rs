//! Invoice field extraction.
//!
//! "Extract vendor and total from a document" is a capability with
//! interchangeable implementations, chosen once from configuration:
//! - [`TextEngineExtractor`] reads the document and applies the expense rules
//! - [`SimulatedExtractor`] synthesizes fields from the document key
//! - [`FallbackExtractor`] runs one and falls back to the other

mod engine;
pub mod rules;
mod simulated;

pub use engine::TextEngineExtractor;
pub use simulated::{HIGH_VENDOR, LOW_VENDOR, RANDOM_VENDOR, SimulatedExtractor};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::ExtractionError;
use crate::models::config::{ExtractionConfig, ExtractorKind};
use crate::models::events::DocumentRef;
use crate::models::invoice::ExtractedFields;
use crate::storage::ObjectStore;

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Extracts vendor and total from a stored document.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Extract fields from the referenced document.
    async fn extract(&self, document: &DocumentRef) -> Result<ExtractedFields>;
}

/// Runs `primary`, and `fallback` when the primary fails in a way that
/// permits it. Unavailable documents never fall back.
pub struct FallbackExtractor {
    primary: Arc<dyn FieldExtractor>,
    fallback: Arc<dyn FieldExtractor>,
}

impl FallbackExtractor {
    pub fn new(primary: Arc<dyn FieldExtractor>, fallback: Arc<dyn FieldExtractor>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl FieldExtractor for FallbackExtractor {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn extract(&self, document: &DocumentRef) -> Result<ExtractedFields> {
        match self.primary.extract(document).await {
            Err(e) if e.allows_fallback() => {
                warn!(
                    "{} could not extract {}: {}; using {}",
                    self.primary.name(),
                    document.key,
                    e,
                    self.fallback.name()
                );
                self.fallback.extract(document).await
            }
            other => other,
        }
    }
}

/// Build the extractor selected by `config`.
pub fn build_extractor(
    config: &ExtractionConfig,
    store: Arc<dyn ObjectStore>,
) -> Arc<dyn FieldExtractor> {
    info!("Using {:?} field extraction", config.mode);

    let simulated = || -> Arc<dyn FieldExtractor> {
        Arc::new(SimulatedExtractor::new(
            Arc::clone(&store),
            config.simulated_min,
            config.simulated_max,
            config.seed,
        ))
    };

    match config.mode {
        ExtractorKind::Simulated => simulated(),
        ExtractorKind::Engine => Arc::new(TextEngineExtractor::new(Arc::clone(&store))),
        ExtractorKind::EngineWithFallback => Arc::new(FallbackExtractor::new(
            Arc::new(TextEngineExtractor::new(Arc::clone(&store))),
            simulated(),
        )),
    }
}
