//! Configuration structures for the invoice pipeline.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Main configuration for the idp pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdpConfig {
    /// Object storage configuration.
    pub storage: StorageConfig,

    /// Record store configuration.
    pub records: RecordsConfig,

    /// Topic names.
    pub topics: TopicsConfig,

    /// Field extraction configuration.
    pub extraction: ExtractionConfig,

    /// Threshold policy configuration.
    pub validation: ValidationConfig,

    /// Retry policy applied by the in-process transport.
    pub delivery: DeliveryConfig,
}

/// Object storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Bucket (container) receiving uploads.
    pub bucket: String,

    /// Root directory of the filesystem object store.
    pub root_dir: PathBuf,

    /// Base URL that upload grants point at.
    pub public_url: String,

    /// Lifetime of an upload grant in seconds.
    pub grant_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "invoices".to_string(),
            root_dir: PathBuf::from("data/objects"),
            public_url: "http://127.0.0.1:8080/objects".to_string(),
            grant_ttl_secs: 300,
        }
    }
}

impl StorageConfig {
    pub fn grant_ttl(&self) -> Duration {
        Duration::from_secs(self.grant_ttl_secs)
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
    /// Table name.
    pub table: String,

    /// JSON file backing the file record store.
    pub path: PathBuf,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            table: "invoices".to_string(),
            path: PathBuf::from("data/records.json"),
        }
    }
}

/// Topic names and the local alert outbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    /// Topic carrying storage-creation notifications.
    pub storage_events: String,

    /// Topic carrying extraction records.
    pub invoice_events: String,

    /// Topic carrying alert notifications.
    pub alerts: String,

    /// JSON-lines file that receives alert notifications.
    pub alerts_outbox: PathBuf,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            storage_events: "storage-events".to_string(),
            invoice_events: "invoice-events".to_string(),
            alerts: "invoice-alerts".to_string(),
            alerts_outbox: PathBuf::from("data/alerts.jsonl"),
        }
    }
}

/// Which field extractor the pipeline runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    /// Synthesized fields only.
    #[default]
    Simulated,
    /// Text engine only; unparseable documents fail.
    Engine,
    /// Text engine, falling back to simulation for unparseable documents.
    EngineWithFallback,
}

impl FromStr for ExtractorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "simulated" | "simulation" => Ok(ExtractorKind::Simulated),
            "engine" => Ok(ExtractorKind::Engine),
            "engine_with_fallback" | "auto" => Ok(ExtractorKind::EngineWithFallback),
            other => Err(other.to_string()),
        }
    }
}

/// Field extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Extractor selection.
    pub mode: ExtractorKind,

    /// Lower bound of simulated totals.
    pub simulated_min: Decimal,

    /// Upper bound of simulated totals.
    pub simulated_max: Decimal,

    /// Seed for simulated totals; random when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: ExtractorKind::Simulated,
            simulated_min: Decimal::new(1000, 2),
            simulated_max: Decimal::new(120000, 2),
            seed: None,
        }
    }
}

/// Threshold policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Totals strictly above this value raise an alert.
    pub threshold: Decimal,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            threshold: Decimal::new(100000, 2),
        }
    }
}

/// Retry policy applied to every subscriber delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Attempts per delivery, including the first.
    pub max_attempts: u32,

    /// Backoff before the second attempt.
    pub initial_backoff_ms: u64,

    /// Cap on the backoff between attempts.
    pub max_backoff_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5000,
        }
    }
}

impl IdpConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    ///
    /// Recognized keys: `TABLE_NAME`, `BUCKET_NAME`, `TOPIC_ARN`,
    /// `ALERTS_TOPIC_ARN`, `ALERT_THRESHOLD`, `EXTRACTION_MODE`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(table) = lookup("TABLE_NAME") {
            self.records.table = table;
        }
        if let Some(bucket) = lookup("BUCKET_NAME") {
            self.storage.bucket = bucket;
        }
        if let Some(topic) = lookup("TOPIC_ARN") {
            self.topics.invoice_events = topic;
        }
        if let Some(topic) = lookup("ALERTS_TOPIC_ARN") {
            self.topics.alerts = topic;
        }
        if let Some(value) = lookup("ALERT_THRESHOLD") {
            self.validation.threshold =
                Decimal::from_str(value.trim()).map_err(|_| ConfigError::InvalidValue {
                    key: "ALERT_THRESHOLD".to_string(),
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup("EXTRACTION_MODE") {
            self.extraction.mode = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "EXTRACTION_MODE".to_string(),
                value: value.clone(),
            })?;
        }
        Ok(())
    }

    /// Load from an optional file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = IdpConfig::default();
        assert_eq!(config.validation.threshold.to_string(), "1000.00");
        assert_eq!(config.storage.grant_ttl(), Duration::from_secs(300));
        assert_eq!(config.extraction.mode, ExtractorKind::Simulated);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TABLE_NAME", "InvoiceTable"),
            ("BUCKET_NAME", "invoice-bucket"),
            ("ALERT_THRESHOLD", "250.50"),
            ("EXTRACTION_MODE", "engine-with-fallback"),
        ]);

        let mut config = IdpConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.records.table, "InvoiceTable");
        assert_eq!(config.storage.bucket, "invoice-bucket");
        assert_eq!(config.validation.threshold, Decimal::new(25050, 2));
        assert_eq!(config.extraction.mode, ExtractorKind::EngineWithFallback);
    }

    #[test]
    fn test_invalid_threshold_is_rejected() {
        let mut config = IdpConfig::default();
        let err = config
            .apply_overrides(|k| (k == "ALERT_THRESHOLD").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_file_roundtrip_keeps_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"validation": {"threshold": 500}}"#).unwrap();

        let config = IdpConfig::from_file(&path).unwrap();
        assert_eq!(config.validation.threshold, Decimal::from(500));
        assert_eq!(config.storage.bucket, "invoices");

        config.save(&path).unwrap();
        let reloaded = IdpConfig::from_file(&path).unwrap();
        assert_eq!(reloaded.validation.threshold, Decimal::from(500));
    }
}
