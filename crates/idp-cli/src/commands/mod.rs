//! Subcommands and the local wiring they share.

pub mod config;
pub mod ingest;
pub mod list;
pub mod serve;
pub mod upload_url;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use idp_core::models::config::IdpConfig;
use idp_core::storage::{FileRecordStore, FsObjectStore};
use idp_core::transport::OutboxPublisher;
use idp_core::{Pipeline, QueryFacade};

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("idp")
        .join("config.json")
}

/// Resolve the configuration: explicit path, else the default file if it
/// exists, else defaults. Environment overrides apply last.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<IdpConfig> {
    let path = match config_path {
        Some(path) => Some(PathBuf::from(path)),
        None => Some(default_config_path()).filter(|p| p.exists()),
    };
    debug!("Loading configuration from {:?}", path);

    Ok(IdpConfig::load(path.as_deref())?)
}

/// Filesystem-backed clients built once per process.
pub struct LocalContext {
    pub config: IdpConfig,
    pub objects: Arc<FsObjectStore>,
    pub records: Arc<FileRecordStore>,
    pub alerts: Arc<OutboxPublisher>,
}

impl LocalContext {
    pub fn new(config: IdpConfig) -> Self {
        let objects = Arc::new(FsObjectStore::new(
            &config.storage.root_dir,
            &config.storage.bucket,
            &config.storage.public_url,
        ));
        let records = Arc::new(FileRecordStore::new(
            &config.records.path,
            &config.records.table,
        ));
        let alerts = Arc::new(OutboxPublisher::new(
            &config.topics.alerts,
            &config.topics.alerts_outbox,
        ));

        Self {
            config,
            objects,
            records,
            alerts,
        }
    }

    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        Ok(Self::new(load_config(config_path)?))
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            &self.config,
            self.objects.clone(),
            self.records.clone(),
            self.alerts.clone(),
        )
    }

    pub fn facade(&self) -> QueryFacade {
        QueryFacade::new(
            self.objects.clone(),
            self.records.clone(),
            self.config.storage.grant_ttl(),
        )
    }

    pub fn alerts_outbox(&self) -> &Path {
        &self.config.topics.alerts_outbox
    }
}
