//! Filesystem-backed stores for the CLI and local server.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::{
    GrantRegistry, Item, ObjectStore, RecordStore, Result, StoredObject, content_type_for,
    validate_key,
};
use crate::error::StoreError;

/// Object store keeping each object as a file under `<root>/<bucket>/<key>`.
///
/// The content type given at write time is kept beside the bucket, in
/// `<root>/<bucket>.meta/<key>`. Objects written without one fall back to
/// the type implied by their extension.
#[derive(Debug)]
pub struct FsObjectStore {
    bucket: String,
    dir: PathBuf,
    meta_dir: PathBuf,
    grants: GrantRegistry,
}

impl FsObjectStore {
    pub fn new(
        root: impl AsRef<Path>,
        bucket: impl Into<String>,
        public_url: impl Into<String>,
    ) -> Self {
        let bucket = bucket.into();
        Self {
            dir: root.as_ref().join(&bucket),
            meta_dir: root.as_ref().join(format!("{}.meta", bucket)),
            bucket,
            grants: GrantRegistry::new(public_url),
        }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(key))
    }

    async fn write_content_type(&self, key: &str, content_type: &str) -> Result<()> {
        let path = self.meta_dir.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content_type).await?;
        Ok(())
    }

    async fn read_content_type(&self, key: &str) -> Result<String> {
        match tokio::fs::read_to_string(self.meta_dir.join(key)).await {
            Ok(content_type) if !content_type.trim().is_empty() => {
                Ok(content_type.trim().to_string())
            }
            Ok(_) => Ok(content_type_for(key).to_string()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(content_type_for(key).to_string()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn grants(&self) -> &GrantRegistry {
        &self.grants
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, body).await?;
        self.write_content_type(key, content_type).await?;
        debug!("Stored {} ({}) at {}", key, content_type, path.display());
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<StoredObject> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(StoredObject {
                body,
                content_type: self.read_content_type(key).await?,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

/// Record store persisting all items in one JSON file.
///
/// Every write rewrites the file through a temporary sibling and a rename,
/// so a crash never leaves a half-written table.
#[derive(Debug)]
pub struct FileRecordStore {
    table: String,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRecordStore {
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, Item>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Corrupt(format!("{}: {}", self.path.display(), e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    fn table(&self) -> &str {
        &self.table
    }

    async fn put_item(&self, key: &str, item: Item) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut items = self.load().await?;
        items.insert(key.to_string(), item);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&items)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        trace!("Table {} now holds {} items", self.table, items.len());
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<Item>> {
        Ok(self.load().await?.into_values().collect())
    }
}
