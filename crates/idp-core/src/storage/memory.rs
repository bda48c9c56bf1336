//! In-process stores, used by tests and single-process runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{GrantRegistry, Item, ObjectStore, RecordStore, Result, StoredObject, validate_key};
use crate::error::StoreError;

/// Object store holding documents in memory.
#[derive(Debug)]
pub struct InMemoryObjectStore {
    bucket: String,
    objects: RwLock<HashMap<String, StoredObject>>,
    grants: GrantRegistry,
}

impl InMemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self::with_public_url(bucket, "memory://objects")
    }

    pub fn with_public_url(bucket: impl Into<String>, public_url: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(HashMap::new()),
            grants: GrantRegistry::new(public_url),
        }
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn grants(&self) -> &GrantRegistry {
        &self.grants
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        validate_key(key)?;
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<StoredObject> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }
}

/// Record store holding items in memory.
///
/// Writes can be made to fail on demand to exercise retry paths.
#[derive(Debug)]
pub struct InMemoryRecordStore {
    table: String,
    items: RwLock<BTreeMap<String, Item>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryRecordStore {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            items: RwLock::new(BTreeMap::new()),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes, including overwrites.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Fetch one item by key.
    pub async fn get(&self, key: &str) -> Option<Item> {
        self.items.read().await.get(key).cloned()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    fn table(&self) -> &str {
        &self.table
    }

    async fn put_item(&self, key: &str, item: Item) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "table {} rejected write",
                self.table
            )));
        }
        self.items.write().await.insert(key.to_string(), item);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<Item>> {
        Ok(self.items.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::AttributeValue;
    use std::time::Duration;

    #[tokio::test]
    async fn test_object_roundtrip_and_missing() {
        let store = InMemoryObjectStore::new("invoices");
        store
            .put_object("a.pdf", b"%PDF".to_vec(), "application/pdf")
            .await
            .unwrap();

        assert!(store.exists("a.pdf").await.unwrap());
        assert_eq!(store.get_object("a.pdf").await.unwrap().body, b"%PDF");
        assert!(matches!(
            store.get_object("b.pdf").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_put_with_grant() {
        let store = InMemoryObjectStore::new("invoices");
        let grant = store
            .presign_put("scan.jpg", "image/jpeg", Duration::from_secs(60))
            .await
            .unwrap();

        store
            .put_with_grant("scan.jpg", &grant.token, vec![1, 2, 3])
            .await
            .unwrap();

        let object = store.get_object("scan.jpg").await.unwrap();
        assert_eq!(object.content_type, "image/jpeg");
        assert!(store.put_with_grant("scan.jpg", &grant.token, vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_record_overwrite_keeps_one_item() {
        let store = InMemoryRecordStore::new("invoices");
        let mut item = Item::new();
        item.insert("invoiceId".to_string(), AttributeValue::S("a.pdf".to_string()));

        store.put_item("a.pdf", item.clone()).await.unwrap();
        store.put_item("a.pdf", item).await.unwrap();

        assert_eq!(store.scan().await.unwrap().len(), 1);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let store = InMemoryRecordStore::new("invoices");
        store.set_fail_writes(true);
        assert!(store.put_item("a.pdf", Item::new()).await.is_err());
        assert!(store.scan().await.unwrap().is_empty());
    }
}
