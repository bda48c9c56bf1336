//! Object and record storage ports.
//!
//! Stages receive these as injected trait objects; nothing in the crate
//! holds a process-wide client handle.

mod fs;
mod memory;

pub use fs::{FileRecordStore, FsObjectStore};
pub use memory::{InMemoryObjectStore, InMemoryRecordStore};

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StoreError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// One attribute of a stored item.
///
/// Numbers are kept as their exact decimal text, never as binary floats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// String attribute.
    S(String),
    /// Number attribute, as exact decimal text.
    N(String),
}

impl AttributeValue {
    pub fn number(value: Decimal) -> Self {
        AttributeValue::N(value.to_string())
    }

    /// The string payload, if this is a string attribute.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            AttributeValue::N(_) => None,
        }
    }

    /// The raw text of either variant.
    pub fn raw(&self) -> &str {
        match self {
            AttributeValue::S(s) | AttributeValue::N(s) => s,
        }
    }
}

/// A stored record: attribute name to value.
pub type Item = BTreeMap<String, AttributeValue>;

/// Object bytes plus their declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// A minted write capability for one object key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedPut {
    pub url: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Durable object storage for uploaded documents.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket (container) this store serves.
    fn bucket(&self) -> &str;

    /// Grants issued against this store.
    fn grants(&self) -> &GrantRegistry;

    /// Write an object, replacing any previous body.
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;

    /// Read an object. Missing keys yield [`StoreError::NotFound`].
    async fn get_object(&self, key: &str) -> Result<StoredObject>;

    /// Whether an object exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Mint a time-limited write capability for `key`.
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<PresignedPut> {
        validate_key(key)?;
        self.grants().issue(key, content_type, ttl).await
    }

    /// Redeem a grant and write the object it covers.
    async fn put_with_grant(&self, key: &str, token: &str, body: Vec<u8>) -> Result<()> {
        let content_type = self.grants().redeem(key, token, Utc::now()).await?;
        self.put_object(key, body, &content_type).await
    }
}

/// Durable key-value store for persisted invoices.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Table name.
    fn table(&self) -> &str;

    /// Insert or replace the item stored under `key`.
    async fn put_item(&self, key: &str, item: Item) -> Result<()>;

    /// Read every stored item.
    async fn scan(&self) -> Result<Vec<Item>>;
}

/// Content type implied by a file name's extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "tif" | "tiff" => "image/tiff",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Reject empty keys and keys that could escape a store root.
pub fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(StoreError::InvalidKey("key is empty".to_string()));
    }
    if key.starts_with('/')
        || key.contains('\\')
        || key.contains('\0')
        || key.split('/').any(|part| part == ".." || part == ".")
    {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Bytes escaped inside one path segment of an upload URL.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode each `/`-separated segment of an object key.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone)]
struct PendingGrant {
    token: String,
    content_type: String,
    expires_at: DateTime<Utc>,
}

/// Outstanding single-use upload grants.
#[derive(Debug)]
pub struct GrantRegistry {
    base_url: String,
    pending: Mutex<HashMap<String, PendingGrant>>,
}

impl GrantRegistry {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a grant for `key`, replacing any earlier one.
    ///
    /// Grants that expired unredeemed are dropped first.
    pub async fn issue(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<PresignedPut> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Unavailable(format!("grant lifetime out of range: {}", e)))?;
        let now = Utc::now();
        let expires_at = now + ttl;
        let token = uuid::Uuid::new_v4().simple().to_string();

        let mut pending = self.pending.lock().await;
        let before = pending.len();
        pending.retain(|_, grant| grant.expires_at > now);
        if pending.len() < before {
            debug!("Dropped {} expired upload grants", before - pending.len());
        }

        pending.insert(
            key.to_string(),
            PendingGrant {
                token: token.clone(),
                content_type: content_type.to_string(),
                expires_at,
            },
        );
        drop(pending);

        debug!("Issued upload grant for {} until {}", key, expires_at);

        Ok(PresignedPut {
            url: format!(
                "{}/{}?token={}&expires={}",
                self.base_url,
                encode_key(key),
                token,
                expires_at.timestamp()
            ),
            token,
            expires_at,
        })
    }

    /// Consume the grant for `key`, returning the content type it was issued for.
    pub async fn redeem(&self, key: &str, token: &str, now: DateTime<Utc>) -> Result<String> {
        let mut pending = self.pending.lock().await;

        let grant = match pending.get(key) {
            Some(grant) if grant.token == token => grant.clone(),
            _ => {
                return Err(StoreError::GrantRejected {
                    key: key.to_string(),
                });
            }
        };

        pending.remove(key);
        if now > grant.expires_at {
            return Err(StoreError::GrantExpired {
                key: key.to_string(),
            });
        }

        Ok(grant.content_type)
    }
}
