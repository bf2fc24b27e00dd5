//! # Output Stores
//!
//! Where finished videos go: an [`OutputStore`] holds the media file and
//! hands back a public URL, a [`VideoRecordStore`] keeps the metadata row.
//! Both are idempotent on the storage key so a retried persist step never
//! duplicates anything.

mod local;
mod memory;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use local::LocalOutputStore;
pub use memory::InMemoryVideoRecords;

#[async_trait]
pub trait OutputStore: Send + Sync {
    /// Store the file at `local_path` under `key` and return its public URL
    ///
    /// Storing an existing key returns the URL of what is already there.
    async fn store(&self, local_path: &Path, key: &str, content_type: &str) -> Result<String, StoreError>;
}

#[async_trait]
pub trait VideoRecordStore: Send + Sync {
    /// Insert a record and return its id; an existing storage key returns the existing id
    async fn insert(&self, record: NewVideoRecord) -> Result<String, StoreError>;
}

/// Metadata for a finished video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVideoRecord {
    pub filename: String,
    pub storage_key: String,
    pub public_url: String,
    pub size_mb: f64,
    pub title: String,
    pub script: String,
    pub owner_id: Option<String>,
}

/// A stored [`NewVideoRecord`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub id: String,
    #[serde(flatten)]
    pub video: NewVideoRecord,
    pub created_at: DateTime<Utc>,
}

/// Reject keys that could escape the store root
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.trim().is_empty() || key.contains('/') || key.contains('\\') || key.contains("..") {
        return Err(StoreError::InvalidKey { key: key.to_string() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation() {
        assert!(validate_key("my-video-1234.mp4").is_ok());
        for bad in ["", "  ", "../x.mp4", "a/b.mp4", "a\\b.mp4"] {
            assert!(matches!(validate_key(bad), Err(StoreError::InvalidKey { .. })), "{bad}");
        }
    }
}
