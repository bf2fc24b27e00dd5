use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{NewVideoRecord, VideoRecord, VideoRecordStore};

/// Video records kept in memory, in insertion order
#[derive(Debug, Default)]
pub struct InMemoryVideoRecords {
    records: RwLock<Vec<VideoRecord>>,
}

impl InMemoryVideoRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<VideoRecord> {
        self.records.read().await.iter().find(|r| r.id == id).cloned()
    }

    pub async fn list(&self) -> Vec<VideoRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl VideoRecordStore for InMemoryVideoRecords {
    async fn insert(&self, record: NewVideoRecord) -> Result<String, StoreError> {
        let mut records = self.records.write().await;
        if let Some(existing) = records.iter().find(|r| r.video.storage_key == record.storage_key) {
            return Ok(existing.id.clone());
        }

        let id = Uuid::new_v4().to_string();
        records.push(VideoRecord {
            id: id.clone(),
            video: record,
            created_at: Utc::now(),
        });
        Ok(id)
    }
}
