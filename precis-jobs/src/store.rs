//! Where finished summaries end up.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use precis_summarizer::SummaryResult;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;

pub type RecordId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    pub id: RecordId,
    pub owner_id: String,
    pub title: String,
    pub original_text: String,
    pub summary: SummaryResult,
    pub created_at: DateTime<Utc>,
}

/// Persistence for finished summaries, keyed by owner.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    async fn save_result(
        &self,
        owner_id: &str,
        title: &str,
        original_text: &str,
        summary: &SummaryResult,
    ) -> Result<RecordId, StoreError>;
}

/// In-memory [`SummaryStore`], newest records last.
#[derive(Debug, Default)]
pub struct MemorySummaryStore {
    records: RwLock<HashMap<RecordId, SummaryRecord>>,
    order: RwLock<Vec<RecordId>>,
}

impl MemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: RecordId) -> Option<SummaryRecord> {
        self.records.read().await.get(&id).cloned()
    }

    /// Records for `owner_id`, most recent first.
    pub async fn list_for_owner(&self, owner_id: &str) -> Vec<SummaryRecord> {
        let order = self.order.read().await;
        let records = self.records.read().await;
        order
            .iter()
            .rev()
            .filter_map(|id| records.get(id))
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl SummaryStore for MemorySummaryStore {
    async fn save_result(
        &self,
        owner_id: &str,
        title: &str,
        original_text: &str,
        summary: &SummaryResult,
    ) -> Result<RecordId, StoreError> {
        if owner_id.trim().is_empty() {
            return Err(StoreError::Invalid("owner id is required".into()));
        }
        let record = SummaryRecord {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            original_text: original_text.to_string(),
            summary: summary.clone(),
            created_at: Utc::now(),
        };
        let id = record.id;
        // lock order: order, then records (same as list_for_owner)
        let mut order = self.order.write().await;
        self.records.write().await.insert(id, record);
        order.push(id);
        tracing::debug!(record_id = %id, %owner_id, "stored summary");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(text: &str) -> SummaryResult {
        SummaryResult {
            text: text.into(),
            original_word_count: 100,
            summary_word_count: 1,
            compression_ratio: 1.0,
        }
    }

    #[tokio::test]
    async fn records_are_listed_per_owner_newest_first() {
        let store = MemorySummaryStore::new();
        let a1 = store.save_result("alice", "one", "text", &summary("1")).await.unwrap();
        store.save_result("bob", "two", "text", &summary("2")).await.unwrap();
        let a2 = store.save_result("alice", "three", "text", &summary("3")).await.unwrap();

        let ids: Vec<_> = store
            .list_for_owner("alice")
            .await
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![a2, a1]);
        assert_eq!(store.get(a1).await.unwrap().title, "one");
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn owner_is_required() {
        let store = MemorySummaryStore::new();
        assert!(matches!(
            store.save_result(" ", "t", "text", &summary("s")).await,
            Err(StoreError::Invalid(_))
        ));
    }
}
