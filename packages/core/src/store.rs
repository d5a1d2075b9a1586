//! Record store contract and the in-memory backend.
//!
//! [`RecordStore`] is the single sink for deduplicated batches. The harvester
//! never inspects what a store does with a batch beyond success or failure.
//!
//! [`MemoryStore`] keeps a bounded window of records per [`RecordKind`].
//! When a kind's buffer is full the oldest record is evicted before the new
//! one is inserted (ring-buffer semantics backed by `VecDeque`).

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::sources::{CanonicalRecord, RecordKind, StoreError};

/// Default maximum number of records retained per kind.
pub const DEFAULT_CAPACITY: usize = 10_000;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Save one batch. `kind` selects the backing collection.
    async fn save(&self, kind: RecordKind, records: Vec<CanonicalRecord>) -> Result<(), StoreError>;
}

/// Capacity-bounded in-memory store.
#[derive(Debug)]
pub struct MemoryStore {
    data: RwLock<HashMap<RecordKind, VecDeque<CanonicalRecord>>>,
    capacity: usize,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// All records of `kind`, oldest first.
    pub async fn records(&self, kind: RecordKind) -> Vec<CanonicalRecord> {
        self.data
            .read()
            .await
            .get(&kind)
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn len(&self, kind: RecordKind) -> usize {
        self.data.read().await.get(&kind).map_or(0, VecDeque::len)
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.values().all(VecDeque::is_empty)
    }

    pub async fn clear(&self) {
        self.data.write().await.clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn save(&self, kind: RecordKind, records: Vec<CanonicalRecord>) -> Result<(), StoreError> {
        if self.capacity == 0 {
            return Err(StoreError::Unavailable {
                message: "memory store has zero capacity".to_string(),
            });
        }

        let mut data = self.data.write().await;
        let buffer = data.entry(kind).or_default();
        for record in records {
            if buffer.len() >= self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(record);
        }
        tracing::debug!("Memory store now holds {} {} record(s)", buffer.len(), kind.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::RecordBody;
    use chrono::Utc;
    use serde_json::{json, Map};

    fn make_record(key: &str) -> CanonicalRecord {
        let mut fields = Map::new();
        fields.insert("fcode".into(), json!(key));
        CanonicalRecord {
            identity_key: Some(key.to_string()),
            site_id: "SYD".into(),
            collected_at: Utc::now(),
            body: RecordBody::Fields(fields),
        }
    }

    #[tokio::test]
    async fn new_store_is_empty() {
        let store = MemoryStore::new(10);
        assert!(store.is_empty().await);
        assert_eq!(store.len(RecordKind::Position).await, 0);
    }

    #[tokio::test]
    async fn save_routes_by_kind() {
        let store = MemoryStore::new(10);
        store
            .save(RecordKind::Position, vec![make_record("QF1")])
            .await
            .unwrap();

        assert_eq!(store.len(RecordKind::Position).await, 1);
        assert_eq!(store.len(RecordKind::Image).await, 0);
    }

    #[tokio::test]
    async fn save_evicts_oldest_when_at_capacity() {
        let store = MemoryStore::new(3);
        let batch = ["A", "B", "C", "D"].iter().map(|k| make_record(k)).collect();
        store.save(RecordKind::Position, batch).await.unwrap();

        let all = store.records(RecordKind::Position).await;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].identity_key.as_deref(), Some("B"));
        assert_eq!(all[2].identity_key.as_deref(), Some("D"));
    }

    #[tokio::test]
    async fn clear_empties_every_kind() {
        let store = MemoryStore::new(10);
        store
            .save(RecordKind::Position, vec![make_record("A")])
            .await
            .unwrap();
        store.clear().await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn zero_capacity_store_reports_unavailable() {
        let store = MemoryStore::new(0);
        let result = store.save(RecordKind::Position, vec![make_record("A")]).await;
        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
    }
}
