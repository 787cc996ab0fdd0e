//! In-memory window store.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{StoreError, WindowStore};
use crate::quota::WindowRecord;

/// Window store backed by a concurrent in-process map.
///
/// State is lost on restart and not shared across processes, so this backend
/// only suits tests and single-instance deployments.
#[derive(Default)]
pub struct MemoryWindowStore {
    records: DashMap<String, WindowRecord>,
}

impl MemoryWindowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of records currently held.
    ///
    /// This is primarily useful for testing.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn load(&self, client_id: &str) -> Result<Option<WindowRecord>, StoreError> {
        Ok(self.records.get(client_id).map(|record| record.clone()))
    }

    async fn store(&self, client_id: &str, record: &WindowRecord) -> Result<(), StoreError> {
        self.records.insert(client_id.to_string(), record.clone());
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_absent_record() {
        let store = MemoryWindowStore::new();
        assert_eq!(store.load("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let store = MemoryWindowStore::new();
        let record = WindowRecord {
            started_at: 100,
            expires_at: 1000,
            remaining: 7,
        };

        store.store("client_a", &record).await.unwrap();

        assert_eq!(store.load("client_a").await.unwrap(), Some(record));
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn test_store_replaces_in_place() {
        let store = MemoryWindowStore::new();
        let first = WindowRecord {
            started_at: 100,
            expires_at: 1000,
            remaining: 7,
        };
        let second = WindowRecord {
            started_at: 1000,
            expires_at: 1900,
            remaining: 449,
        };

        store.store("client_a", &first).await.unwrap();
        store.store("client_a", &second).await.unwrap();

        assert_eq!(store.load("client_a").await.unwrap(), Some(second));
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn test_always_ready() {
        let store = MemoryWindowStore::new();
        assert!(store.is_ready().await);
    }
}
