use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;

use crate::{MessageId, MessageRecord, SpoolError, backends::BackingStore};

/// In-memory backing store implementation
///
/// Stores records in a `HashMap` protected by an `RwLock`. Primarily intended
/// for testing, but can also be used where losing the queue on restart is
/// acceptable.
///
/// # Capacity Management
/// The store can be configured with a maximum capacity to bound memory growth.
/// When capacity is reached, storing a new record fails with an error.
#[derive(Debug, Clone)]
pub struct MemoryBackingStore {
    records: Arc<RwLock<HashMap<MessageId, MessageRecord>>>,
    /// Maximum number of records to store (None = unlimited)
    capacity: Option<usize>,
}

impl MemoryBackingStore {
    /// Create a new empty memory-backed store with unlimited capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            capacity: None,
        }
    }

    /// Create a new memory-backed store with a capacity limit
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            capacity: Some(capacity),
        }
    }

    /// Get the current number of records in the store
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the configured capacity (None = unlimited)
    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl Default for MemoryBackingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackingStore for MemoryBackingStore {
    async fn store(&self, record: &MessageRecord) -> crate::Result<()> {
        // Overwrites of an existing record never count against capacity
        if let Some(cap) = self.capacity
            && !self.records.read()?.contains_key(&record.id)
            && self.len() >= cap
        {
            return Err(SpoolError::Internal(format!(
                "Memory spool capacity exceeded: {}/{} records",
                self.len(),
                cap
            )));
        }

        self.records.write()?.insert(record.id, record.clone());

        Ok(())
    }

    async fn load(&self, id: MessageId) -> crate::Result<MessageRecord> {
        self.records
            .read()?
            .get(&id)
            .cloned()
            .ok_or(SpoolError::UnknownId(id))
    }

    async fn load_all(&self) -> crate::Result<Vec<MessageRecord>> {
        Ok(self.records.read()?.values().cloned().collect())
    }

    async fn remove(&self, id: MessageId) -> crate::Result<()> {
        self.records
            .write()?
            .remove(&id)
            .ok_or(SpoolError::UnknownId(id))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::SystemTime;

    use postrider_common::envelope::Envelope;

    use crate::record::DeliveryStatus;

    use super::*;

    fn record(data: &str) -> MessageRecord {
        MessageRecord::accept(
            Envelope::new(
                "sender@example.com".to_owned(),
                vec!["rcpt@example.com".to_owned()],
                data.as_bytes().to_vec(),
            ),
            SystemTime::now(),
        )
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    async fn test_memory_store_basic_operations() {
        let store = MemoryBackingStore::new();
        let rec = record("test message");

        store.store(&rec).await.expect("Failed to store");

        let all = store.load_all().await.expect("Failed to load all");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], rec);

        let loaded = store.load(rec.id).await.expect("Failed to load");
        assert_eq!(loaded.envelope.data(), rec.envelope.data());

        store.remove(rec.id).await.expect("Failed to remove");
        assert!(store.load_all().await.expect("Failed to load all").is_empty());
        assert!(matches!(
            store.load(rec.id).await,
            Err(SpoolError::UnknownId(_))
        ));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    async fn test_overwrite_replaces_record() {
        let store = MemoryBackingStore::new();
        let mut rec = record("test message");

        store.store(&rec).await.expect("Failed to store");

        rec.status = DeliveryStatus::InFlight;
        store.store(&rec).await.expect("Failed to overwrite");

        let loaded = store.load(rec.id).await.expect("Failed to load");
        assert_eq!(loaded.status, DeliveryStatus::InFlight);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    async fn test_memory_store_capacity_limit() {
        let store = MemoryBackingStore::with_capacity(2);

        let first = record("message 1");
        let second = record("message 2");
        store.store(&first).await.expect("First store should succeed");
        store
            .store(&second)
            .await
            .expect("Second store should succeed");

        // Third record should be refused
        let third = record("message 3");
        let result = store.store(&third).await;
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("capacity exceeded")
        );

        // Overwriting an existing record is always allowed
        store.store(&first).await.expect("Overwrite should succeed");

        // After removing one, a new record fits again
        store.remove(first.id).await.expect("Failed to remove");
        store.store(&third).await.expect("Store should succeed");
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    async fn test_unique_id_generation() {
        let store = MemoryBackingStore::new();

        let mut handles = vec![];
        for i in 0..100 {
            let store_clone = store.clone();
            handles.push(tokio::spawn(async move {
                let rec = record(&format!("message {i}"));
                store_clone.store(&rec).await
            }));
        }

        for handle in handles {
            handle.await.expect("Task panicked").expect("Store failed");
        }

        let all = store.load_all().await.expect("Failed to load all");
        assert_eq!(all.len(), 100);

        let mut id_set = std::collections::HashSet::new();
        for rec in &all {
            assert!(id_set.insert(rec.id), "Found duplicate ID: {}", rec.id);
        }
    }

    #[test]
    fn test_capacity_methods() {
        let unlimited = MemoryBackingStore::new();
        assert_eq!(unlimited.capacity(), None);

        let limited = MemoryBackingStore::with_capacity(100);
        assert_eq!(limited.capacity(), Some(100));
    }
}
