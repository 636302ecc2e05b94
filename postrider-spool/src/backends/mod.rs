//! Pluggable persistence backends for the queue store.
//!
//! A backend is a durable keyed store of [`MessageRecord`]s. The queue store
//! persists through the backend before acknowledging any mutation, so a
//! backend's `store` must not return until the record is safely written.

use async_trait::async_trait;

use crate::{MessageId, MessageRecord, error::Result};

pub mod fs;
pub mod memory;

pub use fs::FileBackingStore;
pub use memory::MemoryBackingStore;

#[async_trait]
pub trait BackingStore: std::fmt::Debug + Send + Sync {
    /// Write a record, replacing any previous version under the same ID.
    async fn store(&self, record: &MessageRecord) -> Result<()>;

    /// Load a single record.
    ///
    /// Returns [`SpoolError::UnknownId`](crate::SpoolError::UnknownId) if no
    /// record with this ID exists.
    async fn load(&self, id: MessageId) -> Result<MessageRecord>;

    /// Load every record the backend holds, in no particular order.
    async fn load_all(&self) -> Result<Vec<MessageRecord>>;

    /// Remove a record.
    async fn remove(&self, id: MessageId) -> Result<()>;
}
