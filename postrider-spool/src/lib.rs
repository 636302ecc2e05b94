//! Durable queue store for the relay.
//!
//! Accepted messages are persisted as records with a delivery lifecycle
//! (`Pending` → `InFlight` → `Delivered`/`Retrying`/`Failed`) through a
//! pluggable [`BackingStore`]. The [`QueueStore`] guarantees that a record
//! is owned by at most one worker at a time and that no acknowledged message
//! is lost across restarts.

pub mod backends;
pub mod error;
pub mod record;
pub mod store;
pub mod types;

pub use backends::{BackingStore, FileBackingStore, MemoryBackingStore};
pub use error::{Result, SpoolError};
pub use record::{DeliveryStatus, Disposition, MessageRecord};
pub use store::{Counters, QueueStore};
pub use types::MessageId;
