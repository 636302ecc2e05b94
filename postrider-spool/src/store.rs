use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime},
};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use postrider_common::envelope::Envelope;

use crate::{
    Disposition, MessageId, MessageRecord, SpoolError,
    backends::BackingStore,
    error::Result,
    record::DeliveryStatus,
};

/// Snapshot of queue accounting, as served by the stats endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub pending: u64,
    pub in_flight: u64,
    pub retrying: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Total delivery attempts made over the life of this store.
    pub attempts: u64,
}

impl Counters {
    /// Number of records still owed a delivery.
    #[must_use]
    pub const fn depth(&self) -> u64 {
        self.pending + self.in_flight + self.retrying
    }
}

/// The durable message queue.
///
/// All mutations go through the [`BackingStore`] before they are acknowledged,
/// so an accepted message survives a process crash. An in-memory index mirrors
/// the backend and serves reads and lease selection; the index mutex is held
/// across the persist so that `lease_next` is a single indivisible operation
/// under concurrent workers.
#[derive(Debug)]
pub struct QueueStore {
    backend: Arc<dyn BackingStore>,
    index: Mutex<HashMap<MessageId, MessageRecord>>,
    max_message_size: usize,
    attempts: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl QueueStore {
    /// Open a queue store over a backend, loading every persisted record into
    /// the index.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub async fn open(
        backend: Arc<dyn BackingStore>,
        max_message_size: usize,
    ) -> Result<Self> {
        let records = backend.load_all().await?;

        let mut delivered = 0;
        let mut failed = 0;
        let mut index = HashMap::with_capacity(records.len());
        for record in records {
            match record.status {
                DeliveryStatus::Delivered => delivered += 1,
                DeliveryStatus::Failed => failed += 1,
                _ => {}
            }
            index.insert(record.id, record);
        }

        info!("Opened queue store with {} records", index.len());

        Ok(Self {
            backend,
            index: Mutex::new(index),
            max_message_size,
            attempts: AtomicU64::new(0),
            delivered: AtomicU64::new(delivered),
            failed: AtomicU64::new(failed),
        })
    }

    /// Validate and accept an envelope into the queue.
    ///
    /// The record is persisted before the ID is returned; a crash after this
    /// call returns cannot lose the message.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::InvalidEnvelope`] if the envelope fails
    /// validation, or a backend error if the record could not be persisted.
    pub async fn enqueue(&self, envelope: Envelope) -> Result<MessageId> {
        envelope.validate(self.max_message_size)?;

        let record = MessageRecord::accept(envelope, SystemTime::now());
        let id = record.id;

        let mut index = self.index.lock().await;
        self.backend.store(&record).await?;
        index.insert(id, record);

        debug!("Enqueued message {id}");

        Ok(id)
    }

    /// Atomically lease the next eligible record.
    ///
    /// Selects the `Pending` or `Retrying` record with `next_attempt_at <=
    /// now`, preferring the earliest `next_attempt_at` and breaking ties by
    /// `created_at`, transitions it to `InFlight`, and persists the transition
    /// before returning. No two concurrent callers can lease the same record.
    ///
    /// Returns `Ok(None)` when nothing is currently eligible.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the transition could not be persisted; the
    /// record stays eligible in that case.
    pub async fn lease_next(&self, now: SystemTime) -> Result<Option<MessageRecord>> {
        let mut index = self.index.lock().await;

        let Some(id) = index
            .values()
            .filter(|record| record.is_eligible(now))
            .min_by(|a, b| {
                a.next_attempt_at
                    .cmp(&b.next_attempt_at)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            })
            .map(|record| record.id)
        else {
            return Ok(None);
        };

        let mut leased = index
            .get(&id)
            .cloned()
            .ok_or(SpoolError::UnknownId(id))?;
        leased.status = DeliveryStatus::InFlight;
        leased.updated_at = now;

        // Persist before committing to the index; on failure the in-memory
        // state is untouched and the record remains eligible.
        self.backend.store(&leased).await?;
        index.insert(id, leased.clone());

        debug!("Leased message {id} (attempt {})", leased.attempt_count + 1);

        Ok(Some(leased))
    }

    /// Record the outcome of a delivery attempt for a leased record.
    ///
    /// Every disposition counts as one attempt. `Retry` schedules the record
    /// for `now + delay`; `Delivered` and `Failed` are terminal.
    ///
    /// # Errors
    ///
    /// [`SpoolError::UnknownId`] if no such record exists,
    /// [`SpoolError::NotLeased`] if the record is not `InFlight` (completing
    /// twice, or completing something never leased), or a backend error if
    /// the transition could not be persisted.
    pub async fn complete(&self, id: MessageId, disposition: Disposition) -> Result<()> {
        let now = SystemTime::now();
        let mut index = self.index.lock().await;

        let current = index.get(&id).ok_or(SpoolError::UnknownId(id))?;
        if current.status != DeliveryStatus::InFlight {
            return Err(SpoolError::NotLeased(id));
        }

        let mut updated = current.clone();
        updated.attempt_count += 1;
        updated.updated_at = now;

        match disposition {
            Disposition::Delivered => {
                updated.status = DeliveryStatus::Delivered;
                updated.last_error = None;
            }
            Disposition::Retry { delay, error } => {
                updated.status = DeliveryStatus::Retrying;
                updated.next_attempt_at = now + delay;
                updated.last_error = Some(error);
            }
            Disposition::Failed { error } => {
                updated.status = DeliveryStatus::Failed;
                updated.last_error = Some(error);
            }
        }

        self.backend.store(&updated).await?;

        match updated.status {
            DeliveryStatus::Delivered => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            DeliveryStatus::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        self.attempts.fetch_add(1, Ordering::Relaxed);

        debug!(
            "Completed attempt {} for message {id}: now {}",
            updated.attempt_count, updated.status
        );

        index.insert(id, updated);

        Ok(())
    }

    /// Whether any record could be leased at `now`.
    ///
    /// A cheap read for callers that want to avoid spending a rate-limit
    /// grant when the queue has nothing due.
    pub async fn has_eligible(&self, now: SystemTime) -> bool {
        self.index
            .lock()
            .await
            .values()
            .any(|record| record.is_eligible(now))
    }

    /// Fetch a record by ID.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::UnknownId`] if no such record exists.
    pub async fn get(&self, id: MessageId) -> Result<MessageRecord> {
        self.index
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(SpoolError::UnknownId(id))
    }

    /// All records currently in `status`, oldest first.
    pub async fn list_by_status(&self, status: DeliveryStatus) -> Vec<MessageRecord> {
        let mut records: Vec<_> = self
            .index
            .lock()
            .await
            .values()
            .filter(|record| record.status == status)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records
    }

    /// Current queue accounting.
    pub async fn counters(&self) -> Counters {
        let index = self.index.lock().await;

        let mut counters = Counters {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            ..Counters::default()
        };

        for record in index.values() {
            match record.status {
                DeliveryStatus::Pending => counters.pending += 1,
                DeliveryStatus::InFlight => counters.in_flight += 1,
                DeliveryStatus::Retrying => counters.retrying += 1,
                DeliveryStatus::Delivered | DeliveryStatus::Failed => {}
            }
        }

        counters
    }

    /// Requeue every `InFlight` record to `Pending`.
    ///
    /// Run once at startup: a record that was mid-attempt when the previous
    /// process died must become eligible again rather than stay leased
    /// forever. The interrupted attempt does not count against the retry
    /// budget.
    ///
    /// Returns the number of records requeued.
    ///
    /// # Errors
    ///
    /// Returns a backend error if a requeued record could not be persisted.
    pub async fn recover(&self) -> Result<usize> {
        let now = SystemTime::now();
        let mut index = self.index.lock().await;

        let stranded: Vec<MessageId> = index
            .values()
            .filter(|record| record.status == DeliveryStatus::InFlight)
            .map(|record| record.id)
            .collect();

        for id in &stranded {
            let Some(current) = index.get(id) else {
                continue;
            };
            let mut requeued = current.clone();
            requeued.status = DeliveryStatus::Pending;
            requeued.next_attempt_at = now;
            requeued.updated_at = now;

            self.backend.store(&requeued).await?;
            index.insert(*id, requeued);

            info!("Recovered in-flight message {id}, requeued as pending");
        }

        Ok(stranded.len())
    }

    /// Remove terminal records whose last update is older than `retention`.
    ///
    /// Returns the number of records purged.
    ///
    /// # Errors
    ///
    /// Returns a backend error if a record could not be removed.
    pub async fn purge_terminal(&self, retention: Duration) -> Result<usize> {
        let cutoff = SystemTime::now() - retention;
        let mut index = self.index.lock().await;

        let expired: Vec<MessageId> = index
            .values()
            .filter(|record| record.status.is_terminal() && record.updated_at <= cutoff)
            .map(|record| record.id)
            .collect();

        for id in &expired {
            self.backend.remove(*id).await?;
            index.remove(id);
            debug!("Purged terminal message {id}");
        }

        Ok(expired.len())
    }
}
