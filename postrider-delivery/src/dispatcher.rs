//! The dispatcher: rate-limited worker loops draining the queue upstream.

use std::{
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use serde::{Deserialize, Serialize};
use tokio::{sync::broadcast, task::JoinSet};

use postrider_common::{Signal, internal};
use postrider_spool::{Disposition, MessageId, MessageRecord, QueueStore, SpoolError};

use crate::{
    error::{DeliveryError, TemporaryError},
    policy::{RetryDecision, RetryPolicy},
    rate_limiter::{RateLimitConfig, RateLimiter},
    transport::Transport,
};

/// Dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Upstream rate limit.
    #[serde(default)]
    pub rate: RateLimitConfig,

    /// Retry schedule for transient failures.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Number of concurrent delivery workers.
    ///
    /// Default: 2
    #[serde(default = "defaults::workers")]
    pub workers: usize,

    /// Deadline for a single delivery attempt (in seconds). An attempt that
    /// exceeds it counts as a transient failure.
    ///
    /// Default: 30
    #[serde(default = "defaults::attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// How long an idle or denied worker sleeps before looking again
    /// (in milliseconds).
    ///
    /// Default: 500
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Retention for delivered/failed records (in seconds). When set, a
    /// background sweep removes terminal records older than this.
    ///
    /// Default: unset (keep terminal records forever)
    #[serde(default)]
    pub retention_secs: Option<u64>,

    /// How often the retention sweep runs (in seconds).
    ///
    /// Default: 3600
    #[serde(default = "defaults::purge_interval_secs")]
    pub purge_interval_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            rate: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            workers: defaults::workers(),
            attempt_timeout_secs: defaults::attempt_timeout_secs(),
            poll_interval_ms: defaults::poll_interval_ms(),
            retention_secs: None,
            purge_interval_secs: defaults::purge_interval_secs(),
        }
    }
}

mod defaults {
    pub const fn workers() -> usize {
        2
    }

    pub const fn attempt_timeout_secs() -> u64 {
        30
    }

    pub const fn poll_interval_ms() -> u64 {
        500
    }

    pub const fn purge_interval_secs() -> u64 {
        3600
    }
}

/// Drives every queued message through its delivery lifecycle.
///
/// Each worker loop leases one eligible record at a time, so the queue
/// store's lease is the only coordination the workers need; the rate limiter
/// is shared across all of them, bounding the relay's aggregate throughput.
#[derive(Debug)]
pub struct Dispatcher {
    store: Arc<QueueStore>,
    limiter: RateLimiter,
    policy: RetryPolicy,
    transport: Arc<dyn Transport>,
    config: DeliveryConfig,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        store: Arc<QueueStore>,
        transport: Arc<dyn Transport>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(&config.rate),
            policy: config.retry.clone(),
            store,
            transport,
            config,
        }
    }

    /// Run the workers until a shutdown signal arrives, then drain.
    ///
    /// In-flight attempts finish (or hit their timeout) before workers exit;
    /// no new leases are taken after the signal.
    pub async fn serve(self: Arc<Self>, shutdown: broadcast::Receiver<Signal>) {
        let mut tasks = JoinSet::new();

        for worker in 0..self.config.workers.max(1) {
            let dispatcher = Arc::clone(&self);
            let shutdown = shutdown.resubscribe();
            tasks.spawn(async move { dispatcher.run_worker(worker, shutdown).await });
        }

        if let Some(retention_secs) = self.config.retention_secs {
            let dispatcher = Arc::clone(&self);
            let shutdown = shutdown.resubscribe();
            tasks.spawn(async move {
                dispatcher
                    .run_purge(Duration::from_secs(retention_secs), shutdown)
                    .await;
            });
        }

        drop(shutdown);

        while tasks.join_next().await.is_some() {}

        internal!(level = INFO, "Dispatcher drained");
    }

    async fn run_worker(&self, worker: usize, mut shutdown: broadcast::Receiver<Signal>) {
        internal!(level = DEBUG, "Delivery worker {worker} started");

        loop {
            let pause = self.step().await;

            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(_)) {
                        internal!(level = DEBUG, "Delivery worker {worker} stopping");
                        break;
                    }
                }

                () = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// One loop iteration. Returns how long the worker should pause before
    /// the next one: zero after useful work, the poll interval when idle,
    /// or the limiter's estimate when throttled.
    async fn step(&self) -> Duration {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let now = SystemTime::now();

        // Look before acquiring so an idle queue does not burn rate quota
        if !self.store.has_eligible(now).await {
            return poll;
        }

        if !self.limiter.try_acquire(Instant::now()) {
            let wait = self.limiter.time_until_available(Instant::now());
            return wait.max(Duration::from_millis(10));
        }

        match self.store.lease_next(now).await {
            Ok(Some(record)) => {
                self.attempt(record).await;
                Duration::ZERO
            }
            // Another worker got there first; the grant goes unused
            Ok(None) => poll,
            Err(err) => {
                internal!(level = WARN, "Leasing failed, backing off: {err}");
                poll
            }
        }
    }

    async fn attempt(&self, record: MessageRecord) {
        let timeout = Duration::from_secs(self.config.attempt_timeout_secs);
        let attempt = record.attempt_count + 1;
        let id = record.id;

        internal!(
            level = INFO,
            "Delivering message {id}, attempt {attempt}, {} recipient(s)",
            record.envelope.recipients().len()
        );

        let disposition =
            match tokio::time::timeout(timeout, self.transport.deliver(&record.envelope)).await {
                Ok(Ok(())) => {
                    internal!(level = INFO, "Message {id} delivered");
                    Disposition::Delivered
                }
                Ok(Err(error)) => self.disposition_for(id, attempt, &error),
                Err(_) => {
                    let error = DeliveryError::Temporary(TemporaryError::Timeout(format!(
                        "no response within {}s",
                        timeout.as_secs()
                    )));
                    self.disposition_for(id, attempt, &error)
                }
            };

        self.finish(id, disposition).await;
    }

    fn disposition_for(&self, id: MessageId, attempt: u32, error: &DeliveryError) -> Disposition {
        match self.policy.decide(attempt, error) {
            RetryDecision::Retry(delay) => {
                internal!(
                    level = WARN,
                    "Attempt {attempt} for message {id} failed, retrying in {}s: {error}",
                    delay.as_secs()
                );
                Disposition::Retry {
                    delay,
                    error: error.to_string(),
                }
            }
            RetryDecision::Fail => {
                internal!(
                    level = ERROR,
                    "Message {id} failed terminally on attempt {attempt}: {error}"
                );
                Disposition::Failed {
                    error: error.to_string(),
                }
            }
        }
    }

    /// Persist the outcome, retrying on store unavailability. The record is
    /// leased by this worker, so the completion must not be dropped; only a
    /// lease-accounting error (a bug, or a competing completion) gives up.
    async fn finish(&self, id: MessageId, disposition: Disposition) {
        let poll = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            match self.store.complete(id, disposition.clone()).await {
                Ok(()) => break,
                Err(err @ (SpoolError::UnknownId(_) | SpoolError::NotLeased(_))) => {
                    internal!(level = ERROR, "Refusing to complete message {id}: {err}");
                    break;
                }
                Err(err) => {
                    internal!(
                        level = WARN,
                        "Store error completing message {id}, backing off: {err}"
                    );
                    tokio::time::sleep(poll).await;
                }
            }
        }
    }

    async fn run_purge(&self, retention: Duration, mut shutdown: broadcast::Receiver<Signal>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.purge_interval_secs.max(1)));
        // The immediate first tick would purge at startup; skip it
        interval.tick().await;

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(_)) {
                        break;
                    }
                }

                _ = interval.tick() => {
                    match self.store.purge_terminal(retention).await {
                        Ok(0) => {}
                        Ok(purged) => {
                            internal!(level = INFO, "Purged {purged} terminal record(s)");
                        }
                        Err(err) => internal!(level = WARN, "Retention sweep failed: {err}"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: DeliveryConfig = toml::from_str("").expect("empty config should parse");
        assert_eq!(config.workers, 2);
        assert_eq!(config.attempt_timeout_secs, 30);
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.retention_secs, None);
        assert_eq!(config.rate.rate_limit, 100);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_config_overrides() {
        let config: DeliveryConfig = toml::from_str(
            r#"
            workers = 4
            attempt_timeout_secs = 10
            retention_secs = 600

            [rate]
            rate_limit = 10
            rate_window_secs = 60

            [retry]
            max_retries = 2
            retry_delay_secs = 5
            backoff = "exponential"
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.workers, 4);
        assert_eq!(config.retention_secs, Some(600));
        assert_eq!(config.rate.rate_limit, 10);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.backoff, crate::policy::Backoff::Exponential);
    }
}
