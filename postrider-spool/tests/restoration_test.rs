//! Tests that queue state survives a process restart.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use postrider_common::envelope::Envelope;
use postrider_spool::{
    BackingStore, DeliveryStatus, Disposition, FileBackingStore, QueueStore,
};

const MAX_SIZE: usize = 1024 * 1024;

fn envelope() -> Envelope {
    Envelope::new(
        "sender@example.com".to_owned(),
        vec!["rcpt@example.com".to_owned(), "cc@example.com".to_owned()],
        b"Subject: restart\r\n\r\nstill here\r\n".to_vec(),
    )
}

async fn open(dir: &std::path::Path) -> QueueStore {
    let backend = FileBackingStore::open(dir).await.expect("open backend");
    QueueStore::open(Arc::new(backend) as Arc<dyn BackingStore>, MAX_SIZE)
        .await
        .expect("open store")
}

#[tokio::test]
async fn accepted_message_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");

    let id = {
        let store = open(dir.path()).await;
        store.enqueue(envelope()).await.expect("enqueue")
    };

    let restarted = open(dir.path()).await;
    let record = restarted.get(id).await.expect("get");

    assert_eq!(record.status, DeliveryStatus::Pending);
    assert_eq!(record.envelope, envelope());
    assert_eq!(record.attempt_count, 0);
}

#[tokio::test]
async fn in_flight_record_is_requeued_on_startup() {
    let dir = tempfile::tempdir().expect("tempdir");

    let id = {
        let store = open(dir.path()).await;
        let id = store.enqueue(envelope()).await.expect("enqueue");
        let leased = store
            .lease_next(SystemTime::now() + Duration::from_secs(1))
            .await
            .expect("lease")
            .expect("record due");
        assert_eq!(leased.id, id);
        // "Crash" while the attempt is outstanding
        id
    };

    let restarted = open(dir.path()).await;
    assert_eq!(
        restarted.get(id).await.expect("get").status,
        DeliveryStatus::InFlight,
        "the stale lease is still on disk before recovery"
    );

    let recovered = restarted.recover().await.expect("recover");
    assert_eq!(recovered, 1);

    let record = restarted.get(id).await.expect("get");
    assert_eq!(record.status, DeliveryStatus::Pending);
    assert_eq!(record.attempt_count, 0, "interrupted attempt is not counted");

    // And it is immediately leasable again
    let leased = restarted
        .lease_next(SystemTime::now() + Duration::from_secs(1))
        .await
        .expect("lease")
        .expect("record due");
    assert_eq!(leased.id, id);
}

#[tokio::test]
async fn retry_schedule_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");

    let id = {
        let store = open(dir.path()).await;
        let id = store.enqueue(envelope()).await.expect("enqueue");
        store
            .lease_next(SystemTime::now() + Duration::from_secs(1))
            .await
            .expect("lease");
        store
            .complete(
                id,
                Disposition::Retry {
                    delay: Duration::from_secs(300),
                    error: "451 4.3.2 system not accepting messages".to_owned(),
                },
            )
            .await
            .expect("complete");
        id
    };

    let restarted = open(dir.path()).await;
    let recovered = restarted.recover().await.expect("recover");
    assert_eq!(recovered, 0, "a scheduled retry is not a stale lease");

    let record = restarted.get(id).await.expect("get");
    assert_eq!(record.status, DeliveryStatus::Retrying);
    assert_eq!(record.attempt_count, 1);
    assert_eq!(
        record.last_error.as_deref(),
        Some("451 4.3.2 system not accepting messages")
    );

    // Not due yet
    assert_eq!(
        restarted
            .lease_next(SystemTime::now())
            .await
            .expect("lease"),
        None
    );
}

#[tokio::test]
async fn terminal_records_stay_terminal_across_restart() {
    let dir = tempfile::tempdir().expect("tempdir");

    let id = {
        let store = open(dir.path()).await;
        let id = store.enqueue(envelope()).await.expect("enqueue");
        store
            .lease_next(SystemTime::now() + Duration::from_secs(1))
            .await
            .expect("lease");
        store
            .complete(id, Disposition::Delivered)
            .await
            .expect("complete");
        id
    };

    let restarted = open(dir.path()).await;
    restarted.recover().await.expect("recover");

    let record = restarted.get(id).await.expect("get");
    assert_eq!(record.status, DeliveryStatus::Delivered);
    assert_eq!(
        restarted
            .lease_next(SystemTime::now() + Duration::from_secs(3600))
            .await
            .expect("lease"),
        None,
        "terminal records are never dispatched again"
    );
}
