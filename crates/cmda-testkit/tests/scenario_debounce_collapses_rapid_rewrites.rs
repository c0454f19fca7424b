//! Scenario: Debounce Collapses Rapid Rewrites
//!
//! # Invariant under test
//! POS software rewrites an export file several times while the order is
//! being finalized. Every filesystem event resets the quiet-window timer;
//! only ONE ingestion run happens per burst, producing one order, one
//! notification, and one print job.

use std::time::Duration;

use cmda_ingest::IngestConfig;
use cmda_testkit::{pipeline, NotifierEvent, TestPipeline};

async fn fast_pipeline(dir: &tempfile::TempDir) -> TestPipeline {
    let mut config = IngestConfig::new("co-1");
    config.quiet_window = Duration::from_millis(50);
    pipeline(&dir.path().join("queue.json"), config)
        .await
        .unwrap()
}

#[tokio::test]
async fn burst_of_events_yields_exactly_one_ingestion() {
    let dir = tempfile::tempdir().unwrap();
    let p = fast_pipeline(&dir).await;

    let path = dir.path().join("order-9.posprt");
    tokio::fs::write(
        &path,
        r#"{"id":"order-9","customer":{"name":"Ana"},"total":{"orderAmount":10.00}}"#,
    )
    .await
    .unwrap();

    // Three rapid events for the same file: each one must reset the timer,
    // not stack three processing runs.
    p.svc.notify_file_event(path.clone());
    p.svc.notify_file_event(path.clone());
    p.svc.notify_file_event(path.clone());
    assert_eq!(p.svc.pending_debounce(), 1, "one timer per external id");

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(p.store.order_count(), 1, "burst must produce a single order");
    assert_eq!(
        p.notifier.events(),
        vec![NotifierEvent::Created("order-9".to_string())]
    );
    assert_eq!(p.queue.pending().await.len(), 1, "one ticket per burst");

    // The source file was archived out of the watch directory.
    assert!(!path.exists(), "export must be moved after ingestion");
    let mut processed = tokio::fs::read_dir(dir.path().join("processed"))
        .await
        .unwrap();
    assert!(processed.next_entry().await.unwrap().is_some());
}

#[tokio::test]
async fn events_for_archived_or_foreign_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let p = fast_pipeline(&dir).await;

    p.svc.notify_file_event(dir.path().join("notes.txt"));
    p.svc
        .notify_file_event(dir.path().join("processed").join("123-order-1.posprt"));
    assert_eq!(p.svc.pending_debounce(), 0, "non-exports must not arm timers");

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(p.store.order_count(), 0);
}

#[tokio::test]
async fn file_vanishing_before_quiet_window_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let p = fast_pipeline(&dir).await;

    // Event fires but the file is never written (vanished mid-rewrite).
    p.svc.notify_file_event(dir.path().join("ghost.posprt"));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(p.store.order_count(), 0);
    assert!(p.notifier.events().is_empty());
    assert!(p.queue.pending().await.is_empty());
}
