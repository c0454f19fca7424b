//! Scenario: Malformed Export Yields the Fallback Order
//!
//! # Invariant under test
//! An export that decodes to nothing still produces a persisted,
//! printable order ("Imported", empty items) keyed by the file name.
//! Garbage input degrades; it never disappears.

use cmda_ingest::IngestConfig;
use cmda_testkit::pipeline;

#[tokio::test]
async fn garbage_payload_is_ingested_as_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(&dir.path().join("queue.json"), IngestConfig::new("co-1"))
        .await
        .unwrap();

    let path = dir.path().join("mystery-42.posprt");
    tokio::fs::write(&path, "### PRINTER DRIVER ERROR 0x0A ###")
        .await
        .unwrap();

    let record = p.svc.process_file(&path).await.unwrap().unwrap();

    assert_eq!(record.order.external_id, "mystery-42", "keyed by file name");
    assert_eq!(record.order.customer.name.as_deref(), Some("Imported"));
    assert!(record.order.items.is_empty());
    assert_eq!(record.order.totals.grand_total_cents, 0);
    assert_eq!(record.status, "IN_PREPARATION");

    // Still printable: the ticket was queued and carries the fallback name.
    let pending = p.queue.pending().await;
    assert_eq!(pending.len(), 1);
    assert!(
        pending[0].payload.ticket_text.contains("IMPORTED"),
        "ticket renders the fallback customer"
    );

    // The original text is retained for audit on the stored record.
    assert_eq!(
        record.order.raw_source.as_str(),
        Some("### PRINTER DRIVER ERROR 0x0A ###")
    );
    assert!(dir.path().join("processed").exists());
}
