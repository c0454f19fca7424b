//! Scenario: Denied Transition Is Ignored
//!
//! # Invariant under test
//! A webhook status event whose transition the lifecycle graph forbids
//! is a silent no-op: the stored status and history are unchanged and no
//! update notification goes out. Allowed transitions update the record
//! and append to the history.

use cmda_ingest::{IngestConfig, WebhookEvent, WebhookOutcome};
use cmda_testkit::{pipeline, NotifierEvent, TestPipeline};
use serde_json::json;

async fn webhook_pipeline(dir: &tempfile::TempDir) -> TestPipeline {
    let p = pipeline(&dir.path().join("queue.json"), IngestConfig::new("co-1"))
        .await
        .unwrap();
    p.store.map_merchant("m-1", "co-1", None);
    p
}

fn placed(id: &str) -> WebhookEvent {
    WebhookEvent::OrderPlaced {
        merchant_id: "m-1".to_string(),
        payload: json!({
            "id": id,
            "customer": { "name": "Bia" },
            "total": { "orderAmount": 25.00 }
        }),
    }
}

fn status(id: &str, to: &str) -> WebhookEvent {
    WebhookEvent::StatusChanged {
        merchant_id: "m-1".to_string(),
        external_id: id.to_string(),
        status: to.to_string(),
    }
}

#[tokio::test]
async fn stale_delivered_event_on_new_order_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let p = webhook_pipeline(&dir).await;

    let outcome = p.svc.ingest_webhook(placed("wh-1")).await.unwrap();
    let record = match outcome {
        WebhookOutcome::Created(r) => r,
        other => panic!("expected creation, got {other:?}"),
    };
    assert_eq!(record.status, "NEW", "webhook orders start unconfirmed");
    assert_eq!(record.history.len(), 1);

    // DELIVERED cannot follow NEW.
    let outcome = p
        .svc
        .ingest_webhook(status("wh-1", "DELIVERED"))
        .await
        .unwrap();
    match outcome {
        WebhookOutcome::Denied { from, to } => {
            assert_eq!(from, "NEW");
            assert_eq!(to, "DELIVERED");
        }
        other => panic!("expected denial, got {other:?}"),
    }
    let stored = p.store.order("co-1", "wh-1").unwrap();
    assert_eq!(stored.status, "NEW", "denied event must not mutate status");
    assert_eq!(stored.history.len(), 1, "denied event leaves no history");
    assert_eq!(
        p.notifier.events(),
        vec![NotifierEvent::Created("wh-1".to_string())],
        "no update notification for a denied event"
    );
}

#[tokio::test]
async fn allowed_chain_walks_the_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let p = webhook_pipeline(&dir).await;
    p.svc.ingest_webhook(placed("wh-2")).await.unwrap();

    for to in ["CONFIRMED", "IN_PREPARATION", "READY", "DISPATCHED", "DELIVERED"] {
        let outcome = p.svc.ingest_webhook(status("wh-2", to)).await.unwrap();
        assert!(
            matches!(outcome, WebhookOutcome::Updated(_)),
            "transition to {to} should be allowed"
        );
    }

    let stored = p.store.order("co-1", "wh-2").unwrap();
    assert_eq!(stored.status, "DELIVERED");
    assert_eq!(stored.history.len(), 6, "creation plus five transitions");
    assert_eq!(stored.history[1].from.as_deref(), Some("NEW"));
    assert_eq!(stored.history[5].to, "DELIVERED");

    // Terminal: a late cancel is denied.
    let outcome = p
        .svc
        .ingest_webhook(status("wh-2", "CANCELED"))
        .await
        .unwrap();
    assert!(matches!(outcome, WebhookOutcome::Denied { .. }));
}

#[tokio::test]
async fn provider_spelling_of_cancelled_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let p = webhook_pipeline(&dir).await;
    p.svc.ingest_webhook(placed("wh-3")).await.unwrap();

    let outcome = p
        .svc
        .ingest_webhook(status("wh-3", "CANCELLED"))
        .await
        .unwrap();
    assert!(matches!(outcome, WebhookOutcome::Updated(_)));
    assert_eq!(
        p.store.order("co-1", "wh-3").unwrap().status,
        "CANCELED",
        "status is stored in canonical spelling"
    );
}
