//! Scenario: No Agent — Job Waits for a Connection
//!
//! # Invariant under test
//! With no connected agent (or only non-matching ones) a job stays
//! queued through every retry pass, and is delivered on the first pass
//! after a covering agent connects. Store-targeted jobs only go to
//! agents covering that store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cmda_printqueue::{AgentHandle, DispatchConfig, Dispatcher, PrintQueue};
use cmda_schemas::print::{PrintJobDraft, RenderedTicket};
use cmda_testkit::ScriptedAgents;
use serde_json::json;

fn draft(order: &str, store: Option<&str>) -> PrintJobDraft {
    PrintJobDraft {
        company_id: "co-1".to_string(),
        target_store_id: store.map(str::to_string),
        order_external_id: order.to_string(),
        payload: RenderedTicket {
            ticket_text: "T".to_string(),
            order_summary: json!({}),
        },
    }
}

fn agent(id: &str, stores: &[&str]) -> AgentHandle {
    AgentHandle {
        agent_id: id.to_string(),
        company_id: "co-1".to_string(),
        store_ids: stores.iter().map(|s| s.to_string()).collect(),
        connected_at_utc: Utc::now(),
    }
}

fn fast_config() -> DispatchConfig {
    DispatchConfig {
        ack_timeout: Duration::from_millis(10),
        retry_delays: vec![Duration::from_millis(0), Duration::from_millis(0)],
    }
}

#[tokio::test]
async fn job_stays_queued_until_agent_connects() {
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(
        PrintQueue::open(dir.path().join("queue.json"))
            .await
            .unwrap(),
    );
    queue.enqueue(draft("o1", None)).await.unwrap();

    let agents = ScriptedAgents::new();
    let dispatcher = Dispatcher::new(queue.clone(), agents.clone(), fast_config());

    let report = dispatcher.process_with_retry("co-1").await.unwrap();
    assert!(report.delivered.is_empty());
    assert_eq!(report.pending.len(), 1, "job must wait, not drop");
    assert_eq!(queue.pending().await.len(), 1);

    // An agent connects; the next pass delivers.
    agents.connect(agent("late", &[]), true);
    let report = dispatcher.process_company("co-1").await.unwrap();
    assert_eq!(report.delivered.len(), 1);
    assert!(queue.pending().await.is_empty());
}

#[tokio::test]
async fn store_targeted_job_ignores_non_covering_agents() {
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(
        PrintQueue::open(dir.path().join("queue.json"))
            .await
            .unwrap(),
    );
    queue.enqueue(draft("o1", Some("s2"))).await.unwrap();

    let agents = ScriptedAgents::new();
    agents.connect(agent("wrong-store", &["s1"]), true);
    let dispatcher = Dispatcher::new(queue.clone(), agents.clone(), fast_config());

    let report = dispatcher.process_company("co-1").await.unwrap();
    assert!(report.delivered.is_empty());
    assert!(
        agents.calls().is_empty(),
        "a non-covering agent must not even be asked"
    );

    agents.connect(agent("right-store", &["s2"]), true);
    let report = dispatcher.process_company("co-1").await.unwrap();
    assert_eq!(report.delivered.len(), 1);
    assert_eq!(agents.calls().len(), 1);
    assert_eq!(agents.calls()[0].0, "right-store");
}
