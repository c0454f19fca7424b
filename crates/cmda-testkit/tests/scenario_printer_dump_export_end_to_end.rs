//! Scenario: Printer-dump Export, End to End
//!
//! # Invariant under test
//! A vendor export that only carries thermal-printer rows flows through
//! the whole pipeline: rows are scraped into a structured order, the
//! customer is matched by phone ahead of name, and the re-rendered
//! ticket is queued.

use cmda_ingest::IngestConfig;
use cmda_testkit::{pipeline, MemoryCustomer};
use serde_json::json;

#[tokio::test]
async fn dump_export_is_scraped_persisted_and_reprinted() {
    let dir = tempfile::tempdir().unwrap();
    let p = pipeline(&dir.path().join("queue.json"), IngestConfig::new("co-1"))
        .await
        .unwrap();
    // Same phone, different name: the phone match must win and no new
    // customer may be created.
    p.store.seed_customer(MemoryCustomer {
        id: "cust-known".to_string(),
        company_id: "co-1".to_string(),
        name: Some("C. Lopes".to_string()),
        phone: Some("08007051020".to_string()),
        address: None,
    });

    let payload = json!({
        "printRows": [
            { "text": "<b>OLD DOG</b>" },
            { "text": "Pedido: #73" },
            { "text": "Chris Lopes" },
            { "text": "Telefone: 0800 705 1020" },
            { "text": "R. Pau Brasil, 101, Casa - Pequi" },
            { "text": "1  Double dog                          19.90" },
            { "text": "Total itens                            19.90" },
            { "text": "Taxa de entrega(+)                      4.99" },
            { "text": "TOTAL(=)                               24.89" },
            { "text": "Forma de pagamento" },
            { "text": "Dinheiro                               24.89" }
        ]
    });
    let path = dir.path().join("export-73.posprt");
    tokio::fs::write(&path, serde_json::to_vec(&payload).unwrap())
        .await
        .unwrap();

    let record = p.svc.process_file(&path).await.unwrap().unwrap();

    assert_eq!(record.order.display_id.as_deref(), Some("73"));
    assert_eq!(record.order.customer.name.as_deref(), Some("Chris Lopes"));
    assert_eq!(record.order.customer.phone.as_deref(), Some("08007051020"));
    assert_eq!(record.order.items.len(), 1);
    assert_eq!(record.order.items[0].unit_price_cents, 1990);
    assert_eq!(record.order.totals.grand_total_cents, 2489);
    assert_eq!(record.order.payments[0].method, "CASH");

    assert_eq!(
        record.customer_id.as_deref(),
        Some("cust-known"),
        "phone match must beat the name mismatch"
    );
    assert_eq!(p.store.customer_count(), 1, "no duplicate customer created");

    let pending = p.queue.pending().await;
    assert_eq!(pending.len(), 1);
    let ticket = &pending[0].payload.ticket_text;
    assert!(ticket.contains("CHRIS LOPES"), "{ticket}");
    assert!(ticket.contains("1x Double dog  19.90"), "{ticket}");
    assert!(ticket.contains("TOTAL:          24.89"), "{ticket}");
}
