use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The materialized print payload delivered to an agent: the rendered ticket
/// text plus a structured summary of the order it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedTicket {
    pub ticket_text: String,
    pub order_summary: Value,
}

/// What callers hand to the queue; the queue assigns id and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJobDraft {
    pub company_id: String,
    /// `None` means "any connected agent of this company".
    pub target_store_id: Option<String>,
    pub order_external_id: String,
    pub payload: RenderedTicket,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    /// Locally generated, ordered within a process lifetime (`pq-<millis>-<seq>`).
    pub id: String,
    pub company_id: String,
    pub target_store_id: Option<String>,
    pub order_external_id: String,
    pub payload: RenderedTicket,
    pub created_at_utc: DateTime<Utc>,
    pub delivered: bool,
    pub delivered_at_utc: Option<DateTime<Utc>>,
}
