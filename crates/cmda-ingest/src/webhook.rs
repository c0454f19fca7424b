//! Marketplace webhook path.
//!
//! Events arrive keyed by merchant id; the merchant→company mapping lives
//! in the store. Status events are gated by the order lifecycle: a denied
//! transition is an ignored stale event, not an error.

use serde_json::Value;

use cmda_lifecycle::{can_transition_str, OrderStatus};
use cmda_normalizer::map_structured;
use cmda_schemas::order::OrderRecord;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{history_entry, merge_orders, IngestError, IngestService, Notifier, OrderStore};

#[derive(Debug, Clone)]
pub enum WebhookEvent {
    /// A new (or re-sent) order with its full provider payload.
    OrderPlaced { merchant_id: String, payload: Value },
    /// A lifecycle update for an existing order.
    StatusChanged {
        merchant_id: String,
        external_id: String,
        status: String,
    },
}

#[derive(Debug)]
pub enum WebhookOutcome {
    Created(OrderRecord),
    Updated(OrderRecord),
    /// The requested transition is not allowed from the current status;
    /// nothing was changed.
    Denied { from: String, to: String },
}

impl<S: OrderStore + 'static, N: Notifier + 'static> IngestService<S, N> {
    pub async fn ingest_webhook(&self, event: WebhookEvent) -> Result<WebhookOutcome, IngestError> {
        match event {
            WebhookEvent::OrderPlaced {
                merchant_id,
                payload,
            } => self.webhook_order_placed(&merchant_id, payload).await,
            WebhookEvent::StatusChanged {
                merchant_id,
                external_id,
                status,
            } => {
                self.webhook_status_changed(&merchant_id, &external_id, &status)
                    .await
            }
        }
    }

    async fn webhook_order_placed(
        &self,
        merchant_id: &str,
        payload: Value,
    ) -> Result<WebhookOutcome, IngestError> {
        let company = self
            .store
            .find_company_by_merchant(merchant_id)
            .await?
            .ok_or_else(|| IngestError::UnknownMerchant(merchant_id.to_string()))?;

        let fallback_id = Uuid::new_v4().to_string();
        let order = map_structured(&payload, &fallback_id);

        match self
            .store
            .find_order(&company.company_id, &order.external_id)
            .await?
        {
            Some(mut record) => {
                record.order = merge_orders(&record.order, order);
                let record = self.store.upsert_order(record).await?;
                self.notifier.order_updated(&record).await;
                Ok(WebhookOutcome::Updated(record))
            }
            None => {
                // Webhook orders start unconfirmed; the store accepts or
                // cancels them from the dashboard.
                let record = self
                    .create_record(
                        &company.company_id,
                        company.store_id.clone(),
                        order,
                        OrderStatus::New,
                        "webhook",
                    )
                    .await?;
                self.notifier.order_created(&record).await;
                self.enqueue_ticket(&record).await?;
                self.drain_tickets(&record.company_id).await;
                info!(
                    merchant_id,
                    order_id = %record.id,
                    display_simple = ?record.display_simple,
                    "webhook order created"
                );
                Ok(WebhookOutcome::Created(record))
            }
        }
    }

    async fn webhook_status_changed(
        &self,
        merchant_id: &str,
        external_id: &str,
        status: &str,
    ) -> Result<WebhookOutcome, IngestError> {
        let company = self
            .store
            .find_company_by_merchant(merchant_id)
            .await?
            .ok_or_else(|| IngestError::UnknownMerchant(merchant_id.to_string()))?;

        let mut record = self
            .store
            .find_order(&company.company_id, external_id)
            .await?
            .ok_or_else(|| IngestError::UnknownOrder(external_id.to_string()))?;

        if !can_transition_str(&record.status, status) {
            warn!(
                external_id,
                from = %record.status,
                to = status,
                "transition denied, event ignored"
            );
            return Ok(WebhookOutcome::Denied {
                from: record.status.clone(),
                to: status.to_string(),
            });
        }

        let normalized = OrderStatus::parse(status)
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| status.to_uppercase());
        record.history.push(history_entry(
            Some(&record.status),
            &normalized,
            "webhook",
            None,
        ));
        record.status = normalized;

        let record = self.store.upsert_order(record).await?;
        self.notifier.order_updated(&record).await;
        Ok(WebhookOutcome::Updated(record))
    }
}
