//! Order ingestion orchestration.
//!
//! Two entry paths converge on the same persistence and printing flow:
//! dropped POS export files (debounced, re-import aware) and marketplace
//! webhooks (merchant-resolved, lifecycle-gated). Storage and socket
//! fan-out stay behind the [`OrderStore`] and [`Notifier`] traits so the
//! core carries no backend code.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cmda_lifecycle::OrderStatus;
use cmda_normalizer::Normalizer;
use cmda_printqueue::{AgentTransport, DispatchConfig, Dispatcher, PrintQueue, QueueError};
use cmda_schemas::order::{CanonicalOrder, OrderHistoryEntry, OrderRecord};
use cmda_schemas::print::{PrintJob, PrintJobDraft, RenderedTicket};
use cmda_template::{render, ticket_context, TicketSettings, DEFAULT_TICKET};

mod merge;
mod store;
mod watch;
mod webhook;

pub use merge::merge_orders;
pub use store::{
    resolve_customer_id, CompanyRef, CustomerCriteria, Notifier, OrderStore, StoreError,
};
pub use watch::recognized_external_id;
pub use webhook::{WebhookEvent, WebhookOutcome};

#[derive(Debug)]
pub enum IngestError {
    Store(StoreError),
    Queue(QueueError),
    Io(std::io::Error),
    Serde(serde_json::Error),
    UnknownMerchant(String),
    UnknownOrder(String),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Store(e) => write!(f, "persistence failed: {e}"),
            IngestError::Queue(e) => write!(f, "print queue failed: {e}"),
            IngestError::Io(e) => write!(f, "file I/O failed: {e}"),
            IngestError::Serde(e) => write!(f, "payload serialization failed: {e}"),
            IngestError::UnknownMerchant(id) => write!(f, "no company mapped to merchant {id}"),
            IngestError::UnknownOrder(id) => write!(f, "no order with external id {id}"),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<StoreError> for IngestError {
    fn from(e: StoreError) -> Self {
        IngestError::Store(e)
    }
}

impl From<QueueError> for IngestError {
    fn from(e: QueueError) -> Self {
        IngestError::Queue(e)
    }
}

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self {
        IngestError::Io(e)
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        IngestError::Serde(e)
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Company owning the watched export directory.
    pub company_id: String,
    /// Default store stamped onto file-ingested orders.
    pub store_id: Option<String>,
    /// Quiet window before a changed file is processed; POS software
    /// rewrites exports several times in quick succession.
    pub quiet_window: Duration,
    /// Only files with this suffix are order exports.
    pub recognized_suffix: String,
    pub processed_dir: String,
    pub failed_dir: String,
    pub ticket: TicketSettings,
    /// Store-customized ticket layout; `None` uses the stock one.
    pub template: Option<String>,
    /// Ack timeout and retry passes for the post-ingest dispatch round.
    pub dispatch: DispatchConfig,
}

impl IngestConfig {
    pub fn new(company_id: impl Into<String>) -> Self {
        IngestConfig {
            company_id: company_id.into(),
            store_id: None,
            quiet_window: Duration::from_millis(1500),
            recognized_suffix: ".posprt".to_string(),
            processed_dir: "processed".to_string(),
            failed_dir: "failed".to_string(),
            ticket: TicketSettings::default(),
            template: None,
            dispatch: DispatchConfig::default(),
        }
    }
}

pub struct IngestService<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    normalizer: Arc<Normalizer>,
    queue: Arc<PrintQueue>,
    config: IngestConfig,
    transport: StdMutex<Option<Arc<dyn AgentTransport>>>,
    debounce: StdMutex<HashMap<String, JoinHandle<()>>>,
    in_flight: StdMutex<HashSet<String>>,
}

impl<S: OrderStore + 'static, N: Notifier + 'static> IngestService<S, N> {
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        normalizer: Arc<Normalizer>,
        queue: Arc<PrintQueue>,
        config: IngestConfig,
    ) -> Arc<Self> {
        Arc::new(IngestService {
            store,
            notifier,
            normalizer,
            queue,
            config,
            transport: StdMutex::new(None),
            debounce: StdMutex::new(HashMap::new()),
            in_flight: StdMutex::new(HashSet::new()),
        })
    }

    /// Attach the agent transport so every ingested order is pushed to
    /// connected agents right away instead of waiting for the host's next
    /// dispatch round.
    pub fn attach_transport(&self, transport: Arc<dyn AgentTransport>) {
        *self.transport.lock().unwrap_or_else(|e| e.into_inner()) = Some(transport);
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<PrintQueue> {
        &self.queue
    }

    /// Process one export file end to end: normalize, persist, enqueue
    /// the ticket, archive the file. Returns `None` when the file vanished
    /// before the debounce window closed.
    pub async fn process_file(&self, path: &Path) -> Result<Option<OrderRecord>, IngestError> {
        let Some(external_id) = recognized_external_id(
            path,
            &self.config.recognized_suffix,
            &self.config.processed_dir,
            &self.config.failed_dir,
        ) else {
            return Ok(None);
        };

        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(external_id, "export file vanished before processing");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let order = self.normalizer.normalize(&raw, &external_id).await;

        match self.persist_file_order(order).await {
            Ok((record, created)) => {
                if created {
                    self.notifier.order_created(&record).await;
                } else {
                    self.notifier.order_updated(&record).await;
                }
                self.enqueue_ticket(&record).await?;
                watch::archive(path, &self.config.processed_dir).await?;
                self.drain_tickets(&record.company_id).await;
                info!(
                    external_id,
                    order_id = %record.id,
                    created,
                    "export file ingested"
                );
                Ok(Some(record))
            }
            Err(e) => {
                warn!(external_id, error = %e, "ingestion failed, archiving to failed");
                if let Err(archive_err) = watch::archive(path, &self.config.failed_dir).await {
                    warn!(external_id, error = %archive_err, "failed-archive also failed");
                }
                Err(e)
            }
        }
    }

    /// Merge-or-create for the file path; file-ingested orders start in
    /// preparation because the POS already accepted them.
    async fn persist_file_order(
        &self,
        order: CanonicalOrder,
    ) -> Result<(OrderRecord, bool), IngestError> {
        let company_id = self.config.company_id.clone();
        match self
            .store
            .find_order(&company_id, &order.external_id)
            .await?
        {
            Some(mut record) => {
                record.order = merge_orders(&record.order, order);
                let record = self.store.upsert_order(record).await?;
                Ok((record, false))
            }
            None => {
                let store_id = order.store_id.clone().or_else(|| self.config.store_id.clone());
                let record = self
                    .create_record(&company_id, store_id, order, OrderStatus::InPreparation, "file")
                    .await?;
                Ok((record, true))
            }
        }
    }

    /// Build and persist a brand-new record: resolve the customer, assign
    /// the per-day display number, seed the status history. Any storage
    /// failure degrades to the basic insert so a hiccup cannot drop an
    /// order; a degraded record carries no customer linkage and no display
    /// number.
    pub(crate) async fn create_record(
        &self,
        company_id: &str,
        store_id: Option<String>,
        order: CanonicalOrder,
        initial_status: OrderStatus,
        actor: &str,
    ) -> Result<OrderRecord, IngestError> {
        let criteria = CustomerCriteria::from_order(&order);

        // Read-then-increment; two simultaneous creations can share a
        // number. The display number is a human label, not a key.
        let lookups: Result<(Option<String>, i64), StoreError> = async {
            let customer_id =
                resolve_customer_id(self.store.as_ref(), company_id, &criteria).await?;
            let day = Utc::now().date_naive();
            let next = self.store.count_orders_for_day(company_id, day).await? + 1;
            Ok((customer_id, next))
        }
        .await;

        let (customer_id, display_simple) = match &lookups {
            Ok((customer_id, next)) => (customer_id.clone(), Some(*next)),
            Err(e) => {
                warn!(error = %e, "customer/number lookup failed, degrading to basic insert");
                (None, None)
            }
        };

        let record = OrderRecord {
            id: Uuid::new_v4().to_string(),
            company_id: company_id.to_string(),
            store_id,
            customer_id,
            status: initial_status.as_str().to_string(),
            display_simple,
            history: vec![history_entry(None, initial_status.as_str(), actor, None)],
            order,
            created_at_utc: Utc::now(),
        };

        if lookups.is_err() {
            return Ok(self.store.insert_order_basic(record).await?);
        }

        match self.store.upsert_order(record.clone()).await {
            Ok(record) => Ok(record),
            Err(e) => {
                warn!(error = %e, "transactional upsert failed, trying basic insert");
                Ok(self.store.insert_order_basic(record).await?)
            }
        }
    }

    /// Render the ticket and enqueue it for delivery.
    pub async fn enqueue_ticket(&self, record: &OrderRecord) -> Result<PrintJob, IngestError> {
        let ctx = ticket_context(record, &self.config.ticket);
        let template = self.config.template.as_deref().unwrap_or(DEFAULT_TICKET);
        let payload = RenderedTicket {
            ticket_text: render(template, &ctx),
            order_summary: serde_json::to_value(&record.order)?,
        };
        let job = self
            .queue
            .enqueue(PrintJobDraft {
                company_id: record.company_id.clone(),
                target_store_id: record.store_id.clone(),
                order_external_id: record.order.external_id.clone(),
                payload,
            })
            .await?;
        Ok(job)
    }

    /// One dispatch round with the configured retries; a no-op without an
    /// attached transport. Dispatch failure is logged, never fatal: the
    /// jobs stay queued for the next round.
    pub(crate) async fn drain_tickets(&self, company_id: &str) {
        let transport = self
            .transport
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let Some(transport) = transport else {
            return;
        };
        let dispatcher =
            Dispatcher::new(self.queue.clone(), transport, self.config.dispatch.clone());
        if let Err(e) = dispatcher.process_with_retry(company_id).await {
            warn!(company_id, error = %e, "ticket dispatch failed, jobs stay queued");
        }
    }
}

pub(crate) fn history_entry(
    from: Option<&str>,
    to: &str,
    actor: &str,
    reason: Option<&str>,
) -> OrderHistoryEntry {
    OrderHistoryEntry {
        entry_id: Uuid::new_v4(),
        from: from.map(str::to_string),
        to: to.to_string(),
        actor: actor.to_string(),
        reason: reason.map(str::to_string),
        ts_utc: Utc::now(),
    }
}
