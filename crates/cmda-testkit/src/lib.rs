//! Test doubles for the ingestion pipeline: an in-memory order store, a
//! recording notifier, and a scripted agent transport. All pure
//! in-process; scenario tests need no database or network.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;

use cmda_ingest::{
    CompanyRef, CustomerCriteria, IngestConfig, IngestService, Notifier, OrderStore, StoreError,
};
use cmda_normalizer::Normalizer;
use cmda_printqueue::{AgentHandle, AgentTransport, PrintQueue};
use cmda_schemas::order::OrderRecord;
use cmda_schemas::print::PrintJob;

/// The fully wired in-process pipeline scenario tests run against.
pub struct TestPipeline {
    pub svc: Arc<IngestService<MemoryStore, RecordingNotifier>>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub queue: Arc<PrintQueue>,
}

/// Assemble an ingest service over the in-memory doubles and a real
/// file-backed print queue at `queue_path`.
pub async fn pipeline(queue_path: &Path, config: IngestConfig) -> Result<TestPipeline> {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let queue = Arc::new(
        PrintQueue::open(queue_path)
            .await
            .with_context(|| format!("open queue file: {}", queue_path.display()))?,
    );
    let svc = IngestService::new(
        store.clone(),
        notifier.clone(),
        Arc::new(Normalizer::new()),
        queue.clone(),
        config,
    );
    Ok(TestPipeline {
        svc,
        store,
        notifier,
        queue,
    })
}

// ---------------------------------------------------------------------------
// In-memory order store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MemoryCustomer {
    pub id: String,
    pub company_id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    orders: Mutex<HashMap<(String, String), OrderRecord>>,
    customers: Mutex<Vec<MemoryCustomer>>,
    merchants: Mutex<HashMap<String, CompanyRef>>,
    customer_seq: AtomicUsize,
    /// Fail this many transactional upserts before behaving; exercises the
    /// basic-insert fallback.
    fail_upserts: AtomicUsize,
    /// Fail this many customer lookups; exercises the degraded create
    /// path (no linkage, no display number).
    fail_customer_lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn map_merchant(&self, merchant_id: &str, company_id: &str, store_id: Option<&str>) {
        self.merchants.lock().unwrap().insert(
            merchant_id.to_string(),
            CompanyRef {
                company_id: company_id.to_string(),
                store_id: store_id.map(str::to_string),
            },
        );
    }

    pub fn seed_customer(&self, customer: MemoryCustomer) {
        self.customers.lock().unwrap().push(customer);
    }

    pub fn fail_next_upserts(&self, n: usize) {
        self.fail_upserts.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_customer_lookups(&self, n: usize) {
        self.fail_customer_lookups.store(n, Ordering::SeqCst);
    }

    fn customer_lookup_gate(&self) -> Result<(), StoreError> {
        if self.fail_customer_lookups.load(Ordering::SeqCst) > 0 {
            self.fail_customer_lookups.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable(
                "scripted customer lookup failure".into(),
            ));
        }
        Ok(())
    }

    pub fn order(&self, company_id: &str, external_id: &str) -> Option<OrderRecord> {
        self.orders
            .lock()
            .unwrap()
            .get(&(company_id.to_string(), external_id.to_string()))
            .cloned()
    }

    pub fn order_count(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    pub fn customer_count(&self) -> usize {
        self.customers.lock().unwrap().len()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn find_order(
        &self,
        company_id: &str,
        external_id: &str,
    ) -> Result<Option<OrderRecord>, StoreError> {
        Ok(self.order(company_id, external_id))
    }

    async fn upsert_order(&self, record: OrderRecord) -> Result<OrderRecord, StoreError> {
        if self.fail_upserts.load(Ordering::SeqCst) > 0 {
            self.fail_upserts.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("scripted upsert failure".into()));
        }
        let key = (record.company_id.clone(), record.order.external_id.clone());
        self.orders.lock().unwrap().insert(key, record.clone());
        Ok(record)
    }

    async fn insert_order_basic(&self, record: OrderRecord) -> Result<OrderRecord, StoreError> {
        let key = (record.company_id.clone(), record.order.external_id.clone());
        let mut orders = self.orders.lock().unwrap();
        if orders.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "order {} already exists",
                record.order.external_id
            )));
        }
        orders.insert(key, record.clone());
        Ok(record)
    }

    async fn count_orders_for_day(
        &self,
        company_id: &str,
        day: NaiveDate,
    ) -> Result<i64, StoreError> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.company_id == company_id && r.created_at_utc.date_naive() == day)
            .count() as i64)
    }

    async fn find_company_by_merchant(
        &self,
        merchant_id: &str,
    ) -> Result<Option<CompanyRef>, StoreError> {
        Ok(self.merchants.lock().unwrap().get(merchant_id).cloned())
    }

    async fn find_customer_by_phone(
        &self,
        company_id: &str,
        phone: &str,
    ) -> Result<Option<String>, StoreError> {
        self.customer_lookup_gate()?;
        Ok(self
            .customers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.company_id == company_id && c.phone.as_deref() == Some(phone))
            .map(|c| c.id.clone()))
    }

    async fn find_customer_by_address(
        &self,
        company_id: &str,
        address: &str,
    ) -> Result<Option<String>, StoreError> {
        self.customer_lookup_gate()?;
        Ok(self
            .customers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.company_id == company_id && c.address.as_deref() == Some(address))
            .map(|c| c.id.clone()))
    }

    async fn find_customer_by_name(
        &self,
        company_id: &str,
        name: &str,
    ) -> Result<Option<String>, StoreError> {
        self.customer_lookup_gate()?;
        Ok(self
            .customers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.company_id == company_id && c.name.as_deref() == Some(name))
            .map(|c| c.id.clone()))
    }

    async fn create_customer(
        &self,
        company_id: &str,
        criteria: &CustomerCriteria,
    ) -> Result<String, StoreError> {
        let id = format!("cust-{}", self.customer_seq.fetch_add(1, Ordering::SeqCst) + 1);
        self.customers.lock().unwrap().push(MemoryCustomer {
            id: id.clone(),
            company_id: company_id.to_string(),
            name: criteria.name.clone(),
            phone: criteria.phone.clone(),
            address: criteria.address.clone(),
        });
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Recording notifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierEvent {
    Created(String),
    Updated(String),
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotifierEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        RecordingNotifier::default()
    }

    pub fn events(&self) -> Vec<NotifierEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn order_created(&self, record: &OrderRecord) {
        self.events
            .lock()
            .unwrap()
            .push(NotifierEvent::Created(record.order.external_id.clone()));
    }

    async fn order_updated(&self, record: &OrderRecord) {
        self.events
            .lock()
            .unwrap()
            .push(NotifierEvent::Updated(record.order.external_id.clone()));
    }
}

// ---------------------------------------------------------------------------
// Scripted agent transport
// ---------------------------------------------------------------------------

#[derive(Default)]
struct AgentsInner {
    agents: Mutex<Vec<AgentHandle>>,
    acking: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(String, String)>>,
}

/// Cheap-to-clone scripted transport: tests keep one handle for
/// assertions and hand a clone to the dispatcher.
#[derive(Clone, Default)]
pub struct ScriptedAgents {
    inner: Arc<AgentsInner>,
}

impl ScriptedAgents {
    pub fn new() -> Self {
        ScriptedAgents::default()
    }

    /// Connect an agent; `acks` controls whether it acknowledges jobs.
    pub fn connect(&self, handle: AgentHandle, acks: bool) {
        if acks {
            self.inner
                .acking
                .lock()
                .unwrap()
                .insert(handle.agent_id.clone());
        }
        self.inner.agents.lock().unwrap().push(handle);
    }

    pub fn disconnect(&self, agent_id: &str) {
        self.inner
            .agents
            .lock()
            .unwrap()
            .retain(|a| a.agent_id != agent_id);
    }

    /// `(agent_id, job_id)` pairs, in dispatch order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.inner.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentTransport for ScriptedAgents {
    async fn connected_agents(&self, company_id: &str) -> Vec<AgentHandle> {
        self.inner
            .agents
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.company_id == company_id)
            .cloned()
            .collect()
    }

    async fn request_print(
        &self,
        agent: &AgentHandle,
        job: &PrintJob,
        _timeout: Duration,
    ) -> bool {
        self.inner
            .calls
            .lock()
            .unwrap()
            .push((agent.agent_id.clone(), job.id.clone()));
        self.inner.acking.lock().unwrap().contains(&agent.agent_id)
    }
}
