//! Persistence and notification seams. The ingestion core never talks to
//! a database directly; it drives these traits and lets the host process
//! decide what backs them.

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;

use cmda_schemas::order::{CanonicalOrder, OrderRecord};

#[derive(Debug)]
pub enum StoreError {
    Unavailable(String),
    Conflict(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            StoreError::Conflict(msg) => write!(f, "store conflict: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Company resolved from a marketplace merchant id.
#[derive(Debug, Clone)]
pub struct CompanyRef {
    pub company_id: String,
    pub store_id: Option<String>,
}

/// Customer matching input, applied in priority order: phone, then
/// address, then name. A match on a stronger field wins even when weaker
/// fields disagree (people move, typos happen; phone numbers are sticky).
#[derive(Debug, Clone, Default)]
pub struct CustomerCriteria {
    pub phone: Option<String>,
    pub address: Option<String>,
    pub name: Option<String>,
}

impl CustomerCriteria {
    pub fn from_order(order: &CanonicalOrder) -> Self {
        CustomerCriteria {
            phone: order.customer.phone.clone().filter(|s| !s.is_empty()),
            address: order
                .delivery_address
                .formatted
                .clone()
                .filter(|s| !s.trim().is_empty()),
            name: order.customer.name.clone().filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.phone.is_none() && self.address.is_none() && self.name.is_none()
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_order(
        &self,
        company_id: &str,
        external_id: &str,
    ) -> Result<Option<OrderRecord>, StoreError>;

    /// Insert-or-replace keyed on `(company_id, order.external_id)`,
    /// atomically with any customer bookkeeping the backend does.
    async fn upsert_order(&self, record: OrderRecord) -> Result<OrderRecord, StoreError>;

    /// Degraded-path insert with no customer bookkeeping; used when the
    /// transactional upsert fails so the order is at least not lost.
    async fn insert_order_basic(&self, record: OrderRecord) -> Result<OrderRecord, StoreError>;

    async fn count_orders_for_day(
        &self,
        company_id: &str,
        day: NaiveDate,
    ) -> Result<i64, StoreError>;

    async fn find_company_by_merchant(
        &self,
        merchant_id: &str,
    ) -> Result<Option<CompanyRef>, StoreError>;

    async fn find_customer_by_phone(
        &self,
        company_id: &str,
        phone: &str,
    ) -> Result<Option<String>, StoreError>;

    async fn find_customer_by_address(
        &self,
        company_id: &str,
        address: &str,
    ) -> Result<Option<String>, StoreError>;

    async fn find_customer_by_name(
        &self,
        company_id: &str,
        name: &str,
    ) -> Result<Option<String>, StoreError>;

    async fn create_customer(
        &self,
        company_id: &str,
        criteria: &CustomerCriteria,
    ) -> Result<String, StoreError>;
}

/// Downstream fan-out (socket broadcasts, dashboards). Notification
/// failures must never fail ingestion, so these are infallible by
/// contract; implementations swallow and log their own errors.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn order_created(&self, record: &OrderRecord);
    async fn order_updated(&self, record: &OrderRecord);
}

/// Resolve (or create) the customer an order belongs to.
pub async fn resolve_customer_id<S: OrderStore + ?Sized>(
    store: &S,
    company_id: &str,
    criteria: &CustomerCriteria,
) -> Result<Option<String>, StoreError> {
    if let Some(phone) = &criteria.phone {
        if let Some(id) = store.find_customer_by_phone(company_id, phone).await? {
            return Ok(Some(id));
        }
    }
    if let Some(address) = &criteria.address {
        if let Some(id) = store.find_customer_by_address(company_id, address).await? {
            return Ok(Some(id));
        }
    }
    if let Some(name) = &criteria.name {
        if let Some(id) = store.find_customer_by_name(company_id, name).await? {
            return Ok(Some(id));
        }
    }
    if criteria.is_empty() {
        return Ok(None);
    }
    store.create_customer(company_id, criteria).await.map(Some)
}
