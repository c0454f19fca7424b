use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub name: Option<String>,
    /// Digits-only phone; no country code is added when the source omits one.
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub reference: Option<String>,
    pub observation: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Concatenation of the structured fields, or the verbatim source string
    /// when the source only supplied one line.
    pub formatted: Option<String>,
}

impl DeliveryAddress {
    /// Rebuild `formatted` from the structured fields: comma-joined
    /// street, number, complement, neighborhood, city; reference appended
    /// as a trailing segment.
    pub fn format_from_parts(&self) -> Option<String> {
        let mut parts: Vec<&str> = Vec::new();
        for p in [
            &self.street,
            &self.number,
            &self.complement,
            &self.neighborhood,
            &self.city,
        ] {
            if let Some(s) = p.as_deref() {
                if !s.trim().is_empty() {
                    parts.push(s.trim());
                }
            }
        }
        if parts.is_empty() {
            return None;
        }
        let mut out = parts.join(", ");
        if let Some(r) = self.reference.as_deref() {
            if !r.trim().is_empty() {
                out.push_str(" - ");
                out.push_str(r.trim());
            }
        }
        Some(out)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemOption {
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_price_cents: i64,
    pub options: Vec<OrderItemOption>,
    pub observation: Option<String>,
}

/// All amounts in integer cents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal_cents: i64,
    pub delivery_fee_cents: i64,
    pub extra_charges_cents: i64,
    pub discount_cents: i64,
    pub grand_total_cents: i64,
}

impl OrderTotals {
    /// grand_total = subtotal + delivery_fee + extra_charges - discount,
    /// falling back to the sum of item totals when subtotal is absent.
    pub fn derive_grand_total(&mut self, items: &[OrderItem]) {
        if self.grand_total_cents > 0 {
            return;
        }
        let base = if self.subtotal_cents > 0 {
            self.subtotal_cents
        } else {
            items.iter().map(|i| i.total_price_cents).sum()
        };
        self.grand_total_cents =
            (base + self.delivery_fee_cents + self.extra_charges_cents - self.discount_cents)
                .max(0);
    }

    /// True when grand_total agrees with the component sum within one cent.
    pub fn is_consistent(&self) -> bool {
        let expected = self.subtotal_cents + self.delivery_fee_cents + self.extra_charges_cents
            - self.discount_cents;
        (self.grand_total_cents - expected).abs() <= 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub method: String,
    pub amount_cents: i64,
    pub prepaid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Delivery,
    Pickup,
    DineIn,
    Unknown,
}

impl Default for OrderType {
    fn default() -> Self {
        OrderType::Unknown
    }
}

/// The single normalized order shape every source is converted into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalOrder {
    /// Stable per source event; the idempotency key. Never mutated after
    /// first persistence.
    pub external_id: String,
    /// Short human-facing label; not guaranteed unique.
    pub display_id: Option<String>,
    pub customer: Customer,
    pub delivery_address: DeliveryAddress,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
    pub payments: Vec<Payment>,
    pub order_type: OrderType,
    pub pickup_code: Option<String>,
    pub locator: Option<String>,
    pub store_id: Option<String>,
    /// Opaque source payload retained for audit/debugging.
    pub raw_source: Value,
}

impl CanonicalOrder {
    /// Minimal well-typed order used when input is irrecoverably malformed.
    pub fn fallback(external_id: &str, raw_source: Value) -> Self {
        CanonicalOrder {
            external_id: external_id.to_string(),
            display_id: None,
            customer: Customer {
                name: Some("Imported".to_string()),
                phone: None,
            },
            delivery_address: DeliveryAddress::default(),
            items: Vec::new(),
            totals: OrderTotals::default(),
            payments: Vec::new(),
            order_type: OrderType::Unknown,
            pickup_code: None,
            locator: None,
            store_id: None,
            raw_source,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderHistoryEntry {
    pub entry_id: Uuid,
    pub from: Option<String>,
    pub to: String,
    pub actor: String,
    pub reason: Option<String>,
    pub ts_utc: DateTime<Utc>,
}

/// Storage-owned order row as seen by the ingestion pipeline. The core
/// treats this as a stable key-value entity addressed by `external_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: String,
    pub company_id: String,
    pub store_id: Option<String>,
    pub customer_id: Option<String>,
    pub status: String,
    /// Per-day sequence number assigned at creation.
    pub display_simple: Option<i64>,
    pub history: Vec<OrderHistoryEntry>,
    pub order: CanonicalOrder,
    pub created_at_utc: DateTime<Utc>,
}
