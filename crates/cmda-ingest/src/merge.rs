//! Re-import merge policy.
//!
//! POS exports get rewritten as an order evolves; a later file for the
//! same external id must enrich the stored order, never blank it. The
//! rule per field: an incoming populated value overwrites, an incoming
//! empty value leaves the stored one alone. `external_id` is never
//! touched.

use cmda_schemas::order::{CanonicalOrder, OrderTotals, OrderType};

pub fn merge_orders(existing: &CanonicalOrder, incoming: CanonicalOrder) -> CanonicalOrder {
    let mut out = existing.clone();

    if incoming.display_id.is_some() {
        out.display_id = incoming.display_id;
    }
    if incoming.customer.name.as_deref().map_or(false, |s| !s.trim().is_empty()) {
        out.customer.name = incoming.customer.name;
    }
    if incoming.customer.phone.as_deref().map_or(false, |s| !s.is_empty()) {
        out.customer.phone = incoming.customer.phone;
    }
    if incoming.delivery_address.formatted.is_some()
        || incoming.delivery_address.street.is_some()
    {
        out.delivery_address = incoming.delivery_address;
    }
    if !incoming.items.is_empty() {
        out.items = incoming.items;
    }
    // Any non-default totals count as populated; a fee or discount can
    // arrive before the subtotal does.
    if incoming.totals != OrderTotals::default() {
        out.totals = incoming.totals;
    }
    if !incoming.payments.is_empty() {
        out.payments = incoming.payments;
    }
    if incoming.order_type != OrderType::Unknown {
        out.order_type = incoming.order_type;
    }
    if incoming.pickup_code.is_some() {
        out.pickup_code = incoming.pickup_code;
    }
    if incoming.locator.is_some() {
        out.locator = incoming.locator;
    }
    if incoming.store_id.is_some() {
        out.store_id = incoming.store_id;
    }
    // The latest raw payload is the one worth auditing.
    if !incoming.raw_source.is_null() {
        out.raw_source = incoming.raw_source;
    }
    out
}
