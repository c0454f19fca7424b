use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use cmda_schemas::money::format_cents;
use cmda_schemas::order::{OrderRecord, OrderType};

/// Store-level header settings stamped onto every ticket.
#[derive(Debug, Clone, Default)]
pub struct TicketSettings {
    pub header_name: String,
    pub header_city: String,
}

/// Flatten an order record into the template context.
///
/// All monetary values become two-decimal strings; the display id is padded
/// to two digits; fee and discount render empty when zero so `{{#if}}`
/// blocks can drop their lines entirely.
pub fn ticket_context(record: &OrderRecord, settings: &TicketSettings) -> Value {
    let o = &record.order;

    let display_id = record
        .display_simple
        .map(|n| format!("{n:02}"))
        .or_else(|| o.display_id.clone())
        .unwrap_or_else(|| o.external_id.chars().take(6).collect());

    let customer_name = o
        .customer
        .name
        .as_deref()
        .unwrap_or("CUSTOMER")
        .to_uppercase();

    let address = o
        .delivery_address
        .formatted
        .clone()
        .or_else(|| o.delivery_address.format_from_parts())
        .unwrap_or_else(|| "-".to_string());

    let mut total_items_count: i64 = 0;
    let items: Vec<Value> = o
        .items
        .iter()
        .map(|it| {
            total_items_count += it.quantity;
            let options: Vec<Value> = it
                .options
                .iter()
                .map(|op| {
                    json!({
                        "option_qty": (op.quantity * it.quantity).to_string(),
                        "option_name": op.name,
                        "option_price": format_cents(op.unit_price_cents),
                    })
                })
                .collect();
            json!({
                "item_qty": it.quantity.to_string(),
                "item_name": it.name,
                "item_price": format_cents(it.total_price_cents),
                "item_unit_price": format_cents(it.unit_price_cents),
                "item_options": options,
                "notes": it.observation.clone().unwrap_or_default(),
            })
        })
        .collect();

    let payments: Vec<Value> = o
        .payments
        .iter()
        .map(|p| {
            json!({
                "payment_method": p.method.to_uppercase(),
                "payment_value": format_cents(p.amount_cents),
            })
        })
        .collect();

    let order_type = match o.order_type {
        OrderType::Delivery => "DELIVERY",
        OrderType::Pickup => "PICKUP",
        OrderType::DineIn => "DINE IN",
        OrderType::Unknown => "",
    };

    json!({
        "header_name": settings.header_name,
        "header_city": settings.header_city,
        "display_id": display_id,
        "order_date": fmt_date(&record.created_at_utc),
        "order_time": fmt_time(&record.created_at_utc),
        "customer_name": customer_name,
        "customer_phone": o.customer.phone.clone().unwrap_or_default(),
        "customer_address": address,
        "order_type": order_type,
        "pickup_code": o.pickup_code.clone().unwrap_or_default(),
        "items": items,
        "total_items_count": total_items_count.to_string(),
        "subtotal": format_cents(o.totals.subtotal_cents),
        "delivery_fee": non_zero(o.totals.delivery_fee_cents),
        "discount": non_zero(o.totals.discount_cents),
        "total": format_cents(o.totals.grand_total_cents),
        "payments": payments,
        "observations": o.delivery_address.observation.clone().unwrap_or_default(),
    })
}

fn non_zero(cents: i64) -> String {
    if cents == 0 {
        String::new()
    } else {
        format_cents(cents)
    }
}

fn fmt_date(ts: &DateTime<Utc>) -> String {
    ts.format("%d/%m/%Y").to_string()
}

fn fmt_time(ts: &DateTime<Utc>) -> String {
    ts.format("%H:%M").to_string()
}
