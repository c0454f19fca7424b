//! Structured-payload mapping: ordered candidate key paths per canonical
//! field, first non-null match wins. Paths are plain data so adding a new
//! provider shape is an edit to a list, not new code.

use serde_json::Value;

use cmda_schemas::money::parse_money_cents;
use cmda_schemas::order::{
    CanonicalOrder, Customer, DeliveryAddress, OrderItem, OrderItemOption, OrderTotals, OrderType,
    Payment,
};

use crate::normalize_phone;

const EXTERNAL_ID_PATHS: &[&str] = &["id", "orderId", "referenceId", "reference", "externalId"];
const DISPLAY_ID_PATHS: &[&str] = &["displayId", "displaySimple", "shortCode", "number"];
const NAME_PATHS: &[&str] = &[
    "customer.name",
    "customer.fullName",
    "customerName",
    "client.name",
];
const PHONE_PATHS: &[&str] = &[
    "customer.phone.number",
    "customer.phone",
    "customer.phones.0.number",
    "customerPhone",
    "client.phone",
    "phone",
];
const LOCATOR_PATHS: &[&str] = &["customer.phone.localizer", "localizer", "locator"];
const ADDRESS_FORMATTED_PATHS: &[&str] = &[
    "delivery.deliveryAddress.formattedAddress",
    "deliveryAddress.formattedAddress",
    "address.formattedAddress",
    "address",
    "deliveryAddress",
];
const ADDRESS_OBJECT_PATHS: &[&str] = &[
    "delivery.deliveryAddress",
    "deliveryAddress",
    "address",
];
const SUBTOTAL_PATHS: &[&str] = &["total.subTotal", "total.subtotal", "subTotal", "subtotal"];
const DELIVERY_FEE_PATHS: &[&str] = &["total.deliveryFee", "deliveryFee", "delivery.fee"];
const EXTRA_PATHS: &[&str] = &["total.additionalFees", "total.extraCharges", "additionalFees"];
const DISCOUNT_PATHS: &[&str] = &["total.benefits", "total.discount", "discount", "benefits"];
const GRAND_TOTAL_PATHS: &[&str] = &[
    "total.orderAmount",
    "totalAmount",
    "orderAmount",
    "totalPrice",
    "total",
];
const ITEMS_PATHS: &[&str] = &["items", "orderItems", "products"];
const PAYMENTS_PATHS: &[&str] = &["payments.methods", "payments", "payment.methods"];
const ORDER_TYPE_PATHS: &[&str] = &["orderType", "type", "delivery.mode"];
const PICKUP_CODE_PATHS: &[&str] = &["delivery.pickupCode", "pickupCode", "takeout.takeoutCode"];
const STORE_ID_PATHS: &[&str] = &[
    "additionalInfo.metadata.storeId",
    "additionalInfo.metadata.idStore",
    "storeId",
];
const LATITUDE_PATHS: &[&str] = &[
    "delivery.deliveryAddress.coordinates.latitude",
    "deliveryAddress.coordinates.latitude",
    "latitude",
];
const LONGITUDE_PATHS: &[&str] = &[
    "delivery.deliveryAddress.coordinates.longitude",
    "deliveryAddress.coordinates.longitude",
    "longitude",
];

/// Map a decoded provider payload into the canonical order shape.
/// `source_id` is the external id used when the payload carries none.
pub fn map_structured(payload: &Value, source_id: &str) -> CanonicalOrder {
    // Some providers wrap the order in an envelope.
    let root = payload.get("order").filter(|v| v.is_object()).unwrap_or(payload);

    let external_id = pick_string(root, EXTERNAL_ID_PATHS)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| source_id.to_string());

    let items = pick(root, ITEMS_PATHS)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(map_item).collect::<Vec<_>>())
        .unwrap_or_default();

    let mut totals = OrderTotals {
        subtotal_cents: pick_cents(root, SUBTOTAL_PATHS).unwrap_or(0),
        delivery_fee_cents: pick_cents(root, DELIVERY_FEE_PATHS).unwrap_or(0),
        extra_charges_cents: pick_cents(root, EXTRA_PATHS).unwrap_or(0),
        discount_cents: pick_cents(root, DISCOUNT_PATHS).unwrap_or(0),
        grand_total_cents: pick_cents(root, GRAND_TOTAL_PATHS).unwrap_or(0),
    };
    totals.derive_grand_total(&items);

    let payments = pick(root, PAYMENTS_PATHS)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(map_payment).collect::<Vec<_>>())
        .unwrap_or_default();

    CanonicalOrder {
        external_id,
        display_id: pick_string(root, DISPLAY_ID_PATHS).filter(|s| !s.is_empty()),
        customer: Customer {
            name: pick_string(root, NAME_PATHS).filter(|s| !s.trim().is_empty()),
            phone: pick_string(root, PHONE_PATHS).as_deref().and_then(normalize_phone),
        },
        delivery_address: map_address(root),
        items,
        totals,
        payments,
        order_type: pick_string(root, ORDER_TYPE_PATHS)
            .map(|s| map_order_type(&s))
            .unwrap_or(OrderType::Unknown),
        pickup_code: pick_string(root, PICKUP_CODE_PATHS).filter(|s| !s.is_empty()),
        locator: pick_string(root, LOCATOR_PATHS).filter(|s| !s.is_empty()),
        store_id: pick_string(root, STORE_ID_PATHS).filter(|s| !s.is_empty()),
        raw_source: payload.clone(),
    }
}

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// First non-null value among the dot-separated candidate paths. Numeric
/// path segments index into arrays.
pub fn pick<'a>(root: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths.iter().find_map(|p| resolve(root, p))
}

fn resolve<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = root;
    for seg in path.split('.') {
        cur = match cur {
            Value::Object(m) => m.get(seg)?,
            Value::Array(a) => a.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if cur.is_null() {
        None
    } else {
        Some(cur)
    }
}

fn pick_string(root: &Value, paths: &[&str]) -> Option<String> {
    // Skip candidates that resolve to containers so a later scalar path
    // still gets a chance.
    paths.iter().find_map(|p| resolve(root, p).and_then(scalar_string))
}

fn pick_cents(root: &Value, paths: &[&str]) -> Option<i64> {
    paths.iter().find_map(|p| resolve(root, p).and_then(value_cents))
}

/// Scalars only; containers resolve to nothing rather than JSON dumps.
fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Money values arrive as JSON numbers (units) or locale strings.
fn value_cents(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_f64().map(|f| (f * 100.0).round() as i64),
        Value::String(s) => parse_money_cents(s),
        // Provider "benefits"/fee lists: sum the per-entry values.
        Value::Array(a) => Some(
            a.iter()
                .filter_map(|e| e.get("value").or_else(|| e.get("amount")).and_then(value_cents))
                .sum(),
        ),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Field mapping
// ---------------------------------------------------------------------------

/// Phone as the mapper would keep it: first candidate path, digits only.
pub(crate) fn mapped_phone(root: &Value) -> Option<String> {
    pick_string(root, PHONE_PATHS).as_deref().and_then(normalize_phone)
}

pub(crate) fn map_address(root: &Value) -> DeliveryAddress {
    let formatted = pick_string(root, ADDRESS_FORMATTED_PATHS).filter(|s| !s.trim().is_empty());
    let obj = pick(root, ADDRESS_OBJECT_PATHS).filter(|v| v.is_object());

    let field = |keys: &[&str]| -> Option<String> {
        obj.and_then(|o| pick_string(o, keys)).filter(|s| !s.trim().is_empty())
    };

    let mut addr = DeliveryAddress {
        street: field(&["streetName", "street", "logradouro"]),
        number: field(&["streetNumber", "number"]),
        complement: field(&["complement"]),
        neighborhood: field(&["neighborhood", "district", "bairro"]),
        city: field(&["city"]),
        reference: field(&["reference", "referencePoint"]),
        observation: field(&["observation", "observations"]),
        latitude: pick(root, LATITUDE_PATHS).and_then(Value::as_f64),
        longitude: pick(root, LONGITUDE_PATHS).and_then(Value::as_f64),
        formatted,
    };
    if addr.formatted.is_none() {
        addr.formatted = addr.format_from_parts();
    }
    addr
}

fn map_item(v: &Value) -> Option<OrderItem> {
    let name = pick_string(v, &["name", "title", "productName", "description"])?;
    let quantity = pick(v, &["quantity", "qty", "amount"])
        .and_then(value_int)
        .unwrap_or(1)
        .max(1);
    let unit = pick_cents(v, &["unitPrice", "unit_price", "price"]).unwrap_or(0);
    let total = pick_cents(v, &["totalPrice", "total"]).unwrap_or(unit * quantity);

    let options = pick(v, &["options", "subItems", "garnishItems", "extras", "modifiers"])
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(map_option).collect())
        .unwrap_or_default();

    Some(OrderItem {
        name,
        quantity,
        unit_price_cents: unit,
        total_price_cents: total,
        options,
        observation: pick_string(v, &["observations", "observation", "notes", "comment"])
            .filter(|s| !s.trim().is_empty()),
    })
}

fn map_option(v: &Value) -> Option<OrderItemOption> {
    let name = pick_string(v, &["name", "title", "description"])?;
    Some(OrderItemOption {
        name,
        quantity: pick(v, &["quantity", "qty"]).and_then(value_int).unwrap_or(1).max(1),
        unit_price_cents: pick_cents(v, &["unitPrice", "price", "addition", "value"]).unwrap_or(0),
    })
}

fn map_payment(v: &Value) -> Option<Payment> {
    let method = pick_string(v, &["method", "type", "name", "brand"])?;
    let amount = pick_cents(v, &["value", "amount", "total"]).unwrap_or(0);
    let prepaid = pick(v, &["prepaid"]).and_then(Value::as_bool).unwrap_or_else(|| {
        pick_string(v, &["type"]).map_or(false, |t| t.eq_ignore_ascii_case("ONLINE"))
    });
    Some(Payment {
        method: method.to_uppercase(),
        amount_cents: amount,
        prepaid,
    })
}

fn map_order_type(raw: &str) -> OrderType {
    match raw.trim().to_uppercase().as_str() {
        "DELIVERY" | "ENTREGA" => OrderType::Delivery,
        "TAKEOUT" | "PICKUP" | "RETIRADA" => OrderType::Pickup,
        "INDOOR" | "DINE_IN" | "MESA" => OrderType::DineIn,
        _ => OrderType::Unknown,
    }
}

fn value_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
