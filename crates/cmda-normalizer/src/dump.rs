//! Print-dump recovery: some POS vendors export no structured payload at
//! all, only the row-by-row text sent to the thermal printer. This module
//! scrapes a canonical order back out of those rows.
//!
//! Everything here is heuristic by nature; unknown lines are ignored
//! rather than failing the whole payload.

use serde_json::Value;

use cmda_schemas::money::parse_money_cents;
use cmda_schemas::order::{
    CanonicalOrder, Customer, DeliveryAddress, OrderItem, OrderTotals, OrderType, Payment,
};

use crate::normalize_phone;

const STREET_PREFIXES: &[&str] = &[
    "rua ", "r. ", "av ", "av. ", "avenida ", "travessa ", "praça ", "praca ", "rodovia ",
    "estrada ", "alameda ",
];

/// Locate the printer-row array inside a decoded payload. Vendors nest it
/// at the top level, under `raw[0]`, or inside a one-element envelope
/// array.
pub fn print_rows(payload: &Value) -> Option<Vec<String>> {
    let candidates = [
        payload.get("printRows"),
        payload.pointer("/raw/0/printRows"),
        payload.pointer("/0/printRows"),
        payload.pointer("/0/raw/0/printRows"),
    ];
    let rows = candidates.into_iter().flatten().find_map(Value::as_array)?;

    let texts: Vec<String> = rows
        .iter()
        .filter_map(|row| match row {
            Value::String(s) => Some(s.clone()),
            Value::Object(m) => m.get("text").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts)
    }
}

/// Scrape a canonical order out of printer rows. `raw_source` is the
/// decoded payload retained for audit.
pub fn parse_print_rows(rows: &[String], raw_source: Value, source_id: &str) -> CanonicalOrder {
    let lines: Vec<String> = rows.iter().map(|r| strip_markup(r)).collect();

    let mut order = CanonicalOrder::fallback(source_id, raw_source);
    order.customer.name = None;

    let pedido_idx = lines.iter().position(|l| {
        let lower = l.trim().to_lowercase();
        lower.starts_with("pedido")
    });
    if let Some(i) = pedido_idx {
        order.display_id = digit_run(&lines[i], 1, 10);
        // The customer name is printed on the next meaningful line.
        order.customer.name = lines[i + 1..]
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty() && !is_separator(l))
            .filter(|l| !is_label_line(l) && parse_item_line(l).is_none())
            .map(str::to_string);
    }

    let phone_idx = lines.iter().position(|l| {
        let lower = l.to_lowercase();
        lower.contains("telefone") || lower.starts_with("tel")
    });
    if let Some(i) = phone_idx {
        order.customer.phone = extract_phone(&lines[i]);
        if order.customer.name.is_none() && i > 0 {
            let prev = lines[i - 1].trim();
            if !prev.is_empty() && !is_separator(prev) && !is_label_line(prev) {
                order.customer.name = Some(prev.to_string());
            }
        }
    }

    let mut items: Vec<OrderItem> = Vec::new();
    let mut totals = OrderTotals::default();
    let mut payments: Vec<Payment> = Vec::new();
    let mut in_payments = false;

    for line in &lines {
        let trimmed = line.trim();
        if trimmed.is_empty() || is_separator(trimmed) {
            continue;
        }
        let lower = trimmed.to_lowercase();

        if lower.contains("forma de pagamento") {
            in_payments = true;
            continue;
        }
        if in_payments {
            if is_footer_line(&lower) {
                in_payments = false;
                continue;
            }
            if let Some(p) = parse_payment_line(trimmed) {
                payments.push(p);
            }
            continue;
        }

        if lower.contains("localizador") {
            order.locator = digit_run(trimmed, 6, 14);
            continue;
        }
        if lower.contains("coleta") {
            order.pickup_code = digit_run(trimmed, 3, 10);
            continue;
        }
        if parse_totals_line(&lower, trimmed, &mut totals) {
            continue;
        }
        if let Some(item) = parse_item_line(trimmed) {
            items.push(item);
            continue;
        }
        // Option / note rows are printed under their item with a dash.
        if let Some(note) = trimmed.strip_prefix("- ") {
            if let Some(last) = items.last_mut() {
                let obs = last.observation.get_or_insert_with(String::new);
                if !obs.is_empty() {
                    obs.push_str("; ");
                }
                obs.push_str(note.trim());
            }
            continue;
        }
        match trimmed.to_uppercase().as_str() {
            "ENTREGA" | "DELIVERY" => order.order_type = OrderType::Delivery,
            "RETIRADA" | "TAKEOUT" => order.order_type = OrderType::Pickup,
            _ => {}
        }
        if order.delivery_address.formatted.is_none() && looks_like_address(trimmed) {
            order.delivery_address = DeliveryAddress {
                formatted: Some(trimmed.to_string()),
                ..DeliveryAddress::default()
            };
        }
    }

    totals.derive_grand_total(&items);
    order.items = items;
    order.totals = totals;
    order.payments = payments;
    if order.customer.name.is_none() {
        order.customer = Customer {
            name: Some("Imported".to_string()),
            phone: order.customer.phone,
        };
    }
    order
}

// ---------------------------------------------------------------------------
// Line classification
// ---------------------------------------------------------------------------

/// Strip printer markup tags and HTML entities, keeping plain text.
pub fn strip_markup(row: &str) -> String {
    let mut out = String::with_capacity(row.len());
    let mut in_tag = false;
    for c in row.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&nbsp;", " ")
        .replace('\u{a0}', " ")
        .replace("&amp;", "&")
        .trim_end()
        .to_string()
}

fn is_separator(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| matches!(c, '=' | '-' | '*' | '_' | '.'))
}

fn is_label_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    ["telefone", "tel", "pedido", "total", "forma", "data", "hora", "endere"]
        .iter()
        .any(|p| lower.starts_with(p))
}

fn is_footer_line(lower: &str) -> bool {
    lower.contains("www.") || lower.contains("obrigado") || lower.starts_with("op:")
}

/// `qty  name …  price` with the price right-aligned as the last token.
fn parse_item_line(line: &str) -> Option<OrderItem> {
    let mut rest = line.trim();
    let qty_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if qty_len == 0 {
        return None;
    }
    let quantity: i64 = rest[..qty_len].parse().ok()?;
    rest = rest[qty_len..].strip_prefix(char::is_whitespace)?.trim();

    let (name, price_tok) = rest.rsplit_once(char::is_whitespace)?;
    let price = money_token(price_tok)?;
    let name = name.trim();
    if name.is_empty() || quantity < 1 {
        return None;
    }

    let unit = if price % quantity == 0 { price / quantity } else { price };
    Some(OrderItem {
        name: name.to_string(),
        quantity,
        unit_price_cents: unit,
        total_price_cents: price,
        options: Vec::new(),
        observation: None,
    })
}

fn parse_totals_line(lower: &str, line: &str, totals: &mut OrderTotals) -> bool {
    let Some(cents) = last_money_token(line) else {
        return false;
    };
    if lower.starts_with("total itens") || lower.starts_with("subtotal") {
        totals.subtotal_cents = cents;
    } else if lower.contains("taxa de entrega") || lower.starts_with("taxa") {
        totals.delivery_fee_cents = cents;
    } else if lower.contains("acresc") || lower.contains("acrésc") {
        totals.extra_charges_cents = cents;
    } else if lower.starts_with("desconto") {
        totals.discount_cents = cents;
    } else if lower.starts_with("total") {
        totals.grand_total_cents = cents;
    } else {
        return false;
    }
    true
}

fn parse_payment_line(line: &str) -> Option<Payment> {
    let (label, amount_tok) = line.rsplit_once(char::is_whitespace)?;
    let amount = money_token(amount_tok)?;
    let label = label.trim();
    let lower = label.to_lowercase();

    let (method, prepaid) = if lower.contains("voucher") {
        ("VOUCHER".to_string(), true)
    } else if lower.contains("dinheiro") || lower.contains("cash") {
        ("CASH".to_string(), false)
    } else if lower.contains("online") {
        ("ONLINE".to_string(), true)
    } else if label.is_empty() {
        return None;
    } else {
        (label.to_uppercase(), false)
    };
    Some(Payment {
        method,
        amount_cents: amount,
        prepaid,
    })
}

fn looks_like_address(line: &str) -> bool {
    let lower = line.to_lowercase();
    if STREET_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return true;
    }
    // "…, 101" — a short house-number segment after a comma.
    line.split(", ").skip(1).any(|seg| {
        let digits = seg.chars().take_while(|c| c.is_ascii_digit()).count();
        (1..=5).contains(&digits) && digits == seg.trim_end_matches(|c: char| !c.is_ascii_digit()).len()
    })
}

// ---------------------------------------------------------------------------
// Token helpers
// ---------------------------------------------------------------------------

/// A money token is all digits with a single `.` or `,` before the final
/// two. Labels like `Desconto(-)` must not leak their sign into the value,
/// so only the token itself is parsed.
fn money_token(tok: &str) -> Option<i64> {
    let tok = tok.trim();
    if tok.len() < 4 {
        return None;
    }
    let sep_at = tok.len().checked_sub(3)?;
    if !tok.is_char_boundary(sep_at) {
        return None;
    }
    let (head, tail) = tok.split_at(sep_at);
    if !matches!(tail.chars().next(), Some('.') | Some(',')) {
        return None;
    }
    if !tail[1..].chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !head.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') || head.is_empty() {
        return None;
    }
    parse_money_cents(tok)
}

fn last_money_token(line: &str) -> Option<i64> {
    line.split_whitespace().rev().find_map(money_token)
}

/// First span of 8–14 digits; spaces, dashes and parentheses inside the
/// span are tolerated, anything else ends it.
fn extract_phone(line: &str) -> Option<String> {
    let mut runs: Vec<String> = Vec::new();
    let mut cur = String::new();
    for c in line.chars() {
        if c.is_ascii_digit() {
            cur.push(c);
        } else if matches!(c, ' ' | '-' | '(' | ')' | '+') {
            // neutral inside a span
        } else if !cur.is_empty() {
            runs.push(std::mem::take(&mut cur));
        }
    }
    if !cur.is_empty() {
        runs.push(cur);
    }
    runs.into_iter()
        .find(|r| (8..=14).contains(&r.len()))
        .and_then(|r| normalize_phone(&r))
}

fn digit_run(line: &str, min: usize, max: usize) -> Option<String> {
    let mut runs: Vec<String> = Vec::new();
    let mut cur = String::new();
    for c in line.chars() {
        if c.is_ascii_digit() {
            cur.push(c);
        } else if !cur.is_empty() {
            runs.push(std::mem::take(&mut cur));
        }
    }
    if !cur.is_empty() {
        runs.push(cur);
    }
    runs.into_iter().find(|r| (min..=max).contains(&r.len()))
}
