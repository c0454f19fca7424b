//! Payload normalization: every order source (marketplace webhook JSON,
//! base64-wrapped POS exports, raw printer dumps) converges on one
//! [`CanonicalOrder`] shape.
//!
//! The pipeline never fails: decodings are attempted in order of fidelity
//! (structured JSON, base64, embedded JSON block, printer rows) and the
//! final fallback is a minimal well-typed order so downstream persistence
//! and printing keep working on garbage input.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use cmda_schemas::order::CanonicalOrder;

mod decode;
mod dump;
mod structured;

pub use decode::{decode_payload, extract_embedded_json};
pub use dump::{parse_print_rows, print_rows, strip_markup};
pub use structured::map_structured;

/// Remote extraction seam: given raw payload text, return a structured
/// JSON guess plus the verbatim response for audit. Implementations live
/// outside this crate; the normalizer only consumes the trait.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, raw_text: &str) -> ExtractionOutcome;
}

#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub parsed: Option<Value>,
    pub raw_response: String,
}

#[derive(Default)]
pub struct Normalizer {
    extractor: Option<Arc<dyn Extractor>>,
}

impl Normalizer {
    pub fn new() -> Self {
        Normalizer { extractor: None }
    }

    /// Attach a remote extractor consulted before local heuristics.
    pub fn with_extractor(extractor: Arc<dyn Extractor>) -> Self {
        Normalizer {
            extractor: Some(extractor),
        }
    }

    /// Normalize a raw payload. The extractor (when configured) gets first
    /// try; an empty or unusable extraction falls through to the local
    /// pipeline rather than surfacing an error.
    pub async fn normalize(&self, raw: &str, source_id: &str) -> CanonicalOrder {
        if let Some(extractor) = &self.extractor {
            let outcome = extractor.extract(raw).await;
            match outcome.parsed {
                Some(parsed) if payload_looks_populated(&parsed) => {
                    debug!(source_id, "extractor produced a populated payload");
                    return map_structured(&parsed, source_id);
                }
                Some(_) => {
                    warn!(source_id, "extractor payload empty, using local pipeline");
                }
                None => {
                    warn!(source_id, "extractor returned nothing, using local pipeline");
                }
            }
        }
        self.normalize_local(raw, source_id)
    }

    /// The local pipeline: decode, detect printer rows, map; fall back to
    /// a minimal order when nothing decodes.
    pub fn normalize_local(&self, raw: &str, source_id: &str) -> CanonicalOrder {
        match decode::decode_payload(raw) {
            Some(payload) => {
                if let Some(rows) = dump::print_rows(&payload) {
                    debug!(source_id, rows = rows.len(), "payload is a printer dump");
                    return dump::parse_print_rows(&rows, payload, source_id);
                }
                structured::map_structured(&payload, source_id)
            }
            None => {
                warn!(source_id, "payload undecodable, emitting fallback order");
                CanonicalOrder::fallback(source_id, Value::String(truncate_for_audit(raw)))
            }
        }
    }
}

/// Heuristic acceptance check for extractor output: at least one
/// substantive field must be present (items, a positive total, customer
/// name or phone, a delivery address, or a display id), otherwise local
/// parsing is the better bet.
pub fn payload_looks_populated(payload: &Value) -> bool {
    let root = payload.get("order").filter(|v| v.is_object()).unwrap_or(payload);

    let has_items = root
        .get("items")
        .and_then(Value::as_array)
        .map_or(false, |a| !a.is_empty());
    let has_total = root
        .pointer("/total/orderAmount")
        .or_else(|| root.get("totalAmount"))
        .map_or(false, |v| match v {
            Value::Number(n) => n.as_f64().unwrap_or(0.0) > 0.0,
            Value::String(s) => !s.trim().is_empty(),
            _ => false,
        });
    let has_customer = root
        .pointer("/customer/name")
        .and_then(Value::as_str)
        .map_or(false, |s| !s.trim().is_empty())
        || structured::mapped_phone(root).is_some();
    let has_address = structured::map_address(root).formatted.is_some();
    let has_display = root.get("displayId").map_or(false, |v| !v.is_null());

    has_items || has_total || has_customer || has_address || has_display
}

/// Digits-only phone normalization; `None` when no digits survive.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// Undecodable payloads are kept for audit, but capped.
fn truncate_for_audit(raw: &str) -> String {
    const MAX: usize = 4096;
    if raw.len() <= MAX {
        return raw.to_string();
    }
    let mut end = MAX;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    raw[..end].to_string()
}
