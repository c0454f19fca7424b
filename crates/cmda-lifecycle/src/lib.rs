//! Order lifecycle state machine.
//!
//! # Design
//!
//! A pure function over `(current, requested)` against a fixed directed
//! graph. Every caller that wants to change an order's status MUST check
//! [`can_transition`] first. A denied transition is **not an error**: it
//! means "ignore this stale or duplicate instruction and keep the current
//! status". The same external status event can arrive more than once, out
//! of order, after the order has already progressed further locally — a
//! webhook replaying an old "placed" event against a delivered order must
//! be a no-op, never a regression.
//!
//! # State diagram
//!
//! ```text
//! New ──► Confirmed ──► InPreparation ──► Ready ──► Dispatched ──► Delivered
//!  │          │               │             │           (term.)       (term.)
//!  └──────────┴───────────────┴─────────────┴──► Canceled (term.)
//! ```

use serde::{Deserialize, Serialize};

/// All valid lifecycle states of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Confirmed,
    InPreparation,
    Ready,
    Dispatched,
    Delivered,
    Canceled,
}

impl OrderStatus {
    /// Case-insensitive parse of the wire/storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Some(Self::New),
            "CONFIRMED" => Some(Self::Confirmed),
            "IN_PREPARATION" => Some(Self::InPreparation),
            "READY" => Some(Self::Ready),
            "DISPATCHED" => Some(Self::Dispatched),
            "DELIVERED" => Some(Self::Delivered),
            "CANCELED" | "CANCELLED" => Some(Self::Canceled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Confirmed => "CONFIRMED",
            Self::InPreparation => "IN_PREPARATION",
            Self::Ready => "READY",
            Self::Dispatched => "DISPATCHED",
            Self::Delivered => "DELIVERED",
            Self::Canceled => "CANCELED",
        }
    }

    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Canceled)
    }
}

/// The states reachable from `from` in one step.
pub fn allowed_targets(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match from {
        New => &[Confirmed, Canceled],
        Confirmed => &[InPreparation, Canceled],
        InPreparation => &[Ready, Canceled],
        Ready => &[Dispatched, Canceled],
        Dispatched => &[Delivered],
        Delivered => &[],
        Canceled => &[],
    }
}

/// Whether `from → to` is a legal transition.
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// String-level convenience for callers holding raw status values.
/// Unknown strings never allow a transition.
pub fn can_transition_str(from: &str, to: &str) -> bool {
    match (OrderStatus::parse(from), OrderStatus::parse(to)) {
        (Some(f), Some(t)) => can_transition(f, t),
        _ => false,
    }
}
