pub mod money;
pub mod order;
pub mod print;

pub use money::{format_cents, parse_money_cents};
pub use order::{
    CanonicalOrder, Customer, DeliveryAddress, OrderHistoryEntry, OrderItem, OrderItemOption,
    OrderRecord, OrderTotals, OrderType, Payment,
};
pub use print::{PrintJob, PrintJobDraft, RenderedTicket};
