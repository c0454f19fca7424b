//! Logic-less ticket templating.
//!
//! Exactly three constructs over a flat or one-level-nested context:
//!
//! - `{{key}}` substitution — missing key renders as the empty string,
//!   never an error;
//! - `{{#each listKey}} … {{/each}}` iteration — each iteration's context
//!   is the parent context merged with the current item, child overrides
//!   parent;
//! - `{{#if key}} … {{/if}}` conditionals — falsy is absent, empty string,
//!   or the literal `"0"` / `"0.00"`.
//!
//! Open/close markers are matched by depth counting, not first-close-tag
//! matching, so an `if` nested inside an `each` (optional item modifiers on
//! a receipt) resolves correctly. The renderer has no access to code:
//! store-customizable templates are data-only by design.

mod context;
mod render;

pub use context::{ticket_context, TicketSettings};
pub use render::render;

/// Stock receipt layout used when a store has not customized its template.
pub const DEFAULT_TICKET: &str = "\
================================
{{header_name}}
{{header_city}}
================================

*** ORDER #{{display_id}} ***
Date: {{order_date}}  Time: {{order_time}}
{{#if order_type}}Type: {{order_type}}
{{/if}}
--------------------------------
CUSTOMER: {{customer_name}}
Phone: {{customer_phone}}
Address: {{customer_address}}
{{#if pickup_code}}Pickup code: {{pickup_code}}
{{/if}}--------------------------------

QT  Description            Value
{{#each items}}{{item_qty}}x {{item_name}}  {{item_price}}
{{#each item_options}}  +{{option_qty}} {{option_name}}  {{option_price}}
{{/each}}{{#if notes}}  - {{notes}}
{{/if}}{{/each}}
--------------------------------
Items: {{total_items_count}}
Subtotal:       {{subtotal}}
{{#if delivery_fee}}Delivery fee:   {{delivery_fee}}
{{/if}}{{#if discount}}Discount:       {{discount}}
{{/if}}TOTAL:          {{total}}
{{#each payments}}{{payment_method}}  {{payment_value}}
{{/each}}{{#if observations}}
Obs: {{observations}}
{{/if}}================================
";
