use serde_json::{Map, Value};

/// Render `template` against `ctx` (a JSON object).
///
/// Unknown keys render empty; malformed blocks (a `{{#each}}` with no
/// matching `{{/each}}`) are left verbatim rather than erroring.
pub fn render(template: &str, ctx: &Value) -> String {
    let out = process_blocks(template, ctx);
    replace_placeholders(&out, ctx)
}

// ---------------------------------------------------------------------------
// Block processing
// ---------------------------------------------------------------------------

/// Expand every `{{#each …}}` and `{{#if …}}` block in `text`, recursing
/// into block bodies. Plain `{{key}}` placeholders outside blocks are left
/// for the caller's final replacement pass.
fn process_blocks(text: &str, ctx: &Value) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;

    while let Some((tag, key, open_at, body_at)) = next_open_tag(text, pos) {
        out.push_str(&text[pos..open_at]);

        let Some((body, after)) = find_matching_close(text, body_at, tag) else {
            // No matching close: emit the opening tag verbatim and move on.
            out.push_str(&text[open_at..body_at]);
            pos = body_at;
            continue;
        };

        match tag {
            Tag::Each => {
                if let Some(items) = lookup(ctx, &key).and_then(Value::as_array) {
                    for item in items {
                        let merged = merge_context(ctx, item);
                        let expanded = process_blocks(body, &merged);
                        out.push_str(&replace_placeholders(&expanded, &merged));
                    }
                }
            }
            Tag::If => {
                if is_truthy(lookup(ctx, &key)) {
                    let expanded = process_blocks(body, ctx);
                    out.push_str(&replace_placeholders(&expanded, ctx));
                }
            }
        }
        pos = after;
    }

    out.push_str(&text[pos..]);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Each,
    If,
}

impl Tag {
    fn open_prefix(&self) -> &'static str {
        match self {
            Tag::Each => "{{#each",
            Tag::If => "{{#if",
        }
    }

    fn close_marker(&self) -> &'static str {
        match self {
            Tag::Each => "{{/each}}",
            Tag::If => "{{/if}}",
        }
    }
}

/// Find the earliest block-opening tag at or after `from`.
/// Returns `(tag, key, open_index, body_index)`.
fn next_open_tag(text: &str, from: usize) -> Option<(Tag, String, usize, usize)> {
    let mut best: Option<(Tag, String, usize, usize)> = None;
    for tag in [Tag::Each, Tag::If] {
        if let Some((key, open_at, body_at)) = find_open(text, from, tag) {
            if best.as_ref().map_or(true, |b| open_at < b.2) {
                best = Some((tag, key, open_at, body_at));
            }
        }
    }
    best
}

/// Scan for `{{#each key}}` / `{{#if key}}` starting at `from`.
fn find_open(text: &str, from: usize, tag: Tag) -> Option<(String, usize, usize)> {
    let prefix = tag.open_prefix();
    let mut search = from;
    while let Some(rel) = text[search..].find(prefix) {
        let open_at = search + rel;
        let rest = &text[open_at + prefix.len()..];
        // Require a space, a word key, then "}}".
        if let Some(rest) = rest.strip_prefix(' ') {
            let key_len = rest
                .char_indices()
                .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
                .count();
            if key_len > 0 && rest[key_len..].starts_with("}}") {
                let key = rest[..key_len].to_string();
                let body_at = open_at + prefix.len() + 1 + key_len + 2;
                return Some((key, open_at, body_at));
            }
        }
        search = open_at + prefix.len();
    }
    None
}

/// Depth-counted search for the close marker matching an already-consumed
/// open tag. Returns the block body and the index just past the close.
fn find_matching_close(text: &str, body_at: usize, tag: Tag) -> Option<(&str, usize)> {
    let open = tag.open_prefix();
    let close = tag.close_marker();
    let mut depth = 1usize;
    let mut i = body_at;

    while depth > 0 {
        let next_close = text[i..].find(close).map(|r| i + r)?;
        let next_open = text[i..].find(open).map(|r| i + r);
        match next_open {
            Some(o) if o < next_close => {
                depth += 1;
                i = o + open.len();
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    return Some((&text[body_at..next_close], next_close + close.len()));
                }
                i = next_close + close.len();
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Placeholders and context
// ---------------------------------------------------------------------------

/// Replace every simple `{{key}}` with its stringified context value.
fn replace_placeholders(text: &str, ctx: &Value) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;

    while let Some(rel) = text[pos..].find("{{") {
        let open_at = pos + rel;
        out.push_str(&text[pos..open_at]);
        let rest = &text[open_at + 2..];
        let key_len = rest
            .char_indices()
            .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
            .count();
        if key_len > 0 && rest[key_len..].starts_with("}}") {
            let key = &rest[..key_len];
            out.push_str(&value_to_string(lookup(ctx, key)));
            pos = open_at + 2 + key_len + 2;
        } else {
            // Not a simple placeholder (block marker or malformed): verbatim.
            out.push_str("{{");
            pos = open_at + 2;
        }
    }

    out.push_str(&text[pos..]);
    out
}

fn lookup<'a>(ctx: &'a Value, key: &str) -> Option<&'a Value> {
    ctx.as_object().and_then(|m| m.get(key))
}

fn value_to_string(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        // Containers and null render empty rather than dumping JSON.
        _ => String::new(),
    }
}

/// Parent context merged with the current iteration item; item keys win.
fn merge_context(parent: &Value, item: &Value) -> Value {
    let mut merged: Map<String, Value> = parent.as_object().cloned().unwrap_or_default();
    if let Some(obj) = item.as_object() {
        for (k, v) in obj {
            merged.insert(k.clone(), v.clone());
        }
    }
    Value::Object(merged)
}

fn is_truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !(s.is_empty() || s == "0" || s == "0.00"),
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(_)) => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitution_and_missing_key() {
        let ctx = json!({ "name": "Ana" });
        assert_eq!(render("Olá {{name}}!", &ctx), "Olá Ana!");
        assert_eq!(render("Olá {{missing}}!", &ctx), "Olá !");
    }

    #[test]
    fn if_literal_truthy_case() {
        let t = "Olá {{name}}{{#if vip}} VIP{{/if}}";
        assert_eq!(
            render(t, &json!({ "name": "Ana", "vip": "1" })),
            "Olá Ana VIP"
        );
        assert_eq!(render(t, &json!({ "name": "Ana", "vip": "0" })), "Olá Ana");
    }

    #[test]
    fn if_falsy_variants() {
        let t = "{{#if x}}Y{{/if}}";
        for falsy in [json!({}), json!({"x": ""}), json!({"x": "0.00"}), json!({"x": null})] {
            assert_eq!(render(t, &falsy), "", "{falsy}");
        }
        assert_eq!(render(t, &json!({"x": "0.01"})), "Y");
    }

    #[test]
    fn each_literal_iteration_case() {
        let t = "{{#each items}}{{qty}}x {{name}};{{/each}}";
        let ctx = json!({
            "items": [ { "qty": 2, "name": "Pizza" }, { "qty": 1, "name": "Suco" } ]
        });
        assert_eq!(render(t, &ctx), "2x Pizza;1x Suco;");
    }

    #[test]
    fn each_over_missing_or_empty_list_renders_nothing() {
        let t = "A{{#each items}}X{{/each}}B";
        assert_eq!(render(t, &json!({})), "AB");
        assert_eq!(render(t, &json!({ "items": [] })), "AB");
    }

    #[test]
    fn each_item_overrides_parent_key() {
        let t = "{{#each items}}{{label}} {{/each}}";
        let ctx = json!({
            "label": "parent",
            "items": [ { "label": "child" }, {} ]
        });
        assert_eq!(render(t, &ctx), "child parent ");
    }

    #[test]
    fn if_nested_inside_each_uses_depth_matching() {
        // The inner {{/if}} must not terminate the outer scan early.
        let t = "{{#each items}}{{name}}{{#if note}} ({{note}}){{/if}};{{/each}}";
        let ctx = json!({
            "items": [
                { "name": "Dog", "note": "no onion" },
                { "name": "Burger" }
            ]
        });
        assert_eq!(render(t, &ctx), "Dog (no onion);Burger;");
    }

    #[test]
    fn each_nested_inside_each() {
        let t = "{{#each items}}{{name}}:{{#each opts}}{{o}},{{/each}};{{/each}}";
        let ctx = json!({
            "items": [
                { "name": "A", "opts": [ { "o": 1 }, { "o": 2 } ] },
                { "name": "B", "opts": [] }
            ]
        });
        assert_eq!(render(t, &ctx), "A:1,2,;B:;");
    }

    #[test]
    fn nested_if_inside_if() {
        let t = "{{#if a}}A{{#if b}}B{{/if}}{{/if}}";
        assert_eq!(render(t, &json!({ "a": "1", "b": "1" })), "AB");
        assert_eq!(render(t, &json!({ "a": "1", "b": "0" })), "A");
        assert_eq!(render(t, &json!({ "a": "0", "b": "1" })), "");
    }

    #[test]
    fn unclosed_block_left_verbatim() {
        let t = "x{{#if a}}never closed";
        let out = render(t, &json!({ "a": "1" }));
        assert!(out.contains("{{#if"), "{out}");
    }

    #[test]
    fn number_context_values_render() {
        assert_eq!(render("{{n}}", &json!({ "n": 42 })), "42");
    }
}
