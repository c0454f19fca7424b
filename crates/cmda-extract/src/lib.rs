//! Remote extraction over a chat-completion API.
//!
//! Implements the normalizer's [`Extractor`] seam by asking a hosted model
//! to restructure an opaque POS payload into the provider-neutral JSON the
//! structured mapper already understands. Any transport or parse failure
//! degrades to an empty outcome; the caller's local pipeline is the safety
//! net, so nothing here is allowed to take an order down.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use cmda_normalizer::{extract_embedded_json, ExtractionOutcome, Extractor};

const SYSTEM_PROMPT: &str = "You convert point-of-sale order payloads into a single JSON object \
with keys: id, displayId, customer {name, phone}, deliveryAddress {formattedAddress}, \
items [{name, quantity, unitPrice, totalPrice, observations}], \
total {subTotal, deliveryFee, benefits, orderAmount}, \
payments {methods: [{method, value, type}]}, orderType. \
Monetary values are decimal numbers in currency units. \
Reply with the JSON object only, no prose, no code fences.";

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    /// Payloads longer than this are truncated before upload.
    pub max_input_bytes: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        ExtractConfig {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(30),
            max_input_bytes: 24 * 1024,
        }
    }
}

#[derive(Debug)]
pub enum ExtractError {
    Http(reqwest::Error),
    BadStatus(u16),
    EmptyResponse,
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::Http(e) => write!(f, "extraction request failed: {e}"),
            ExtractError::BadStatus(code) => write!(f, "extraction API returned status {code}"),
            ExtractError::EmptyResponse => write!(f, "extraction API returned no content"),
        }
    }
}

impl std::error::Error for ExtractError {}

impl From<reqwest::Error> for ExtractError {
    fn from(e: reqwest::Error) -> Self {
        ExtractError::Http(e)
    }
}

pub struct ChatExtractor {
    client: reqwest::Client,
    config: ExtractConfig,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl ChatExtractor {
    pub fn new(config: ExtractConfig) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(ChatExtractor { client, config })
    }

    async fn request(&self, raw_text: &str) -> Result<String, ExtractError> {
        let input = truncate_utf8(raw_text, self.config.max_input_bytes);
        let body = json!({
            "model": self.config.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": input },
            ],
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ExtractError::BadStatus(status.as_u16()));
        }

        let parsed: ChatResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ExtractError::EmptyResponse)
    }
}

#[async_trait]
impl Extractor for ChatExtractor {
    async fn extract(&self, raw_text: &str) -> ExtractionOutcome {
        match self.request(raw_text).await {
            Ok(content) => {
                let parsed = parse_model_reply(&content);
                if parsed.is_none() {
                    warn!("extraction reply carried no parseable JSON");
                } else {
                    debug!(bytes = content.len(), "extraction reply parsed");
                }
                ExtractionOutcome {
                    parsed,
                    raw_response: content,
                }
            }
            Err(e) => {
                warn!(error = %e, "extraction unavailable");
                ExtractionOutcome::default()
            }
        }
    }
}

/// Model replies sometimes wrap the JSON in code fences or prose despite
/// instructions; strip fences, then fall back to scanning for an embedded
/// object.
pub fn parse_model_reply(content: &str) -> Option<Value> {
    let trimmed = strip_code_fences(content.trim());
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        if v.is_object() {
            return Some(v);
        }
    }
    extract_embedded_json(trimmed).filter(Value::is_object)
}

fn strip_code_fences(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // Skip the optional language tag on the opening fence line.
    let rest = rest.find('\n').map(|i| &rest[i + 1..]).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_reply() {
        let v = parse_model_reply(r#"{"id":"x","items":[]}"#).unwrap();
        assert_eq!(v["id"], "x");
    }

    #[test]
    fn fenced_reply_with_language_tag() {
        let reply = "```json\n{\"id\":\"fenced\"}\n```";
        assert_eq!(parse_model_reply(reply).unwrap()["id"], "fenced");
    }

    #[test]
    fn prose_wrapped_reply() {
        let reply = "Here is the order:\n{\"id\":\"prose\",\"total\":{\"orderAmount\":10}}\nDone.";
        assert_eq!(parse_model_reply(reply).unwrap()["id"], "prose");
    }

    #[test]
    fn non_object_replies_rejected() {
        assert!(parse_model_reply("[1,2,3]").is_none());
        assert!(parse_model_reply("I could not parse that.").is_none());
        assert!(parse_model_reply("").is_none());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "aé".repeat(100);
        let t = truncate_utf8(&s, 5);
        assert!(t.len() <= 5);
        assert!(s.starts_with(t));
    }
}
