//! Reduces the upstream inference response, whatever its shape, to the
//! canonical [`ChatResponse`] envelope.

use serde_json::Value;
use tracing::warn;

use crate::{
    inference::profile::{ASSISTANT_MARKER, SYSTEM_PREAMBLE, USER_MARKER},
    models::ChatResponse,
};

pub const FALLBACK_REPLY: &str = "I couldn't generate a response. Please try again.";

pub type Extractor = fn(&Value) -> Option<String>;

/// Tried in order; the first non-empty match wins.
pub const EXTRACTORS: &[Extractor] = &[
    chat_choice_content,
    completion_generated_text,
    bare_message,
];

pub fn normalize(result: &Value) -> ChatResponse {
    let text = extract_text(result).unwrap_or_else(|| {
        warn!("no usable text in inference response, sending fallback reply");
        FALLBACK_REPLY.to_owned()
    });
    ChatResponse::assistant(text)
}

pub fn extract_text(result: &Value) -> Option<String> {
    EXTRACTORS
        .iter()
        .filter_map(|extract| extract(result))
        .find(|text| !text.trim().is_empty())
}

/// `choices[0].message.content`
pub fn chat_choice_content(result: &Value) -> Option<String> {
    result
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(|content| content.trim().to_owned())
}

/// `results[0].generated_text`, minus any echoed prompt.
pub fn completion_generated_text(result: &Value) -> Option<String> {
    result
        .pointer("/results/0/generated_text")
        .and_then(Value::as_str)
        .map(strip_echoed_prompt)
}

pub fn bare_message(result: &Value) -> Option<String> {
    result
        .get("message")
        .and_then(Value::as_str)
        .map(|message| message.trim().to_owned())
}

fn strip_echoed_prompt(text: &str) -> String {
    let leading = text.trim_start();
    let echoed = leading.starts_with(SYSTEM_PREAMBLE) || leading.starts_with(USER_MARKER);
    let reply = match leading.find(ASSISTANT_MARKER) {
        Some(index) if echoed => &leading[index + ASSISTANT_MARKER.len()..],
        _ => leading,
    };
    let reply = reply.trim();
    reply
        .strip_suffix(USER_MARKER)
        .unwrap_or(reply)
        .trim()
        .to_owned()
}
