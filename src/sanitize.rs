//! Removes upstream-only fields from completion payloads.

use serde_json::{Map, Value};

/// Keys the upstream adds that strict OpenAI clients reject.
pub const DENYLISTED_FIELDS: &[&str] = &[
    "provider",
    "native_finish_reason",
    "reasoning",
    "reasoning_details",
];

/// Removed from `usage` only.
pub const DENYLISTED_USAGE_FIELDS: &[&str] = &["prompt_tokens_details"];

/// Marker on the upstream's keep-alive comment lines.
pub const KEEPALIVE_MARKER: &str = ": OPENROUTER PROCESSING";

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

/// Strips denylisted fields from a completion object or chunk in place.
///
/// Covers the top level, `usage`, and each choice together with its
/// `delta` and `message`. Anything that is not an object is left alone.
pub fn strip_upstream_fields(value: &mut Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };
    remove_keys(obj, DENYLISTED_FIELDS);
    if let Some(usage) = obj.get_mut("usage").and_then(|v| v.as_object_mut()) {
        remove_keys(usage, DENYLISTED_USAGE_FIELDS);
    }
    if let Some(choices) = obj.get_mut("choices").and_then(|v| v.as_array_mut()) {
        for choice in choices.iter_mut().filter_map(|c| c.as_object_mut()) {
            remove_keys(choice, DENYLISTED_FIELDS);
            for key in ["delta", "message"] {
                if let Some(inner) = choice.get_mut(key).and_then(|v| v.as_object_mut()) {
                    remove_keys(inner, DENYLISTED_FIELDS);
                }
            }
        }
    }
}

fn remove_keys(obj: &mut Map<String, Value>, keys: &[&str]) {
    for key in keys {
        obj.remove(*key);
    }
}

/// Applies the stream policy to one upstream line (without its newline).
///
/// Returns `None` for lines to drop. `data:` payloads are reshaped when
/// they parse as JSON and passed through verbatim otherwise.
pub fn relay_line(line: &str) -> Option<String> {
    if line.contains(KEEPALIVE_MARKER) {
        return None;
    }
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Some(line.to_string());
    };
    if payload.trim() == DONE_SENTINEL {
        return Some(line.to_string());
    }
    match serde_json::from_str::<Value>(payload) {
        Ok(mut chunk) => {
            strip_upstream_fields(&mut chunk);
            Some(format!("{DATA_PREFIX}{chunk}"))
        }
        Err(err) => {
            tracing::debug!("passing through unparseable stream chunk: {err}");
            Some(line.to_string())
        }
    }
}
