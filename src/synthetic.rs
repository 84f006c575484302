//! Completion payloads fabricated locally when the upstream refuses a
//! request, so clients that cannot handle HTTP errors still get a
//! renderable answer.

use serde_json::{Value, json};

pub const UNAVAILABLE_PREFIX: &str = "Model unavailable: ";

const PROMPT_TOKENS: u64 = 0;
const COMPLETION_TOKENS: u64 = 1;

pub fn unavailable_content(message: &str) -> String {
    format!("{UNAVAILABLE_PREFIX}{message}")
}

fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

fn usage() -> Value {
    json!({
        "prompt_tokens": PROMPT_TOKENS,
        "completion_tokens": COMPLETION_TOKENS,
        "total_tokens": PROMPT_TOKENS + COMPLETION_TOKENS
    })
}

/// A `chat.completion` object whose single assistant message carries the error.
pub fn error_completion(model: &str, message: &str) -> Value {
    json!({
        "id": completion_id(),
        "object": "chat.completion",
        "created": now_ts(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": unavailable_content(message)
            },
            "finish_reason": "stop"
        }],
        "usage": usage()
    })
}

/// The streaming counterpart of [`error_completion`]: one terminal chunk.
pub fn error_chunk(model: &str, message: &str) -> Value {
    json!({
        "id": completion_id(),
        "object": "chat.completion.chunk",
        "created": now_ts(),
        "model": model,
        "choices": [{
            "index": 0,
            "delta": {
                "role": "assistant",
                "content": unavailable_content(message)
            },
            "finish_reason": "stop"
        }],
        "usage": usage()
    })
}
