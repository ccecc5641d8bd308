//! Helpers for pulling JSON out of markdown-wrapped model replies.
//!
//! Models often fence their JSON or prepend prose; callers own parsing, so
//! these helpers only locate and decode the leading JSON value.

use serde_json::Value;

/// Extract the first JSON object (`{...}`) from the reply.
pub fn extract_json_object(reply: &str) -> Option<Value> {
    extract_between(reply, '{', '}')
}

/// Extract the first JSON array (`[...]`) from the reply.
pub fn extract_json_array(reply: &str) -> Option<Value> {
    extract_between(reply, '[', ']')
}

fn extract_between(reply: &str, open: char, close: char) -> Option<Value> {
    let start = reply.find(open)?;
    let end = reply.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&reply[start..=end]).ok()
}
