//! Sender/message extraction from bus event metadata.

use std::collections::HashMap;

const SENDER_KEYS: &[&str] = &["title", "sender", "from"];
const MESSAGE_KEYS: &[&str] = &["body", "message", "text"];

/// First non-empty value among `keys`, cleaned
fn first_non_empty(info: &HashMap<String, String>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| info.get(*key))
        .map(|value| super::clean_text(value))
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

/// Extract `(sender, message)` from a user-info map.
///
/// Returns `None` unless both are non-empty.
pub fn extract_message(info: &HashMap<String, String>) -> Option<(String, String)> {
    let sender = first_non_empty(info, SENDER_KEYS);
    let message = first_non_empty(info, MESSAGE_KEYS);

    if sender.is_empty() || message.is_empty() {
        None
    } else {
        Some((sender, message))
    }
}
