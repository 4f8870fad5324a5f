//! Notification store payload parsing.
//!
//! Records in the notification store carry a property-list blob. Two shapes
//! are understood:
//!
//! - **Primary**: `{ req: { titl, subt, body } }`
//! - **Legacy**: keyed-archiver graph where `$objects[1]` holds integer or
//!   UID references (`NSTitle`, `NSInformativetext`) into `$objects`

use std::io::Cursor;

use chrono::Utc;
use plist::{Dictionary, Value};
use thiserror::Error;

/// Seconds between the Unix epoch and the store epoch (2001-01-01 UTC)
pub const STORE_EPOCH_OFFSET_SECS: f64 = 978_307_200.0;

/// Errors that can occur while parsing a payload
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Invalid property list: {0}")]
    Plist(#[from] plist::Error),

    #[error("Payload has no sender or message")]
    Empty,
}

/// Convert a Unix timestamp (seconds) into store time
pub fn store_time_from_unix(unix_secs: f64) -> f64 {
    unix_secs - STORE_EPOCH_OFFSET_SECS
}

/// Current wall-clock time in store time
pub fn store_time_now() -> f64 {
    store_time_from_unix(Utc::now().timestamp_millis() as f64 / 1000.0)
}

/// Sender and message extracted from a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub sender: String,
    pub message: String,
}

impl ParsedMessage {
    /// Both fields are present
    pub fn is_complete(&self) -> bool {
        !self.sender.is_empty() && !self.message.is_empty()
    }
}

/// Cleaned fields of the primary payload shape
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFields {
    pub title: String,
    pub subtitle: String,
    pub body: String,
}

impl NotificationFields {
    /// Apply the sender rules and take the body verbatim
    pub fn into_message(self) -> ParsedMessage {
        ParsedMessage {
            sender: sender_from_titles(&self.title, &self.subtitle),
            message: self.body,
        }
    }
}

/// Pick the sender from a notification title and subtitle.
///
/// - Channel message: title `"<name> in #<channel>"` → `<name>`
/// - Direct message: title is the workspace, subtitle is the sender
/// - Otherwise the title itself
pub fn sender_from_titles(title: &str, subtitle: &str) -> String {
    if let Some((name, _channel)) = title.split_once(" in #") {
        name.trim().to_string()
    } else if !subtitle.is_empty() {
        subtitle.to_string()
    } else {
        title.to_string()
    }
}

/// Replace newline, carriage return and tab with a space, drop any other
/// control character, and trim.
pub fn clean_text(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .filter_map(|c| match c {
            '\n' | '\r' | '\t' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();
    replaced.trim().to_string()
}

/// Clean a plist value into a string; undecodable bytes become empty
fn clean_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => clean_text(s),
        Some(Value::Data(bytes)) => std::str::from_utf8(bytes).map(clean_text).unwrap_or_default(),
        _ => String::new(),
    }
}

fn decode(data: &[u8]) -> Result<Value, PayloadError> {
    Ok(Value::from_reader(Cursor::new(data))?)
}

/// Read the primary `req` fields. Missing fields are empty.
pub fn parse_primary(data: &[u8]) -> Result<NotificationFields, PayloadError> {
    let root = decode(data)?;
    Ok(primary_fields(&root))
}

fn primary_fields(root: &Value) -> NotificationFields {
    let Some(req) = root
        .as_dictionary()
        .and_then(|d| d.get("req"))
        .and_then(Value::as_dictionary)
    else {
        return NotificationFields::default();
    };

    NotificationFields {
        title: clean_value(req.get("titl")),
        subtitle: clean_value(req.get("subt")),
        body: clean_value(req.get("body")),
    }
}

/// Parse a store payload, trying the primary shape then the legacy shape.
///
/// The legacy shape is only consulted when the primary shape yields neither
/// a sender nor a message.
pub fn parse_payload(data: &[u8]) -> Result<ParsedMessage, PayloadError> {
    let root = decode(data)?;

    let parsed = primary_fields(&root).into_message();
    if !parsed.sender.is_empty() || !parsed.message.is_empty() {
        return Ok(parsed);
    }

    root.as_dictionary()
        .and_then(legacy_message)
        .ok_or(PayloadError::Empty)
}

fn legacy_message(root: &Dictionary) -> Option<ParsedMessage> {
    let objects = root.get("$objects")?.as_array()?;
    let refs = objects.get(1)?.as_dictionary()?;

    let resolve = |key: &str| -> String {
        refs.get(key)
            .and_then(object_index)
            .and_then(|idx| objects.get(idx))
            .map(|v| clean_value(Some(v)))
            .unwrap_or_default()
    };

    let parsed = ParsedMessage {
        sender: resolve("NSTitle"),
        message: resolve("NSInformativetext"),
    };
    (!parsed.sender.is_empty() || !parsed.message.is_empty()).then_some(parsed)
}

fn object_index(value: &Value) -> Option<usize> {
    match value {
        Value::Uid(uid) => usize::try_from(uid.get()).ok(),
        Value::Integer(_) => value
            .as_unsigned_integer()
            .and_then(|i| usize::try_from(i).ok()),
        _ => None,
    }
}
