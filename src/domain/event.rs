//! Canonical event types.
//!
//! Every detector turns its raw payload into a `(sender, message)` pair plus
//! an [`EventMetadata`]. Accepted pairs become immutable [`CanonicalEvent`]s.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which detector produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventSource {
    /// Polling the local notification store
    Database,

    /// Observing the system-wide notification bus
    Distributed,

    /// Watching the application's data directory
    Filesystem,

    /// Hybrid detector that found real content in the store
    HybridDatabase,

    /// Hybrid detector that only saw filesystem activity
    HybridFilesystem,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Database => "database",
            EventSource::Distributed => "distributed",
            EventSource::Filesystem => "filesystem",
            EventSource::HybridDatabase => "hybrid-database",
            EventSource::HybridFilesystem => "hybrid-filesystem",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata a detector attaches to every callback invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMetadata {
    /// The detector that produced the event
    pub source: EventSource,

    /// Source-specific diagnostic fields (record uuid, bus name, path)
    pub raw: BTreeMap<String, String>,
}

impl EventMetadata {
    pub fn new(source: EventSource) -> Self {
        Self {
            source,
            raw: BTreeMap::new(),
        }
    }

    /// Attach a diagnostic field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.raw.insert(key.into(), value.into());
        self
    }
}

/// A normalized incoming message that passed the bot filter and dedup stage.
///
/// Constructed only with non-empty sender and message; immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    sender: String,
    message: String,
    observed_at: DateTime<Utc>,
    source: EventSource,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    raw: BTreeMap<String, String>,
}

impl CanonicalEvent {
    /// Build an event observed now. Returns `None` if sender or message is empty.
    pub fn new(sender: &str, message: &str, metadata: EventMetadata) -> Option<Self> {
        Self::observed_at(sender, message, metadata, Utc::now())
    }

    /// Build an event with an explicit observation time
    pub fn observed_at(
        sender: &str,
        message: &str,
        metadata: EventMetadata,
        observed_at: DateTime<Utc>,
    ) -> Option<Self> {
        let sender = sender.trim();
        let message = message.trim();
        if sender.is_empty() || message.is_empty() {
            return None;
        }

        Some(Self {
            sender: sender.to_string(),
            message: message.to_string(),
            observed_at,
            source: metadata.source,
            raw: metadata.raw,
        })
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn observed_at_time(&self) -> DateTime<Utc> {
        self.observed_at
    }

    pub fn source(&self) -> EventSource {
        self.source
    }

    pub fn raw(&self) -> &BTreeMap<String, String> {
        &self.raw
    }
}

impl fmt::Display for CanonicalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.sender, self.message)
    }
}

/// Shorten a message for log lines
pub fn preview(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &message[..idx]),
        None => message.to_string(),
    }
}
