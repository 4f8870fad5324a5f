//! Event sinks.
//!
//! A sink receives each accepted event exactly once. Logging and dry-run
//! sinks live here; speech and relay sinks are in their own modules and are
//! combined through [`FanoutSink`].

use std::sync::Arc;

use tracing::info;

use crate::domain::CanonicalEvent;

/// Consumer of accepted events.
///
/// Called synchronously from detector tasks, so implementations should hand
/// slow work off instead of blocking.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &CanonicalEvent);
}

/// Logs each event at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn on_event(&self, event: &CanonicalEvent) {
        info!(
            source = %event.source(),
            "[{}] {}",
            event.observed_at_time().with_timezone(&chrono::Local).format("%H:%M:%S"),
            event
        );
    }
}

/// Prints each event to stdout instead of announcing it
#[derive(Debug, Default, Clone, Copy)]
pub struct PrintSink;

impl PrintSink {
    pub fn format(event: &CanonicalEvent) -> String {
        format!(
            "[DRY RUN] [{}] {}",
            event.observed_at_time().with_timezone(&chrono::Local).format("%H:%M:%S"),
            event
        )
    }
}

impl EventSink for PrintSink {
    fn on_event(&self, event: &CanonicalEvent) {
        println!("{}", Self::format(event));
    }
}

/// Forwards every event to each inner sink in order
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn on_event(&self, event: &CanonicalEvent) {
        for sink in &self.sinks {
            sink.on_event(event);
        }
    }
}
