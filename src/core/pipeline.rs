//! The filter stage between detectors and the sink.
//!
//! Every detector callback runs through [`EventPipeline::handle`]:
//! empty check → bot filter → dedup → canonical event → sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::adapters::EventSink;
use crate::detectors::DetectorCallback;
use crate::domain::{CanonicalEvent, EventMetadata};
use crate::filters::{BotFilter, DeduplicationCache};

/// Outcome of handling one detector report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Forwarded to the sink
    Accepted,
    /// Sender or message was empty
    Empty,
    /// Rejected by the bot filter
    Bot,
    /// Seen within the dedup window
    Duplicate,
}

/// Counters reported on shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub processed: u64,
    pub filtered: u64,
}

/// Bot filter, dedup cache and sink behind one callback
pub struct EventPipeline {
    bot_filter: BotFilter,
    dedup: DeduplicationCache,
    sink: Arc<dyn EventSink>,
    processed: AtomicU64,
    filtered: AtomicU64,
}

impl EventPipeline {
    pub fn new(bot_filter: BotFilter, dedup: DeduplicationCache, sink: Arc<dyn EventSink>) -> Self {
        Self {
            bot_filter,
            dedup,
            sink,
            processed: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
        }
    }

    /// Process one detector report
    pub fn handle(&self, sender: &str, message: &str, metadata: EventMetadata) -> Verdict {
        if sender.trim().is_empty() || message.trim().is_empty() {
            return Verdict::Empty;
        }

        if self.bot_filter.is_bot(sender, message) {
            self.filtered.fetch_add(1, Ordering::Relaxed);
            debug!(sender, "Filtered bot message");
            return Verdict::Bot;
        }

        if self.dedup.is_duplicate(sender, message) {
            self.filtered.fetch_add(1, Ordering::Relaxed);
            return Verdict::Duplicate;
        }

        let Some(event) = CanonicalEvent::new(sender, message, metadata) else {
            return Verdict::Empty;
        };

        self.processed.fetch_add(1, Ordering::Relaxed);
        self.sink.on_event(&event);
        Verdict::Accepted
    }

    /// A detector callback feeding this pipeline
    pub fn callback(self: &Arc<Self>) -> DetectorCallback {
        let pipeline = Arc::clone(self);
        Arc::new(move |sender: &str, message: &str, metadata: EventMetadata| {
            pipeline.handle(sender, message, metadata);
        })
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            processed: self.processed.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
        }
    }

    pub fn bot_filter(&self) -> &BotFilter {
        &self.bot_filter
    }

    pub(crate) fn bot_filter_mut(&mut self) -> &mut BotFilter {
        &mut self.bot_filter
    }

    pub fn dedup(&self) -> &DeduplicationCache {
        &self.dedup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventSource;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<CanonicalEvent>>);

    impl EventSink for Collect {
        fn on_event(&self, event: &CanonicalEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    fn pipeline() -> (Arc<EventPipeline>, Arc<Collect>) {
        let sink = Arc::new(Collect::default());
        let pipeline = EventPipeline::new(BotFilter::default(), DeduplicationCache::default(), sink.clone());
        (Arc::new(pipeline), sink)
    }

    fn meta() -> EventMetadata {
        EventMetadata::new(EventSource::Database)
    }

    #[test]
    fn test_verdicts_and_counters() {
        let (pipeline, sink) = pipeline();

        assert_eq!(pipeline.handle("", "hi", meta()), Verdict::Empty);
        assert_eq!(pipeline.handle("Alice", " ", meta()), Verdict::Empty);
        assert_eq!(pipeline.handle("workflow-bot", "hello", meta()), Verdict::Bot);
        assert_eq!(pipeline.handle("Alice", "Bob has joined the channel", meta()), Verdict::Bot);
        assert_eq!(pipeline.handle("Alice", "Let's ship it", meta()), Verdict::Accepted);
        assert_eq!(pipeline.handle("alice", "let's ship it ", meta()), Verdict::Duplicate);

        assert_eq!(
            pipeline.stats(),
            PipelineStats {
                processed: 1,
                filtered: 3
            }
        );

        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sender(), "Alice");
        assert_eq!(events[0].source(), EventSource::Database);
    }

    #[test]
    fn test_callback_feeds_pipeline() {
        let (pipeline, sink) = pipeline();
        let callback = pipeline.callback();

        callback("Carol", "ping", meta());
        callback("Carol", "ping", meta());

        assert_eq!(sink.0.lock().unwrap().len(), 1);
        assert_eq!(pipeline.stats().filtered, 1);
    }
}
