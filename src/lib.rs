//! slackpulse - Incoming chat message detection
//!
//! Watches local notification sources for new messages from a desktop chat
//! application and reports each one as a canonical `(sender, message)` event.
//!
//! # Architecture
//!
//! Several independent detectors feed one shared callback:
//! - Every detector reports `(sender, message, metadata)`
//! - Bot senders and housekeeping messages are dropped
//! - Repeats within a time window are dropped
//! - Survivors are delivered to an [`EventSink`](adapters::EventSink)
//!
//! # Modules
//!
//! - `adapters`: External seams (notification store, bus, sinks)
//! - `core`: Orchestration (EventPipeline, Orchestrator)
//! - `detectors`: Database, distributed, filesystem and hybrid detectors
//! - `domain`: Data structures (CanonicalEvent, EventSource)
//! - `filters`: BotFilter and DeduplicationCache
//! - `ingest`: Payload normalization
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Print detected messages without announcing them
//! slackpulse run --dry-run
//!
//! # Find out which bus notifications the application posts
//! slackpulse run --discover
//!
//! # Run the filesystem trigger with store lookup
//! slackpulse run --detector hybrid
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod detectors;
pub mod domain;
pub mod filters;
pub mod ingest;

// Re-export main types at crate root for convenience
pub use crate::core::{EventPipeline, Orchestrator, PipelineStats, Sources};
pub use adapters::{EventSink, LocalBus, MemoryStore, NotificationBus, NotificationStore, SqliteStore};
pub use config::{Config, DetectorKind};
pub use detectors::{Detector, DetectorCallback, DetectorError};
pub use domain::{CanonicalEvent, EventMetadata, EventSource};
pub use filters::{BotFilter, DeduplicationCache};
