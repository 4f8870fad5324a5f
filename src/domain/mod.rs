//! Domain types for slackpulse.
//!
//! This module contains the data structures shared by every detector:
//! - CanonicalEvent: A normalized incoming message
//! - EventSource: Which detector produced it
//! - EventMetadata: Source tag plus diagnostic fields passed to callbacks

pub mod event;

// Re-export commonly used types
pub use event::{CanonicalEvent, EventMetadata, EventSource};
