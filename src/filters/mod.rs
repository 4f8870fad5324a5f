//! Message filters.
//!
//! - BotFilter: Rejects automated senders and channel housekeeping messages
//! - DeduplicationCache: Rejects repeats seen within a time window

pub mod bot;
pub mod dedup;

pub use bot::{BotFilter, DEFAULT_BOT_KEYWORDS, DEFAULT_BOT_PATTERNS};
pub use dedup::{fingerprint, DeduplicationCache};
