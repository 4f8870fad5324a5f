//! Payload normalization.
//!
//! Pure functions that turn source-specific payloads into a canonical
//! `(sender, message)` pair:
//!
//! ```text
//! store record (plist blob) ─┐
//!                            ├─→ (sender, message) ─→ pipeline
//! bus user-info map ─────────┘
//! ```

pub mod payload;
pub mod user_info;

// Re-export key types
pub use payload::{
    clean_text, parse_payload, parse_primary, sender_from_titles, store_time_from_unix,
    store_time_now, NotificationFields, ParsedMessage, PayloadError,
    STORE_EPOCH_OFFSET_SECS,
};
pub use user_info::extract_message;
