//! Adapter interfaces for external systems.
//!
//! Detectors never talk to the host directly. They go through these seams:
//! - `store`: Read-only notification store (SQLite binding + in-memory)
//! - `bus`: System-wide publish/subscribe notification bus
//! - `sink`: Consumer of accepted events (logs, fan-out)
//! - `speech`: Spoken announcements via the speech command
//! - `sms`: Twilio SMS / WhatsApp relay

pub mod bus;
pub mod sink;
pub mod sms;
pub mod speech;
pub mod store;

pub use bus::{
    bridge_json_lines, spawn_bridge_thread, BusError, BusEvent, BusSubscription, LocalBus, NotificationBus,
};
pub use sink::{EventSink, FanoutSink, LogSink, PrintSink};
pub use sms::{SmsConfig, SmsSink, TwilioClient};
pub use speech::{SpeechConfig, SpeechSink};
pub use store::{
    query_with_timeout, MemoryStore, NotificationStore, RecordQuery, SqliteStore, StoreError,
    StoreRecord, DEFAULT_QUERY_TIMEOUT,
};
