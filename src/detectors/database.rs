//! Notification store polling detector.
//!
//! Every tick queries the newest records for the target application that
//! were delivered after the watermark, skips identifiers already seen, and
//! reports each record whose payload yields both a sender and a message.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adapters::{query_with_timeout, NotificationStore, RecordQuery, StoreError, DEFAULT_QUERY_TIMEOUT};
use crate::domain::event::preview;
use crate::domain::{EventMetadata, EventSource};
use crate::ingest::{parse_payload, store_time_now};

use super::seen::SeenIds;
use super::{Detector, DetectorCallback, DetectorError, TaskSlot};

/// Hard ceiling on remembered record identifiers
pub const SEEN_CEILING: usize = 1000;

/// Default application identifier in the notification store
pub const DEFAULT_APP_IDENTIFIER: &str = "com.tinyspeck.slackmacgap";

/// Configuration for the database detector
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub app_identifier: String,
    pub poll_interval: Duration,
    /// Maximum records fetched per tick
    pub page_size: usize,
    pub query_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            app_identifier: DEFAULT_APP_IDENTIFIER.to_string(),
            poll_interval: Duration::from_secs(2),
            page_size: 10,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// Poll state and the per-tick algorithm
pub struct DatabasePoller {
    config: DatabaseConfig,
    store: Arc<dyn NotificationStore>,
    callback: DetectorCallback,
    watermark: f64,
    seen: SeenIds,
}

impl DatabasePoller {
    /// Start from `watermark` (store time); only newer records are reported
    pub fn new(
        config: DatabaseConfig,
        store: Arc<dyn NotificationStore>,
        callback: DetectorCallback,
        watermark: f64,
    ) -> Self {
        Self {
            config,
            store,
            callback,
            watermark,
            seen: SeenIds::new(SEEN_CEILING),
        }
    }

    pub fn watermark(&self) -> f64 {
        self.watermark
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Run one poll tick. Returns the number of messages reported.
    pub async fn poll_once(&mut self) -> Result<usize, StoreError> {
        let query = RecordQuery {
            app_identifier: self.config.app_identifier.clone(),
            delivered_after: self.watermark,
            limit: self.config.page_size,
        };
        let records = query_with_timeout(Arc::clone(&self.store), query, self.config.query_timeout).await?;

        let mut reported = 0;
        for record in records {
            if !self.seen.insert(&record.identifier) {
                continue;
            }

            if record.delivered_at > self.watermark {
                self.watermark = record.delivered_at;
            }

            let parsed = match parse_payload(&record.payload) {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!(uuid = %record.identifier_hex(), "Skipping record: {}", e);
                    continue;
                }
            };

            if parsed.is_complete() {
                info!("Notification: {}: {}", parsed.sender, preview(&parsed.message, 50));
                let metadata = EventMetadata::new(EventSource::Database).with("uuid", record.identifier_hex());
                (self.callback)(&parsed.sender, &parsed.message, metadata);
                reported += 1;
            }
        }

        self.seen.trim();
        Ok(reported)
    }
}

/// Detector that polls the notification store
pub struct DatabaseDetector {
    config: DatabaseConfig,
    store: Arc<dyn NotificationStore>,
    callback: DetectorCallback,
    slot: TaskSlot,
}

impl DatabaseDetector {
    pub fn new(
        config: DatabaseConfig,
        store: Arc<dyn NotificationStore>,
        callback: DetectorCallback,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            config,
            store,
            callback,
            slot: TaskSlot::new("DatabaseDetector", shutdown),
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_running()
    }
}

#[async_trait]
impl Detector for DatabaseDetector {
    fn name(&self) -> &'static str {
        "DatabaseDetector"
    }

    fn start(&mut self) -> Result<(), DetectorError> {
        let cancel = self.slot.begin()?;

        info!(store = %self.store.describe(), "Polling notification store");
        let poller = DatabasePoller::new(
            self.config.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.callback),
            store_time_now(),
        );

        let task = tokio::spawn(run_poll_loop(poller, cancel));
        self.slot.attach(task);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), DetectorError> {
        self.slot.stop().await
    }
}

async fn run_poll_loop(mut poller: DatabasePoller, cancel: CancellationToken) {
    let interval = poller.config.poll_interval;

    while !cancel.is_cancelled() {
        let tick = tokio::select! {
            _ = cancel.cancelled() => break,
            tick = poller.poll_once() => tick,
        };

        match tick {
            Ok(_) => {}
            Err(e) if e.is_fatal() => {
                error!(
                    "Cannot access notification store ({}). Grant Full Disk Access: \
                     System Settings > Privacy & Security > Full Disk Access",
                    e
                );
                break;
            }
            Err(StoreError::Timeout(t)) => warn!("Store query timed out after {:?}", t),
            Err(e) => error!("Error polling notification store: {}", e),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    debug!("Database poll loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryStore, StoreRecord};
    use crate::ingest::payload::fixtures::primary_payload;
    use std::sync::Mutex;

    const APP: &str = DEFAULT_APP_IDENTIFIER;

    type Calls = Arc<Mutex<Vec<(String, String, EventMetadata)>>>;

    fn recorder() -> (DetectorCallback, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let callback: DetectorCallback = Arc::new(move |s: &str, m: &str, meta: EventMetadata| {
            sink.lock().unwrap().push((s.to_string(), m.to_string(), meta));
        });
        (callback, calls)
    }

    fn record(id: u8, delivered_at: f64, payload: Vec<u8>) -> StoreRecord {
        StoreRecord {
            identifier: vec![id],
            payload,
            delivered_at,
        }
    }

    #[tokio::test]
    async fn test_poll_reports_and_advances_watermark() {
        let store = Arc::new(MemoryStore::new());
        store.push(APP, record(1, 110.0, primary_payload("Alice in #general", "", "hi")));
        store.push(APP, record(2, 120.0, primary_payload("Workspace", "Bob", "hey")));
        store.push(APP, record(3, 90.0, primary_payload("Old", "", "before watermark")));

        let (callback, calls) = recorder();
        let mut poller = DatabasePoller::new(DatabaseConfig::default(), store.clone(), callback, 100.0);

        assert_eq!(poller.poll_once().await.unwrap(), 2);
        assert_eq!(poller.watermark(), 120.0);

        let calls = calls.lock().unwrap();
        // newest first
        assert_eq!(calls[0].0, "Bob");
        assert_eq!(calls[1].0, "Alice");
        assert_eq!(calls[1].1, "hi");
        assert_eq!(calls[0].2.source, EventSource::Database);
        assert_eq!(calls[0].2.raw.get("uuid").map(String::as_str), Some("02"));
    }

    #[tokio::test]
    async fn test_watermark_is_monotonic_and_ids_not_reprocessed() {
        let store = Arc::new(MemoryStore::new());
        let (callback, calls) = recorder();
        let mut poller = DatabasePoller::new(DatabaseConfig::default(), store.clone(), callback, 0.0);

        let mut last = poller.watermark();
        for tick in 0u8..5 {
            store.push(APP, record(tick, 10.0 * (tick as f64 + 1.0), primary_payload("Carol", "", &format!("m{}", tick))));
            poller.poll_once().await.unwrap();
            assert!(poller.watermark() >= last);
            last = poller.watermark();
        }

        assert_eq!(calls.lock().unwrap().len(), 5);
        assert_eq!(poller.watermark(), 50.0);

        // A late record with an old timestamp is below the watermark
        store.push(APP, record(99, 5.0, primary_payload("Late", "", "x")));
        assert_eq!(poller.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_same_timestamp_records_are_seen_once() {
        let store = Arc::new(MemoryStore::new());
        store.push(APP, record(1, 10.0, primary_payload("A", "", "one")));

        let (callback, calls) = recorder();
        let mut poller = DatabasePoller::new(DatabaseConfig::default(), store.clone(), callback, 0.0);
        poller.poll_once().await.unwrap();

        // Same delivery time as the watermark: excluded by the query
        store.push(APP, record(1, 10.0, primary_payload("A", "", "one")));
        poller.poll_once().await.unwrap();

        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(poller.seen_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_and_incomplete_records_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        store.push(APP, record(1, 10.0, b"garbage".to_vec()));
        store.push(APP, record(2, 20.0, primary_payload("NoBody", "", "")));
        store.push(APP, record(3, 30.0, primary_payload("Dana", "", "ok")));

        let (callback, calls) = recorder();
        let mut poller = DatabasePoller::new(DatabaseConfig::default(), store.clone(), callback, 0.0);

        assert_eq!(poller.poll_once().await.unwrap(), 1);
        assert_eq!(calls.lock().unwrap()[0].0, "Dana");
        // skipped records still count as seen and advance the watermark
        assert_eq!(poller.seen_count(), 3);
        assert_eq!(poller.watermark(), 30.0);
    }

    #[tokio::test]
    async fn test_page_size_limits_batch() {
        let store = Arc::new(MemoryStore::new());
        for i in 0u8..15 {
            store.push(APP, record(i, i as f64 + 1.0, primary_payload("E", "", &format!("m{}", i))));
        }

        let (callback, calls) = recorder();
        let mut poller = DatabasePoller::new(DatabaseConfig::default(), store.clone(), callback, 0.0);

        assert_eq!(poller.poll_once().await.unwrap(), 10);
        assert_eq!(poller.watermark(), 15.0);
        assert_eq!(calls.lock().unwrap()[0].1, "m14");
    }

    #[tokio::test]
    async fn test_fatal_store_error_stops_loop() {
        let store = Arc::new(MemoryStore::new());
        store.set_failure(Some(StoreError::AccessDenied("unable to open database".into())));

        let (callback, _calls) = recorder();
        let shutdown = CancellationToken::new();
        let config = DatabaseConfig {
            poll_interval: Duration::from_millis(10),
            ..DatabaseConfig::default()
        };
        let mut detector = DatabaseDetector::new(config, store.clone(), callback, &shutdown);
        detector.start().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!detector.is_running());
        assert_eq!(store.query_count(), 1);
        detector.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_transient_errors_keep_polling() {
        let store = Arc::new(MemoryStore::new());
        store.set_failure(Some(StoreError::Query("database is locked".into())));

        let (callback, _calls) = recorder();
        let shutdown = CancellationToken::new();
        let config = DatabaseConfig {
            poll_interval: Duration::from_millis(10),
            ..DatabaseConfig::default()
        };
        let mut detector = DatabaseDetector::new(config, store.clone(), callback, &shutdown);
        detector.start().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(detector.is_running());
        assert!(store.query_count() > 1);

        detector.stop().await.unwrap();
        assert!(!detector.is_running());
    }

    /// Store whose every query blocks the calling thread for `delay`
    struct SlowStore {
        delay: Duration,
    }

    impl NotificationStore for SlowStore {
        fn describe(&self) -> String {
            "slow".to_string()
        }

        fn recent_records(&self, _query: &RecordQuery) -> Result<Vec<StoreRecord>, StoreError> {
            std::thread::sleep(self.delay);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_query_timeout_keeps_polling() {
        let store: Arc<dyn NotificationStore> = Arc::new(SlowStore {
            delay: Duration::from_millis(200),
        });
        let config = DatabaseConfig {
            poll_interval: Duration::from_millis(10),
            query_timeout: Duration::from_millis(20),
            ..DatabaseConfig::default()
        };

        let (callback, calls) = recorder();
        let mut poller = DatabasePoller::new(config.clone(), Arc::clone(&store), callback.clone(), 0.0);
        assert!(matches!(poller.poll_once().await, Err(StoreError::Timeout(_))));

        let shutdown = CancellationToken::new();
        let mut detector = DatabaseDetector::new(config, store, callback, &shutdown);
        detector.start().unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(detector.is_running());
        assert!(calls.lock().unwrap().is_empty());

        detector.stop().await.unwrap();
        assert!(!detector.is_running());
    }

    #[tokio::test]
    async fn test_stop_interrupts_in_flight_query() {
        let store: Arc<dyn NotificationStore> = Arc::new(SlowStore {
            delay: Duration::from_secs(1),
        });
        let config = DatabaseConfig {
            poll_interval: Duration::from_millis(10),
            query_timeout: Duration::from_secs(5),
            ..DatabaseConfig::default()
        };

        let (callback, _calls) = recorder();
        let shutdown = CancellationToken::new();
        let mut detector = DatabaseDetector::new(config, store, callback, &shutdown);
        detector.start().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = std::time::Instant::now();
        detector.stop().await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(!detector.is_running());
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_twice() {
        let store = Arc::new(MemoryStore::new());
        let (callback, _calls) = recorder();
        let shutdown = CancellationToken::new();
        let mut detector = DatabaseDetector::new(DatabaseConfig::default(), store, callback, &shutdown);

        detector.start().unwrap();
        assert!(matches!(detector.start(), Err(DetectorError::AlreadyStarted(_))));

        detector.stop().await.unwrap();
        detector.stop().await.unwrap();
    }
}
