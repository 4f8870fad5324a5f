//! Filesystem-triggered detector with opportunistic store lookups.
//!
//! Reacts to debounced data-directory activity, then looks for a fresh
//! record in the notification store. Real content is reported when found;
//! otherwise the activity placeholder is.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use notify::RecommendedWatcher;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adapters::{query_with_timeout, NotificationStore, RecordQuery, StoreError, DEFAULT_QUERY_TIMEOUT};
use crate::domain::event::preview;
use crate::domain::{EventMetadata, EventSource};
use crate::ingest::{parse_primary, store_time_now, ParsedMessage};

use super::activity::{
    watch_tree, ActivityTrigger, FsEvent, ACTIVITY_MESSAGE, ACTIVITY_SENDER, DEFAULT_IGNORE_TOKENS,
    HYBRID_ACTIVITY_TOKENS,
};
use super::database::DEFAULT_APP_IDENTIFIER;
use super::seen::SeenIds;
use super::{Detector, DetectorCallback, DetectorError, TaskSlot};

/// Hard ceiling on remembered record identifiers
pub const SEEN_CEILING: usize = 500;

/// Configuration for the hybrid detector
#[derive(Debug, Clone)]
pub struct HybridConfig {
    pub watch_root: PathBuf,
    pub app_identifier: String,
    pub debounce: Duration,
    /// How far back a lookup searches
    pub lookback: Duration,
    /// Maximum records fetched per lookup
    pub limit: usize,
    pub query_timeout: Duration,
}

impl HybridConfig {
    pub fn new(watch_root: impl Into<PathBuf>) -> Self {
        Self {
            watch_root: watch_root.into(),
            app_identifier: DEFAULT_APP_IDENTIFIER.to_string(),
            debounce: Duration::from_millis(1500),
            lookback: Duration::from_secs(30),
            limit: 5,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// Best-effort store lookup with its own seen-identifier set
pub struct HybridLookup {
    store: Option<Arc<dyn NotificationStore>>,
    app_identifier: String,
    lookback: Duration,
    limit: usize,
    query_timeout: Duration,
    seen: SeenIds,
}

impl HybridLookup {
    pub fn new(config: &HybridConfig, store: Option<Arc<dyn NotificationStore>>) -> Self {
        Self {
            store,
            app_identifier: config.app_identifier.clone(),
            lookback: config.lookback,
            limit: config.limit,
            query_timeout: config.query_timeout,
            seen: SeenIds::new(SEEN_CEILING),
        }
    }

    /// Newest unseen record with a title and body, if any
    pub async fn latest_message(&mut self) -> Option<ParsedMessage> {
        self.latest_message_at(store_time_now()).await
    }

    /// Same as [`latest_message`](Self::latest_message) with `now` in store time
    pub async fn latest_message_at(&mut self, now: f64) -> Option<ParsedMessage> {
        let store = self.store.as_ref()?;

        let query = RecordQuery {
            app_identifier: self.app_identifier.clone(),
            delivered_after: now - self.lookback.as_secs_f64(),
            limit: self.limit,
        };
        let records = match query_with_timeout(Arc::clone(store), query, self.query_timeout).await {
            Ok(records) => records,
            Err(e @ StoreError::AccessDenied(_)) => {
                warn!("Cannot access notification store: {}", e);
                return None;
            }
            Err(e) => {
                error!("Error checking notification store: {}", e);
                return None;
            }
        };

        let mut found = None;
        for record in records {
            if !self.seen.insert(&record.identifier) {
                continue;
            }

            match parse_primary(&record.payload) {
                Ok(fields) if !fields.title.is_empty() && !fields.body.is_empty() => {
                    found = Some(fields.into_message());
                    break;
                }
                Ok(_) => {}
                Err(e) => debug!("Parse error: {}", e),
            }
        }

        self.seen.trim();
        found
    }
}

/// Report one debounced trigger
pub(crate) async fn report_activity(lookup: &mut HybridLookup, callback: &DetectorCallback) {
    match lookup.latest_message().await {
        Some(parsed) => {
            info!("New notification: {}: {}", parsed.sender, preview(&parsed.message, 50));
            callback(
                &parsed.sender,
                &parsed.message,
                EventMetadata::new(EventSource::HybridDatabase),
            );
        }
        None => {
            info!("Activity detected (no new notification in store)");
            callback(
                ACTIVITY_SENDER,
                ACTIVITY_MESSAGE,
                EventMetadata::new(EventSource::HybridFilesystem),
            );
        }
    }
}

/// Detector combining filesystem triggers with store lookups
pub struct HybridDetector {
    config: HybridConfig,
    store: Option<Arc<dyn NotificationStore>>,
    callback: DetectorCallback,
    slot: TaskSlot,
}

impl HybridDetector {
    pub fn new(
        config: HybridConfig,
        store: Option<Arc<dyn NotificationStore>>,
        callback: DetectorCallback,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            config,
            store,
            callback,
            slot: TaskSlot::new("HybridDetector", shutdown),
        }
    }
}

#[async_trait]
impl Detector for HybridDetector {
    fn name(&self) -> &'static str {
        "HybridDetector"
    }

    fn start(&mut self) -> Result<(), DetectorError> {
        let cancel = self.slot.begin()?;

        let (watcher, events) = watch_tree(&self.config.watch_root)?;
        match &self.store {
            Some(store) => info!(store = %store.describe(), "Notification store available"),
            None => warn!("Notification store not found - will only detect activity"),
        }

        let trigger = ActivityTrigger::new(HYBRID_ACTIVITY_TOKENS, DEFAULT_IGNORE_TOKENS, self.config.debounce);
        let lookup = HybridLookup::new(&self.config, self.store.clone());
        info!(path = %self.config.watch_root.display(), "Watching data directory");

        let task = tokio::spawn(run_hybrid_loop(
            watcher,
            events,
            trigger,
            lookup,
            Arc::clone(&self.callback),
            cancel,
        ));
        self.slot.attach(task);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), DetectorError> {
        self.slot.stop().await
    }
}

async fn run_hybrid_loop(
    watcher: RecommendedWatcher,
    mut events: mpsc::UnboundedReceiver<FsEvent>,
    trigger: ActivityTrigger,
    mut lookup: HybridLookup,
    callback: DetectorCallback,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        let Some(event) = event else { break };

        if trigger.observe(&event) {
            report_activity(&mut lookup, &callback).await;
        }
    }

    drop(watcher);
    debug!("Hybrid watch loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryStore, StoreRecord};
    use crate::ingest::payload::fixtures::primary_payload;
    use std::sync::Mutex;

    const NOW: f64 = 1_000.0;

    fn config() -> HybridConfig {
        HybridConfig::new("/unused")
    }

    fn record(id: u8, delivered_at: f64, payload: Vec<u8>) -> StoreRecord {
        StoreRecord {
            identifier: vec![id],
            payload,
            delivered_at,
        }
    }

    #[tokio::test]
    async fn test_lookup_finds_newest_unseen() {
        let store = Arc::new(MemoryStore::new());
        store.push(DEFAULT_APP_IDENTIFIER, record(1, NOW - 5.0, primary_payload("Alice in #eng", "", "first")));
        store.push(DEFAULT_APP_IDENTIFIER, record(2, NOW - 1.0, primary_payload("Bob in #eng", "", "second")));
        store.push(DEFAULT_APP_IDENTIFIER, record(3, NOW - 60.0, primary_payload("Old", "", "too old")));

        let mut lookup = HybridLookup::new(&config(), Some(store));

        let got = lookup.latest_message_at(NOW).await.unwrap();
        assert_eq!((got.sender.as_str(), got.message.as_str()), ("Bob", "second"));

        let got = lookup.latest_message_at(NOW).await.unwrap();
        assert_eq!(got.sender, "Alice");

        assert!(lookup.latest_message_at(NOW).await.is_none());
    }

    #[tokio::test]
    async fn test_lookup_requires_title_and_body() {
        let store = Arc::new(MemoryStore::new());
        store.push(DEFAULT_APP_IDENTIFIER, record(1, NOW - 1.0, primary_payload("", "Sub", "body only")));
        store.push(DEFAULT_APP_IDENTIFIER, record(2, NOW - 2.0, b"junk".to_vec()));
        store.push(DEFAULT_APP_IDENTIFIER, record(3, NOW - 3.0, primary_payload("Cara", "", "ok")));

        let mut lookup = HybridLookup::new(&config(), Some(store));
        let got = lookup.latest_message_at(NOW).await.unwrap();
        assert_eq!(got.sender, "Cara");
    }

    #[tokio::test]
    async fn test_lookup_without_store_or_with_errors() {
        let mut lookup = HybridLookup::new(&config(), None);
        assert!(lookup.latest_message_at(NOW).await.is_none());

        let store = Arc::new(MemoryStore::new());
        store.set_failure(Some(StoreError::AccessDenied("denied".into())));
        let mut lookup = HybridLookup::new(&config(), Some(store));
        assert!(lookup.latest_message_at(NOW).await.is_none());
    }

    #[tokio::test]
    async fn test_report_activity_sources() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let callback: DetectorCallback = Arc::new(move |s: &str, m: &str, meta: EventMetadata| {
            sink.lock().unwrap().push((s.to_string(), m.to_string(), meta.source));
        });

        let store = Arc::new(MemoryStore::new());
        let now = store_time_now();
        store.push(DEFAULT_APP_IDENTIFIER, record(1, now - 1.0, primary_payload("Workspace", "Dan", "hello")));
        let mut lookup = HybridLookup::new(&config(), Some(store));

        report_activity(&mut lookup, &callback).await;
        report_activity(&mut lookup, &callback).await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0], ("Dan".to_string(), "hello".to_string(), EventSource::HybridDatabase));
        assert_eq!(
            calls[1],
            (ACTIVITY_SENDER.to_string(), ACTIVITY_MESSAGE.to_string(), EventSource::HybridFilesystem)
        );
    }

    #[tokio::test]
    async fn test_missing_root_fails_start() {
        let shutdown = CancellationToken::new();
        let callback: DetectorCallback = Arc::new(|_: &str, _: &str, _: EventMetadata| {});
        let mut detector = HybridDetector::new(HybridConfig::new("/definitely/not/here"), None, callback, &shutdown);

        assert!(matches!(detector.start(), Err(DetectorError::WatchRootMissing(_))));
        detector.stop().await.unwrap();
        detector.stop().await.unwrap();
    }
}
