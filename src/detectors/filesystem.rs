//! Application data directory watcher.
//!
//! File activity cannot reveal message content, so every debounced trigger
//! reports the fixed placeholder pair ([`ACTIVITY_SENDER`],
//! [`ACTIVITY_MESSAGE`]).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use notify::RecommendedWatcher;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::{EventMetadata, EventSource};

use super::activity::{
    watch_tree, ActivityTrigger, FsEvent, ACTIVITY_MESSAGE, ACTIVITY_SENDER, DEFAULT_ACTIVITY_TOKENS,
    DEFAULT_IGNORE_TOKENS,
};
use super::{Detector, DetectorCallback, DetectorError, TaskSlot};

/// Configuration for the filesystem detector
#[derive(Debug, Clone)]
pub struct FilesystemConfig {
    pub watch_root: PathBuf,
    pub debounce: Duration,
}

impl FilesystemConfig {
    pub fn new(watch_root: impl Into<PathBuf>) -> Self {
        Self {
            watch_root: watch_root.into(),
            debounce: Duration::from_secs(1),
        }
    }
}

/// Detector that reports activity in the app's data directory
pub struct FilesystemDetector {
    config: FilesystemConfig,
    callback: DetectorCallback,
    slot: TaskSlot,
}

impl FilesystemDetector {
    pub fn new(config: FilesystemConfig, callback: DetectorCallback, shutdown: &CancellationToken) -> Self {
        Self {
            config,
            callback,
            slot: TaskSlot::new("FilesystemDetector", shutdown),
        }
    }
}

#[async_trait]
impl Detector for FilesystemDetector {
    fn name(&self) -> &'static str {
        "FilesystemDetector"
    }

    fn start(&mut self) -> Result<(), DetectorError> {
        let cancel = self.slot.begin()?;

        let (watcher, events) = watch_tree(&self.config.watch_root)?;
        let trigger = ActivityTrigger::new(DEFAULT_ACTIVITY_TOKENS, DEFAULT_IGNORE_TOKENS, self.config.debounce);
        info!(path = %self.config.watch_root.display(), "Watching data directory");

        let task = tokio::spawn(run_watch_loop(
            watcher,
            events,
            trigger,
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

async fn run_watch_loop(
    watcher: RecommendedWatcher,
    mut events: mpsc::UnboundedReceiver<FsEvent>,
    trigger: ActivityTrigger,
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
            let metadata = EventMetadata::new(EventSource::Filesystem).with("path", event.path.display().to_string());
            callback(ACTIVITY_SENDER, ACTIVITY_MESSAGE, metadata);
        }
    }

    drop(watcher);
    debug!("Filesystem watch loop exited");
}
