//! Debounced filesystem activity triggers.
//!
//! Shared by the filesystem and hybrid detectors. A path is relevant when it
//! contains an activity token and no ignore token; directory events never
//! are. Relevant events fire at most once per debounce interval.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use notify::event::CreateKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::DetectorError;

/// Placeholder sender for activity without content
pub const ACTIVITY_SENDER: &str = "Slack";

/// Placeholder message for activity without content
pub const ACTIVITY_MESSAGE: &str = "New activity detected";

/// Path fragments that indicate message activity
pub const DEFAULT_ACTIVITY_TOKENS: &[&str] = &["Local Storage", "leveldb", "IndexedDB", ".log", "Cache"];

/// Narrower activity set used by the hybrid detector
pub const HYBRID_ACTIVITY_TOKENS: &[&str] = &["Local Storage", "leveldb", "IndexedDB"];

/// Noisy path fragments that never indicate messages
pub const DEFAULT_IGNORE_TOKENS: &[&str] = &[
    "GPUCache",
    "Code Cache",
    "blob_storage",
    "Session Storage",
    ".tmp",
];

/// A create or modify event under the watch root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: PathBuf,
    pub is_directory: bool,
}

impl FsEvent {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_directory: false,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_directory: true,
        }
    }
}

/// Relevance test plus debounce state
#[derive(Debug)]
pub struct ActivityTrigger {
    activity: Vec<String>,
    ignore: Vec<String>,
    debounce: Duration,
    last_fired: Mutex<Option<Instant>>,
}

impl ActivityTrigger {
    pub fn new(activity: &[&str], ignore: &[&str], debounce: Duration) -> Self {
        Self {
            activity: activity.iter().map(|s| s.to_string()).collect(),
            ignore: ignore.iter().map(|s| s.to_string()).collect(),
            debounce,
            last_fired: Mutex::new(None),
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Whether an event could indicate message activity
    pub fn is_relevant(&self, event: &FsEvent) -> bool {
        if event.is_directory {
            return false;
        }

        let path = event.path.to_string_lossy();
        if self.ignore.iter().any(|token| path.contains(token.as_str())) {
            return false;
        }
        self.activity.iter().any(|token| path.contains(token.as_str()))
    }

    /// Fire if the debounce interval has passed since the last fire
    pub fn try_fire(&self, now: Instant) -> bool {
        let mut last = self.last_fired.lock().unwrap_or_else(|p| p.into_inner());
        match *last {
            Some(prev) if now.saturating_duration_since(prev) < self.debounce => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Relevance check followed by debounce, using the current time
    pub fn observe(&self, event: &FsEvent) -> bool {
        if !self.is_relevant(event) {
            return false;
        }
        debug!(path = %event.path.display(), "Activity detected");
        self.try_fire(Instant::now())
    }
}

/// Convert a notify event into create/modify [`FsEvent`]s
pub(crate) fn fs_events(event: notify::Event) -> Vec<FsEvent> {
    let folder_created = matches!(event.kind, EventKind::Create(CreateKind::Folder));
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return Vec::new();
    }

    event
        .paths
        .into_iter()
        .map(|path| {
            let is_directory = folder_created || path.is_dir();
            FsEvent { path, is_directory }
        })
        .collect()
}

/// Start a recursive watch on `root`.
///
/// Events arrive on the returned channel for as long as the watcher is kept
/// alive.
pub(crate) fn watch_tree(
    root: &Path,
) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<FsEvent>), DetectorError> {
    if !root.exists() {
        return Err(DetectorError::WatchRootMissing(root.to_path_buf()));
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
        Ok(event) => {
            for fs_event in fs_events(event) {
                let _ = tx.send(fs_event);
            }
        }
        Err(e) => warn!("Watcher error: {:?}", e),
    })?;

    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok((watcher, rx))
}
