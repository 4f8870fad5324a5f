//! Message detectors.
//!
//! Each detector watches one source and reports `(sender, message, metadata)`
//! through a shared [`DetectorCallback`]:
//!
//! - `database`: Polls the local notification store
//! - `distributed`: Observes the system-wide notification bus
//! - `filesystem`: Watches the app's data directory for activity
//! - `hybrid`: Filesystem trigger enriched with a store lookup
//!
//! `start()` schedules a background task and returns immediately. `stop()`
//! cancels it, waits up to [`STOP_GRACE`], and may be called repeatedly.

pub mod activity;
pub mod database;
pub mod distributed;
pub mod filesystem;
pub mod hybrid;
pub mod seen;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::{BusError, StoreError};
use crate::domain::EventMetadata;

pub use activity::{ActivityTrigger, FsEvent, ACTIVITY_MESSAGE, ACTIVITY_SENDER};
pub use database::{DatabaseConfig, DatabaseDetector, DatabasePoller};
pub use distributed::{DistributedConfig, DistributedDetector};
pub use filesystem::{FilesystemConfig, FilesystemDetector};
pub use hybrid::{HybridConfig, HybridDetector, HybridLookup};
pub use seen::SeenIds;

/// How long `stop()` waits for a detector task to finish
pub const STOP_GRACE: Duration = Duration::from_secs(2);

/// Callback shared by every detector: `(sender, message, metadata)`.
///
/// Invoked concurrently from several detector tasks.
pub type DetectorCallback = Arc<dyn Fn(&str, &str, EventMetadata) + Send + Sync>;

/// Errors that can occur while running a detector
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("{0} was already started")]
    AlreadyStarted(&'static str),

    #[error("Watch directory does not exist: {0}")]
    WatchRootMissing(PathBuf),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Detector task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A source of incoming messages
#[async_trait]
pub trait Detector: Send {
    /// Detector name for logs
    fn name(&self) -> &'static str;

    /// Schedule background work. Fails if called twice.
    fn start(&mut self) -> Result<(), DetectorError>;

    /// Cancel background work and wait for it to finish
    async fn stop(&mut self) -> Result<(), DetectorError>;
}

/// Background task bookkeeping shared by the detector implementations
pub(crate) struct TaskSlot {
    name: &'static str,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    started: bool,
}

impl TaskSlot {
    /// The slot's token is a child of the process-wide shutdown token
    pub(crate) fn new(name: &'static str, shutdown: &CancellationToken) -> Self {
        Self {
            name,
            cancel: shutdown.child_token(),
            task: None,
            started: false,
        }
    }

    /// Mark the slot started and hand out the task's cancellation token
    pub(crate) fn begin(&mut self) -> Result<CancellationToken, DetectorError> {
        if self.started {
            return Err(DetectorError::AlreadyStarted(self.name));
        }
        self.started = true;
        Ok(self.cancel.clone())
    }

    pub(crate) fn attach(&mut self, task: JoinHandle<()>) {
        self.task = Some(task);
        info!(detector = self.name, "Started detector");
    }

    pub(crate) fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub(crate) async fn stop(&mut self) -> Result<(), DetectorError> {
        self.cancel.cancel();

        let Some(task) = self.task.take() else {
            return Ok(());
        };

        match tokio::time::timeout(STOP_GRACE, task).await {
            Ok(Ok(())) => {
                info!(detector = self.name, "Stopped detector");
                Ok(())
            }
            Ok(Err(e)) => Err(DetectorError::Join(e)),
            Err(_) => {
                warn!(detector = self.name, "Detector did not stop within {:?}", STOP_GRACE);
                Ok(())
            }
        }
    }
}
