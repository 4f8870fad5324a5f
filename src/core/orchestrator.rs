//! Main orchestrator for notification monitoring.
//!
//! Owns the bot filter, the dedup cache and every running detector. All
//! detectors share one callback that feeds the [`EventPipeline`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::adapters::{EventSink, NotificationBus, NotificationStore};
use crate::config::{Config, DetectorKind};
use crate::detectors::{
    DatabaseDetector, Detector, DetectorCallback, DistributedDetector, FilesystemDetector, HybridDetector,
};
use crate::filters::BotFilter;

use super::pipeline::{EventPipeline, PipelineStats};

/// Resolved external sources handed to the detectors
#[derive(Clone, Default)]
pub struct Sources {
    /// Notification store (database and hybrid detectors)
    pub store: Option<Arc<dyn NotificationStore>>,

    /// Notification bus (distributed detector)
    pub bus: Option<Arc<dyn NotificationBus>>,

    /// Application data directory (filesystem and hybrid detectors)
    pub watch_root: Option<PathBuf>,
}

/// A running detector
pub struct DetectorHandle {
    pub name: &'static str,
    cancel: CancellationToken,
    detector: Box<dyn Detector>,
}

impl DetectorHandle {
    async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();
        self.detector.stop().await?;
        Ok(())
    }
}

/// Coordinates detector lifecycles and the shared event pipeline
pub struct Orchestrator {
    config: Config,
    sources: Sources,
    pipeline: Arc<EventPipeline>,
    shutdown: CancellationToken,
    handles: Vec<DetectorHandle>,
    started: bool,
    stopped: bool,
}

impl Orchestrator {
    /// Create an orchestrator. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: Config,
        sources: Sources,
        sink: Arc<dyn EventSink>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let pipeline = EventPipeline::new(config.bot_filter()?, config.dedup_cache(), sink);

        Ok(Self {
            config,
            sources,
            pipeline: Arc::new(pipeline),
            shutdown,
            handles: Vec::new(),
            started: false,
            stopped: false,
        })
    }

    /// Tune the bot filter. Only available before `start()`.
    pub fn bot_filter_mut(&mut self) -> Option<&mut BotFilter> {
        Arc::get_mut(&mut self.pipeline).map(EventPipeline::bot_filter_mut)
    }

    pub fn pipeline(&self) -> &Arc<EventPipeline> {
        &self.pipeline
    }

    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    /// Names of detectors that started successfully
    pub fn active_detectors(&self) -> Vec<&'static str> {
        self.handles.iter().map(|h| h.name).collect()
    }

    /// Build and start the configured detectors.
    ///
    /// A detector that cannot start is logged and skipped; the others keep
    /// running. Returns the number started.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<usize> {
        if self.started {
            bail!("Orchestrator already started");
        }
        self.started = true;

        info!("Starting notification monitor...");
        if self.config.monitor.discovery {
            info!("=== DISCOVERY MODE ===");
            info!("Logging all bus notifications to help identify application patterns.");
            info!("Send some messages and watch the output. Press Ctrl+C to stop.");
        }

        let callback = self.pipeline.callback();
        for kind in self.config.active_detectors() {
            let cancel = self.shutdown.child_token();

            let Some(mut detector) = self.build_detector(kind, Arc::clone(&callback), &cancel) else {
                continue;
            };

            match detector.start() {
                Ok(()) => self.handles.push(DetectorHandle {
                    name: detector.name(),
                    cancel,
                    detector,
                }),
                Err(e) => error!(detector = detector.name(), "Detector disabled: {}", e),
            }
        }

        info!("Started {} detector(s)", self.handles.len());
        Ok(self.handles.len())
    }

    fn build_detector(
        &self,
        kind: DetectorKind,
        callback: DetectorCallback,
        cancel: &CancellationToken,
    ) -> Option<Box<dyn Detector>> {
        let config = &self.config;
        let detector: Box<dyn Detector> = match kind {
            DetectorKind::Database => {
                let Some(store) = self.sources.store.clone() else {
                    error!(
                        "Could not find notification store. You may need to grant Full Disk Access: \
                         System Settings > Privacy & Security > Full Disk Access"
                    );
                    return None;
                };
                Box::new(DatabaseDetector::new(config.database_config(), store, callback, cancel))
            }
            DetectorKind::Distributed => {
                let Some(bus) = self.sources.bus.clone() else {
                    error!("No notification bus available");
                    return None;
                };
                Box::new(DistributedDetector::new(config.distributed_config(), bus, callback, cancel))
            }
            DetectorKind::Filesystem => {
                let Some(root) = self.sources.watch_root.as_deref() else {
                    warn!("Application data directory unknown - filesystem detection disabled");
                    return None;
                };
                Box::new(FilesystemDetector::new(config.filesystem_config(root), callback, cancel))
            }
            DetectorKind::Hybrid => {
                let Some(root) = self.sources.watch_root.as_deref() else {
                    warn!("Application data directory unknown - hybrid detection disabled");
                    return None;
                };
                Box::new(HybridDetector::new(
                    config.hybrid_config(root),
                    self.sources.store.clone(),
                    callback,
                    cancel,
                ))
            }
        };
        Some(detector)
    }

    /// Start, wait for the shutdown signal, then stop
    pub async fn run(&mut self) -> Result<()> {
        self.start()?;
        self.shutdown.cancelled().await;
        info!("Shutdown requested");
        self.stop().await;
        Ok(())
    }

    /// Stop every detector and report counters. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        info!("Stopping notification monitor...");
        for handle in self.handles.iter_mut() {
            if let Err(e) = handle.stop().await {
                error!(detector = handle.name, "Error stopping detector: {}", e);
            }
        }
        self.handles.clear();

        let stats = self.stats();
        info!(
            "Processed {} notifications, filtered {}",
            stats.processed, stats.filtered
        );
    }
}
