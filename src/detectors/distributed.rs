//! System-wide notification bus observer.
//!
//! Events whose name or object mentions the target application are mapped
//! to `(sender, message)` from their user-info map. In discovery mode every
//! event is logged verbatim instead, to help identify what the application
//! actually broadcasts.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adapters::{BusError, BusEvent, BusSubscription, NotificationBus};
use crate::domain::{EventMetadata, EventSource};
use crate::ingest::extract_message;

use super::{Detector, DetectorCallback, DetectorError, TaskSlot};

/// Keywords identifying the target application on the bus
pub const DEFAULT_APP_KEYWORDS: &[&str] = &["slack", "tinyspeck", "slackmacgap"];

/// Configuration for the distributed detector
#[derive(Debug, Clone)]
pub struct DistributedConfig {
    /// Log every event instead of filtering
    pub discovery: bool,

    /// Subscribe to these names only (`None` = everything)
    pub names: Option<HashSet<String>>,

    /// Lowercase keywords matched against event name and object
    pub app_keywords: Vec<String>,

    /// How often the loop checks for shutdown
    pub poll_interval: Duration,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            discovery: false,
            names: None,
            app_keywords: DEFAULT_APP_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl DistributedConfig {
    /// Whether the event comes from the target application
    pub fn is_target_app(&self, event: &BusEvent) -> bool {
        let name = event.name.to_lowercase();
        let object = event.object.to_lowercase();

        self.app_keywords.iter().any(|keyword| {
            let keyword = keyword.to_lowercase();
            name.contains(&keyword) || object.contains(&keyword)
        })
    }
}

/// Handle one bus event
fn handle_event(config: &DistributedConfig, callback: &DetectorCallback, event: BusEvent) {
    if config.discovery {
        info!(
            "[DISCOVERY] name={}, object={}, info={:?}",
            event.name, event.object, event.user_info
        );
        return;
    }

    if !config.is_target_app(&event) {
        return;
    }

    debug!(name = %event.name, "Application notification");
    if let Some((sender, message)) = extract_message(&event.user_info) {
        let metadata = EventMetadata::new(EventSource::Distributed).with("name", event.name);
        callback(&sender, &message, metadata);
    }
}

/// Detector that observes the notification bus
pub struct DistributedDetector {
    config: DistributedConfig,
    bus: Arc<dyn NotificationBus>,
    callback: DetectorCallback,
    slot: TaskSlot,
}

impl DistributedDetector {
    pub fn new(
        config: DistributedConfig,
        bus: Arc<dyn NotificationBus>,
        callback: DetectorCallback,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            config,
            bus,
            callback,
            slot: TaskSlot::new("DistributedDetector", shutdown),
        }
    }
}

#[async_trait]
impl Detector for DistributedDetector {
    fn name(&self) -> &'static str {
        "DistributedDetector"
    }

    fn start(&mut self) -> Result<(), DetectorError> {
        let cancel = self.slot.begin()?;

        let subscription = self.bus.subscribe(self.config.names.as_ref())?;
        match &self.config.names {
            Some(names) => debug!(?names, "Listening for named notifications"),
            None => debug!("Listening for all notifications"),
        }
        info!(discovery = self.config.discovery, "Observing notification bus");

        let task = tokio::spawn(run_observe_loop(
            self.config.clone(),
            subscription,
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

/// Owns the subscription; it is released when this function returns
async fn run_observe_loop(
    config: DistributedConfig,
    mut subscription: Box<dyn BusSubscription>,
    callback: DetectorCallback,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = subscription.next_event(config.poll_interval) => next,
        };

        match next {
            Ok(Some(event)) => handle_event(&config, &callback, event),
            Ok(None) => {}
            Err(BusError::Closed) => {
                warn!("Notification bus closed");
                break;
            }
            Err(e) => error!("Error in notification loop: {}", e),
        }
    }

    drop(subscription);
    debug!("Bus observe loop exited");
}
