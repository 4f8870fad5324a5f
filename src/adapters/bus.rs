//! System-wide notification bus.
//!
//! The host's inter-process notification mechanism is bound behind
//! [`NotificationBus`]. [`LocalBus`] is the in-process binding; external
//! bridges (see [`bridge_json_lines`]) publish host events into it.

use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-subscriber buffer; events beyond it are dropped
const SUBSCRIBER_BUFFER: usize = 256;

/// Errors that can occur on the bus
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Notification bus is closed")]
    Closed,

    #[error("Subscription failed: {0}")]
    Subscribe(String),
}

/// A notification delivered on the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusEvent {
    pub name: String,

    #[serde(default)]
    pub object: String,

    #[serde(default)]
    pub user_info: HashMap<String, String>,
}

impl BusEvent {
    pub fn new(name: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            object: object.into(),
            user_info: HashMap::new(),
        }
    }

    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_info.insert(key.into(), value.into());
        self
    }
}

/// Publish/subscribe notification bus
pub trait NotificationBus: Send + Sync {
    /// Subscribe to every event (`None`) or to the given names.
    ///
    /// The subscription is released when the returned value is dropped.
    fn subscribe(&self, names: Option<&HashSet<String>>) -> Result<Box<dyn BusSubscription>, BusError>;
}

/// An active bus subscription
#[async_trait]
pub trait BusSubscription: Send {
    /// Wait up to `timeout` for the next event. `Ok(None)` means nothing
    /// arrived in time.
    async fn next_event(&mut self, timeout: Duration) -> Result<Option<BusEvent>, BusError>;
}

struct Subscriber {
    names: Option<HashSet<String>>,
    tx: mpsc::Sender<BusEvent>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<u64, Subscriber>,
    closed: bool,
}

/// In-process bus
#[derive(Clone, Default)]
pub struct LocalBus {
    registry: Arc<Mutex<Registry>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every matching subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, event: BusEvent) -> usize {
        let registry = lock(&self.registry);
        if registry.closed {
            return 0;
        }

        let mut delivered = 0;
        for subscriber in registry.subscribers.values() {
            if let Some(names) = &subscriber.names {
                if !names.contains(&event.name) {
                    continue;
                }
            }
            match subscriber.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(name = %event.name, "Subscriber buffer full, dropping bus event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).subscribers.len()
    }

    /// Close the bus; subscribers see [`BusError::Closed`] once drained
    pub fn close(&self) {
        let mut registry = lock(&self.registry);
        registry.closed = true;
        registry.subscribers.clear();
    }
}

impl NotificationBus for LocalBus {
    fn subscribe(&self, names: Option<&HashSet<String>>) -> Result<Box<dyn BusSubscription>, BusError> {
        let mut registry = lock(&self.registry);
        if registry.closed {
            return Err(BusError::Closed);
        }

        let id = registry.next_id;
        registry.next_id += 1;

        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        registry.subscribers.insert(
            id,
            Subscriber {
                names: names.cloned(),
                tx,
            },
        );
        debug!(id, "Bus subscription registered");

        Ok(Box::new(LocalSubscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }))
    }
}

struct LocalSubscription {
    id: u64,
    rx: mpsc::Receiver<BusEvent>,
    registry: Weak<Mutex<Registry>>,
}

#[async_trait]
impl BusSubscription for LocalSubscription {
    async fn next_event(&mut self, timeout: Duration) -> Result<Option<BusEvent>, BusError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(event)) => Ok(Some(event)),
            Ok(None) => Err(BusError::Closed),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for LocalSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).subscribers.remove(&self.id);
            debug!(id = self.id, "Bus subscription removed");
        }
    }
}

fn lock(registry: &Mutex<Registry>) -> std::sync::MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|p| p.into_inner())
}

/// Publish newline-delimited JSON [`BusEvent`]s from `reader` until EOF or
/// cancellation. Malformed lines are skipped. Returns the number published.
///
/// Blocking: cancellation is only observed between lines.
pub fn bridge_json_lines<R: BufRead>(
    reader: R,
    bus: &LocalBus,
    cancel: &CancellationToken,
) -> std::io::Result<usize> {
    let mut published = 0;

    for line in reader.lines() {
        if cancel.is_cancelled() {
            break;
        }

        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<BusEvent>(line) {
            Ok(event) => {
                bus.publish(event);
                published += 1;
            }
            Err(e) => warn!("Skipping malformed bus event: {}", e),
        }
    }

    Ok(published)
}

/// Run [`bridge_json_lines`] on a dedicated OS thread.
///
/// The thread is detached: a read blocked on an idle terminal must never
/// hold up process exit, so callers drop the handle instead of joining it.
pub fn spawn_bridge_thread<R>(
    reader: R,
    bus: LocalBus,
    cancel: CancellationToken,
) -> std::io::Result<std::thread::JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    std::thread::Builder::new()
        .name("bus-bridge".to_string())
        .spawn(move || match bridge_json_lines(reader, &bus, &cancel) {
            Ok(count) => info!("Bridged {} bus events", count),
            Err(e) => warn!("Bus bridge stopped: {}", e),
        })
}
