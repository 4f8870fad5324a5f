//! Time-windowed deduplication of normalized messages.
//!
//! Entries are kept in insertion order and every timestamp comes from the
//! same monotonic clock while the lock is held, so insertion order is also
//! timestamp order. The expiry sweep relies on this: it walks from the
//! oldest entry and stops at the first one still inside the window. Never
//! reorder entries or refresh a timestamp in place.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::debug;

/// Default deduplication window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30);

/// Fingerprint of a normalized `(sender, message)` pair.
///
/// First 8 bytes of SHA256 over `lower(trim(sender)):lower(trim(message))`,
/// hex encoded (16 chars).
pub fn fingerprint(sender: &str, message: &str) -> String {
    let content = format!(
        "{}:{}",
        sender.trim().to_lowercase(),
        message.trim().to_lowercase()
    );
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(&digest[..8])
}

#[derive(Debug, Default)]
struct Entries {
    order: VecDeque<(String, Instant)>,
    keys: HashSet<String>,
}

impl Entries {
    fn sweep(&mut self, cutoff: Instant) {
        while let Some((_, seen_at)) = self.order.front() {
            if *seen_at >= cutoff {
                break;
            }
            if let Some((key, _)) = self.order.pop_front() {
                self.keys.remove(&key);
            }
        }
    }
}

/// Thread-safe set of recently seen fingerprints
#[derive(Debug)]
pub struct DeduplicationCache {
    window: Duration,
    entries: Mutex<Entries>,
}

impl Default for DeduplicationCache {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl DeduplicationCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns true if the pair was seen within the window.
    ///
    /// A first sighting is recorded with the current time and returns false.
    pub fn is_duplicate(&self, sender: &str, message: &str) -> bool {
        let mut entries = self.lock();
        // Read the clock under the lock so inserts stay time-ordered.
        let now = Instant::now();
        Self::check(&mut entries, self.window, sender, message, now)
    }

    /// Same as [`is_duplicate`](Self::is_duplicate) with an explicit clock.
    ///
    /// Callers must pass non-decreasing instants.
    pub fn is_duplicate_at(&self, sender: &str, message: &str, now: Instant) -> bool {
        let mut entries = self.lock();
        Self::check(&mut entries, self.window, sender, message, now)
    }

    fn check(entries: &mut Entries, window: Duration, sender: &str, message: &str, now: Instant) -> bool {
        if let Some(cutoff) = now.checked_sub(window) {
            entries.sweep(cutoff);
        }

        let key = fingerprint(sender, message);
        if entries.keys.contains(&key) {
            debug!(sender, "Duplicate notification detected");
            return true;
        }

        entries.keys.insert(key.clone());
        entries.order.push_back((key, now));
        false
    }

    /// Remove every entry
    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.order.clear();
        entries.keys.clear();
    }

    /// Number of live entries (expired ones are dropped on the next check)
    pub fn size(&self) -> usize {
        self.lock().order.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
