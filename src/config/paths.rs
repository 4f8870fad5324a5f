//! Platform path discovery.
//!
//! Single source of truth for where the notification store and the
//! application's data directory live. Discovery stays out of the detectors;
//! resolved paths are injected.
//!
//! | Location | Purpose |
//! |----------|---------|
//! | `~/Library/Group Containers/group.com.apple.usernoted/db2/db` | Notification store (macOS 15+) |
//! | `$(getconf DARWIN_USER_DIR)/com.apple.notificationcenter/db2/db` | Notification store (older macOS) |
//! | `~/Library/Application Support/Slack` | Application data directory |
//! | `~/.slackpulse/config.yaml` | Config file |

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

/// Upper bound for the `getconf` subprocess
const GETCONF_TIMEOUT: Duration = Duration::from_secs(5);

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Default config file (~/.slackpulse/config.yaml)
pub fn default_config_file() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".slackpulse").join("config.yaml"))
}

/// Application data directory watched by the filesystem detectors
pub fn app_data_dir() -> PathBuf {
    home().join("Library/Application Support/Slack")
}

/// Notification store location on current macOS releases
pub fn group_container_store() -> PathBuf {
    home().join("Library/Group Containers/group.com.apple.usernoted/db2/db")
}

/// Notification store location under a per-user temp directory
pub fn legacy_store(darwin_user_dir: &Path) -> PathBuf {
    darwin_user_dir
        .join("com.apple.notificationcenter")
        .join("db2")
        .join("db")
}

/// Ask `getconf` for DARWIN_USER_DIR. Failures and timeouts yield `None`.
pub async fn darwin_user_dir() -> Option<PathBuf> {
    let output = Command::new("getconf")
        .arg("DARWIN_USER_DIR")
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(GETCONF_TIMEOUT, output).await {
        Ok(Ok(out)) if out.status.success() => {
            let dir = String::from_utf8_lossy(&out.stdout).trim().to_string();
            (!dir.is_empty()).then(|| PathBuf::from(dir))
        }
        Ok(Ok(out)) => {
            debug!(status = %out.status, "getconf DARWIN_USER_DIR failed");
            None
        }
        Ok(Err(e)) => {
            debug!("Failed to run getconf: {}", e);
            None
        }
        Err(_) => {
            debug!("getconf timed out after {:?}", GETCONF_TIMEOUT);
            None
        }
    }
}

/// Locate the notification store, newest layout first
pub async fn find_notification_store() -> Option<PathBuf> {
    let current = group_container_store();
    if current.exists() {
        return Some(current);
    }

    let legacy = legacy_store(&darwin_user_dir().await?);
    legacy.exists().then_some(legacy)
}
