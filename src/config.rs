//! Configuration for slackpulse.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags (applied by the CLI)
//! 2. Environment variables (SLACKPULSE_CONFIG, SLACKPULSE_STORE_PATH, SLACKPULSE_WATCH_PATH)
//! 3. Config file (~/.slackpulse/config.yaml by default)
//! 4. Defaults
//!
//! The resolved [`Config`] is passed explicitly to the orchestrator; nothing
//! here is cached globally.

pub mod paths;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::{SmsConfig, SpeechConfig};
use crate::detectors::database::DEFAULT_APP_IDENTIFIER;
use crate::detectors::distributed::DEFAULT_APP_KEYWORDS;
use crate::detectors::{DatabaseConfig, DistributedConfig, FilesystemConfig, HybridConfig};
use crate::filters::{BotFilter, DeduplicationCache, DEFAULT_BOT_KEYWORDS, DEFAULT_BOT_PATTERNS};

/// Detector variants the orchestrator can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Database,
    Distributed,
    Filesystem,
    Hybrid,
}

/// Full configuration (matches the YAML structure)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: Option<String>,
    pub monitor: MonitorConfig,
    pub filters: FilterConfig,
    pub output: OutputConfig,
    /// Spoken announcements
    pub tts: SpeechConfig,
    /// Text message relay
    pub sms: SmsConfig,
    /// Also write logs to this file (`~` is expanded)
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Detectors to run in production mode
    pub detectors: Vec<DetectorKind>,
    /// Run only the bus observer and log everything it sees
    pub discovery: bool,
    /// Application identifier in the notification store
    pub app_identifier: String,
    /// Keywords identifying the application on the notification bus
    pub app_keywords: Vec<String>,
    /// Bus notification names to subscribe to (empty = all)
    pub bus_names: Vec<String>,
    pub poll_interval_secs: f64,
    pub debounce_secs: f64,
    pub hybrid_debounce_secs: f64,
    /// Notification store location (discovered when unset)
    pub store_path: Option<PathBuf>,
    /// Application data directory (platform default when unset)
    pub watch_path: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            detectors: vec![DetectorKind::Database],
            discovery: false,
            app_identifier: DEFAULT_APP_IDENTIFIER.to_string(),
            app_keywords: DEFAULT_APP_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            bus_names: Vec::new(),
            poll_interval_secs: 2.0,
            debounce_secs: 1.0,
            hybrid_debounce_secs: 1.5,
            store_path: None,
            watch_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Regex patterns for bot sender names (case-insensitive)
    pub bot_patterns: Vec<String>,
    /// Message substrings that indicate automated messages
    pub bot_keywords: Vec<String>,
    pub dedup_window_seconds: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            bot_patterns: DEFAULT_BOT_PATTERNS.iter().map(|s| s.to_string()).collect(),
            bot_keywords: DEFAULT_BOT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            dedup_window_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Print events instead of announcing them
    pub dry_run: bool,
}

/// Convert fractional seconds from the config file into a Duration
fn secs(value: f64, fallback: Duration) -> Duration {
    Duration::try_from_secs_f64(value)
        .ok()
        .filter(|d| !d.is_zero())
        .unwrap_or(fallback)
}

impl Config {
    /// Detectors to start, applying the discovery policy
    pub fn active_detectors(&self) -> Vec<DetectorKind> {
        if self.monitor.discovery {
            return vec![DetectorKind::Distributed];
        }

        let mut seen = HashSet::new();
        self.monitor
            .detectors
            .iter()
            .copied()
            .filter(|kind| seen.insert(*kind))
            .collect()
    }

    pub fn bot_filter(&self) -> Result<BotFilter> {
        BotFilter::new(&self.filters.bot_patterns, &self.filters.bot_keywords)
            .context("Invalid bot pattern in config")
    }

    /// Log file with a leading `~` expanded
    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.log_file.as_deref().map(paths::expand_home)
    }

    pub fn dedup_cache(&self) -> DeduplicationCache {
        DeduplicationCache::new(Duration::from_secs(self.filters.dedup_window_seconds))
    }

    pub fn database_config(&self) -> DatabaseConfig {
        let defaults = DatabaseConfig::default();
        DatabaseConfig {
            app_identifier: self.monitor.app_identifier.clone(),
            poll_interval: secs(self.monitor.poll_interval_secs, defaults.poll_interval),
            ..defaults
        }
    }

    pub fn distributed_config(&self) -> DistributedConfig {
        let names = (!self.monitor.bus_names.is_empty())
            .then(|| self.monitor.bus_names.iter().cloned().collect());
        DistributedConfig {
            discovery: self.monitor.discovery,
            names,
            app_keywords: self.monitor.app_keywords.clone(),
            ..DistributedConfig::default()
        }
    }

    pub fn filesystem_config(&self, watch_root: &Path) -> FilesystemConfig {
        let defaults = FilesystemConfig::new(watch_root);
        FilesystemConfig {
            debounce: secs(self.monitor.debounce_secs, defaults.debounce),
            ..defaults
        }
    }

    pub fn hybrid_config(&self, watch_root: &Path) -> HybridConfig {
        let defaults = HybridConfig::new(watch_root);
        HybridConfig {
            app_identifier: self.monitor.app_identifier.clone(),
            debounce: secs(self.monitor.hybrid_debounce_secs, defaults.debounce),
            ..defaults
        }
    }
}

/// A loaded configuration and where it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    /// Path to config file (if one was read)
    pub config_file: Option<PathBuf>,
}

/// Load and parse a config file
fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load configuration from all sources.
///
/// An explicit path must exist; the default path is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let env_path = std::env::var_os("SLACKPULSE_CONFIG").map(PathBuf::from);

    let (mut config, config_file) = match explicit.map(Path::to_path_buf).or(env_path) {
        Some(path) => (load_config_file(&path)?, Some(path)),
        None => {
            let default_path = paths::default_config_file();
            match default_path {
                Some(path) if path.exists() => (load_config_file(&path)?, Some(path)),
                _ => (Config::default(), None),
            }
        }
    };

    if let Some(store) = std::env::var_os("SLACKPULSE_STORE_PATH") {
        config.monitor.store_path = Some(PathBuf::from(store));
    }
    if let Some(watch) = std::env::var_os("SLACKPULSE_WATCH_PATH") {
        config.monitor.watch_path = Some(PathBuf::from(watch));
    }

    Ok(LoadedConfig { config, config_file })
}

/// Commented default configuration
pub fn default_config_yaml() -> &'static str {
    r#"# slackpulse configuration
version: "1.0"

monitor:
  # database | distributed | filesystem | hybrid
  detectors: [database]
  discovery: false
  app_identifier: com.tinyspeck.slackmacgap
  app_keywords: [slack, tinyspeck, slackmacgap]
  # empty = every bus notification
  bus_names: []
  poll_interval_secs: 2.0
  debounce_secs: 1.0
  hybrid_debounce_secs: 1.5
  # store_path: ~/Library/Group Containers/group.com.apple.usernoted/db2/db
  # watch_path: ~/Library/Application Support/Slack

filters:
  # regex, case-insensitive
  bot_patterns: ['\bbot\b', slackbot, workflow, automation, '\bapp\b', integration, webhook]
  bot_keywords:
    - has joined the channel
    - has left the channel
    - set the channel topic
    - set the channel description
    - set the channel purpose
    - was added to
    - was removed from
    - archived the channel
    - unarchived the channel
    - renamed the channel
  dedup_window_seconds: 30

output:
  dry_run: false

tts:
  enabled: true
  # `say -v '?'` lists available voices
  voice: Samantha
  # words per minute
  rate: 200
  command: say

sms:
  enabled: false
  account_sid: ""
  auth_token: ""
  from_number: ""
  to_number: ""
  # send through the WhatsApp sandbox instead of SMS
  use_whatsapp: false

# log_file: ~/.local/share/slackpulse/slackpulse.log
"#
}
