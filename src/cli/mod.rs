//! Command-line interface for slackpulse.
//!
//! Provides commands for running the monitor, inspecting the resolved
//! configuration, and writing a starter config file.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapters::{
    spawn_bridge_thread, FanoutSink, LocalBus, LogSink, NotificationStore, PrintSink, SmsSink,
    SpeechSink, SqliteStore, TwilioClient,
};
use crate::config::{self, paths, Config, DetectorKind};
use crate::core::{Orchestrator, Sources};

/// slackpulse - Detect incoming chat messages from local notification sources
#[derive(Parser, Debug)]
#[command(name = "slackpulse")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the notification monitor until Ctrl+C or SIGTERM
    Run {
        /// Config file (defaults to ~/.slackpulse/config.yaml)
        #[arg(short, long, env = "SLACKPULSE_CONFIG")]
        config: Option<PathBuf>,

        /// Log every bus notification to identify application patterns
        #[arg(long)]
        discover: bool,

        /// Print detected messages instead of announcing them
        #[arg(long)]
        dry_run: bool,

        /// Detectors to run (overrides the config file; repeatable)
        #[arg(short, long = "detector", value_enum)]
        detectors: Vec<DetectorArg>,

        /// Feed the notification bus from newline-delimited JSON on stdin
        #[arg(long)]
        bus_stdin: bool,
    },

    /// Show resolved configuration (debug)
    Config {
        /// Config file (defaults to ~/.slackpulse/config.yaml)
        #[arg(short, long, env = "SLACKPULSE_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Write a commented default config file
    InitConfig {
        /// Destination (defaults to ~/.slackpulse/config.yaml)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,

        /// Print to stdout instead of writing a file
        #[arg(long, conflicts_with_all = ["path", "force"])]
        stdout: bool,
    },
}

/// Detector kind for CLI (maps to DetectorKind)
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DetectorArg {
    /// Poll the notification store
    Database,

    /// Observe the notification bus
    Distributed,

    /// Watch the application data directory
    Filesystem,

    /// Filesystem trigger with store lookup
    Hybrid,
}

impl From<DetectorArg> for DetectorKind {
    fn from(arg: DetectorArg) -> Self {
        match arg {
            DetectorArg::Database => DetectorKind::Database,
            DetectorArg::Distributed => DetectorKind::Distributed,
            DetectorArg::Filesystem => DetectorKind::Filesystem,
            DetectorArg::Hybrid => DetectorKind::Hybrid,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                config,
                discover,
                dry_run,
                detectors,
                bus_stdin,
            } => {
                let mut cfg = config::load_config(config.as_deref())?.config;
                apply_run_flags(&mut cfg, discover, dry_run, &detectors);

                let shutdown = CancellationToken::new();
                install_shutdown_handler(shutdown.clone())?;

                let bus_input = bus_stdin
                    .then(|| Box::new(BufReader::new(std::io::stdin())) as Box<dyn BufRead + Send>);
                run_monitor(cfg, bus_input, shutdown).await
            }
            Commands::Config { config } => show_config(config.as_deref()).await,
            Commands::InitConfig { stdout: true, .. } => {
                print!("{}", config::default_config_yaml());
                Ok(())
            }
            Commands::InitConfig { path, force, .. } => init_config(path, force),
        }
    }

    /// Log file configured for this command, if any.
    ///
    /// Read before logging is initialised, so config errors are left for
    /// the command itself to report.
    pub fn log_file(&self) -> Option<PathBuf> {
        let config = match &self.command {
            Commands::Run { config, .. } | Commands::Config { config } => config.as_deref(),
            Commands::InitConfig { .. } => return None,
        };
        config::load_config(config).ok()?.config.log_file_path()
    }
}

/// Open `path` for appending, creating parent directories
pub fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}

/// Command-line flags win over the config file
fn apply_run_flags(cfg: &mut Config, discover: bool, dry_run: bool, detectors: &[DetectorArg]) {
    if discover {
        cfg.monitor.discovery = true;
    }
    if dry_run {
        cfg.output.dry_run = true;
    }
    if !detectors.is_empty() {
        cfg.monitor.detectors = detectors.iter().copied().map(DetectorKind::from).collect();
    }
}

/// Resolve the notification store: configured path first, then discovery
async fn resolve_store(cfg: &Config) -> Option<PathBuf> {
    match &cfg.monitor.store_path {
        Some(path) if path.exists() => Some(path.clone()),
        Some(path) => {
            warn!("Configured store does not exist: {}", path.display());
            None
        }
        None => paths::find_notification_store().await,
    }
}

async fn resolve_sources(cfg: &Config, bus: &LocalBus) -> Sources {
    let kinds = cfg.active_detectors();
    let needs = |k: DetectorKind| kinds.contains(&k);

    let store = if needs(DetectorKind::Database) || needs(DetectorKind::Hybrid) {
        resolve_store(cfg).await.map(|path| {
            info!("Using notification store: {}", path.display());
            Arc::new(SqliteStore::new(path)) as Arc<dyn NotificationStore>
        })
    } else {
        None
    };

    let watch_root = cfg
        .monitor
        .watch_path
        .clone()
        .unwrap_or_else(paths::app_data_dir);

    Sources {
        store,
        bus: Some(Arc::new(bus.clone())),
        watch_root: Some(watch_root),
    }
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
///
/// The SIGTERM listener is registered before this returns. The handler task
/// ends once the token is cancelled.
pub fn install_shutdown_handler(shutdown: CancellationToken) -> Result<JoinHandle<()>> {
    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    Ok(tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            terminate.recv().await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT, initiating shutdown..."),
            _ = terminate => info!("Received SIGTERM, initiating shutdown..."),
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    }))
}

/// Sinks for accepted events: the console in dry-run mode, otherwise the
/// log plus speech and relay when enabled.
fn build_sink(cfg: &Config) -> FanoutSink {
    if cfg.output.dry_run {
        return FanoutSink::new().with(Arc::new(PrintSink));
    }

    let mut sink = FanoutSink::new().with(Arc::new(LogSink));

    if cfg.tts.enabled {
        info!(voice = %cfg.tts.voice, rate = cfg.tts.rate, "Speech enabled");
        sink = sink.with(Arc::new(SpeechSink::spawn(cfg.tts.clone())));
    }

    if cfg.sms.enabled {
        if cfg.sms.has_credentials() {
            let client = TwilioClient::from_config(&cfg.sms);
            sink = sink.with(Arc::new(SmsSink::spawn(cfg.sms.clone(), client)));
        } else {
            warn!("SMS relay enabled but credentials are incomplete; relay disabled");
        }
    }

    sink
}

/// Run the monitor until `shutdown` is cancelled.
///
/// `bus_input` is read on a detached thread, so a read blocked on an idle
/// terminal never holds up the return.
pub async fn run_monitor(
    cfg: Config,
    bus_input: Option<Box<dyn BufRead + Send>>,
    shutdown: CancellationToken,
) -> Result<()> {
    let bus = LocalBus::new();
    let sink = build_sink(&cfg);
    info!(sinks = sink.len(), "Event sinks ready");

    let sources = resolve_sources(&cfg, &bus).await;
    let mut orchestrator = Orchestrator::new(cfg, sources, Arc::new(sink), shutdown.clone())?;

    if let Some(reader) = bus_input {
        spawn_bridge_thread(reader, bus.clone(), shutdown.child_token())
            .context("Failed to start bus bridge thread")?;
    }

    orchestrator.run().await?;
    bus.close();

    Ok(())
}

/// Show resolved configuration
async fn show_config(path: Option<&Path>) -> Result<()> {
    let loaded = config::load_config(path)?;
    let cfg = &loaded.config;

    println!("slackpulse configuration");
    println!();
    println!(
        "Config file: {}",
        loaded
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Sources:");
    match resolve_store(cfg).await {
        Some(store) => println!("  Notification store: {}", store.display()),
        None => println!("  Notification store: (not found - grant Full Disk Access?)"),
    }
    let watch = cfg.monitor.watch_path.clone().unwrap_or_else(paths::app_data_dir);
    println!(
        "  Watch directory:    {}{}",
        watch.display(),
        if watch.is_dir() { "" } else { " (missing)" }
    );
    println!();
    println!("Detectors:");
    for kind in cfg.active_detectors() {
        println!("  {:?}", kind);
    }
    if cfg.monitor.discovery {
        println!("  (discovery mode)");
    }
    println!();
    println!("Filters:");
    println!("  Bot patterns:  {}", cfg.filters.bot_patterns.len());
    println!("  Bot keywords:  {}", cfg.filters.bot_keywords.len());
    println!("  Dedup window:  {}s", cfg.filters.dedup_window_seconds);
    println!();
    println!("Output:");
    if cfg.output.dry_run {
        println!("  Dry run (console only)");
    }
    println!(
        "  Speech:  {}",
        if cfg.tts.enabled {
            format!("{} ({}, {} wpm)", cfg.tts.command, cfg.tts.voice, cfg.tts.rate)
        } else {
            "disabled".to_string()
        }
    );
    println!(
        "  Relay:   {}",
        match (cfg.sms.enabled, cfg.sms.has_credentials()) {
            (false, _) => "disabled",
            (true, false) => "enabled (credentials incomplete)",
            (true, true) if cfg.sms.use_whatsapp => "WhatsApp",
            (true, true) => "SMS",
        }
    );
    if let Some(log) = cfg.log_file_path() {
        println!("  Log file: {}", log.display());
    }

    Ok(())
}

/// Write the default config file
fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(p) => p,
        None => paths::default_config_file().context("Could not determine home directory")?,
    };

    if path.exists() && !force {
        bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(&path, config::default_config_yaml())
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    println!("Wrote {}", path.display());
    Ok(())
}
