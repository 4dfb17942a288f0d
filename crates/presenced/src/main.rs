// # presenced - Presence Monitor Daemon
//
// This is a thin integration layer. All presence logic lives in
// presence-core; the daemon only reads configuration, wires the core to a
// file-backed snapshot store and a log-only notifier, and waits for a
// shutdown signal.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Complexes and schedules
// - `PRESENCE_COMPLEXES_FILE`: JSON list of complexes (required)
// - `PRESENCE_SCHEDULE_FILE`: JSON list of schedule groups (optional)
//
// ### Snapshots
// - `PRESENCE_STATE_DIR`: Directory for registry snapshots
//
// ### Runtime
// - `PRESENCE_UTC_OFFSET_MINUTES`: Offset for rendered times and schedule lookup
// - `PRESENCE_QUEUE_CAPACITY`: Notification queue capacity
// - `PRESENCE_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export PRESENCE_COMPLEXES_FILE=/etc/presence/complexes.json
// export PRESENCE_SCHEDULE_FILE=/etc/presence/schedule.json
// export PRESENCE_STATE_DIR=/var/lib/presence
// export PRESENCE_UTC_OFFSET_MINUTES=120
//
// presenced
// ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use presence_core::{
    Complex, FileSnapshotStore, MonitorConfig, Notifier, PresenceService, ScheduleIndex,
};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum PresenceExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<PresenceExitCode> for ExitCode {
    fn from(code: PresenceExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    complexes_file: String,
    schedule_file: Option<String>,
    state_dir: String,
    utc_offset_minutes: i32,
    queue_capacity: Option<usize>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            complexes_file: env::var("PRESENCE_COMPLEXES_FILE")
                .context("PRESENCE_COMPLEXES_FILE is required")?,
            schedule_file: env::var("PRESENCE_SCHEDULE_FILE").ok(),
            state_dir: env::var("PRESENCE_STATE_DIR")
                .unwrap_or_else(|_| "/var/lib/presence".to_string()),
            utc_offset_minutes: match env::var("PRESENCE_UTC_OFFSET_MINUTES") {
                Ok(s) => s
                    .parse()
                    .with_context(|| format!("PRESENCE_UTC_OFFSET_MINUTES is not a number: {}", s))?,
                Err(_) => 0,
            },
            queue_capacity: match env::var("PRESENCE_QUEUE_CAPACITY") {
                Ok(s) => Some(
                    s.parse()
                        .with_context(|| format!("PRESENCE_QUEUE_CAPACITY is not a number: {}", s))?,
                ),
                Err(_) => None,
            },
            log_level: env::var("PRESENCE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate values that do not need file access
    fn validate(&self) -> Result<()> {
        if self.complexes_file.is_empty() {
            anyhow::bail!("PRESENCE_COMPLEXES_FILE cannot be empty");
        }

        if self.state_dir.is_empty() {
            anyhow::bail!(
                "PRESENCE_STATE_DIR cannot be empty. \
                Set it via: export PRESENCE_STATE_DIR=/var/lib/presence"
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "PRESENCE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Build the core configuration from the complexes file
    fn monitor_config(&self) -> Result<MonitorConfig> {
        let body = std::fs::read_to_string(&self.complexes_file)
            .with_context(|| format!("Failed to read {}", self.complexes_file))?;
        let complexes: Vec<Complex> = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse {}", self.complexes_file))?;

        let mut config =
            MonitorConfig::new(complexes).with_utc_offset_minutes(self.utc_offset_minutes);
        if let Some(capacity) = self.queue_capacity {
            config.dispatcher.queue_capacity = capacity;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load the schedule table, or an empty one when no file is configured
    fn schedule(&self) -> Result<ScheduleIndex> {
        let Some(path) = &self.schedule_file else {
            return Ok(ScheduleIndex::default());
        };

        let body =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
        Ok(ScheduleIndex::from_json(&body)?)
    }
}

/// Notifier that writes every message to the log
///
/// Stands in for a chat-channel client.
struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str, channel: i64) -> presence_core::Result<()> {
        info!(channel, "{}", text);
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "log"
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return PresenceExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return PresenceExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return PresenceExitCode::ConfigError.into();
    }

    let loaded = config
        .monitor_config()
        .and_then(|m| config.schedule().map(|s| (m, s)));

    let (monitor_config, schedule) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return PresenceExitCode::ConfigError.into();
        }
    };

    info!("Starting presenced daemon");
    info!("Configuration loaded: {} complex(es)", monitor_config.complexes.len());

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return PresenceExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(&config.state_dir, monitor_config, schedule).await {
            error!("Daemon error: {:#}", e);
            PresenceExitCode::RuntimeError
        } else {
            PresenceExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(state_dir: &str, config: MonitorConfig, schedule: ScheduleIndex) -> Result<()> {
    let store = FileSnapshotStore::new(state_dir)
        .await
        .with_context(|| format!("Failed to open snapshot directory {}", state_dir))?;

    let mut service = PresenceService::new(
        config,
        Arc::new(LogNotifier),
        Arc::new(store),
        Arc::new(schedule),
    )?;

    service.start().await;
    info!("Ready to track devices");

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);

    service.shutdown().await;
    Ok(())
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
