//! # transit-relayd
//!
//! Transit relay server binary: loads settings, starts the relay worker and
//! the HTTP/`WebSocket` server, and waits for a shutdown signal.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use transit_core::logging::init_subscriber;
use transit_relay::history::{HistorySink, NoopHistorySink, SqliteHistorySink};
use transit_relay::{RelayConfig, RelayWorker};
use transit_server::{RelayTask, ServerConfig, ShutdownCoordinator, TransitServer, auth};
use transit_settings::{
    HistorySettings, RelaySettings, load_settings, load_settings_from_path, settings_dir,
};

/// Live vehicle location relay.
#[derive(Parser, Debug)]
#[command(name = "transit-relayd", about = "Live vehicle location relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file. Defaults to `~/.transit/settings.json`.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Path to the `SQLite` history database (overrides settings).
    #[arg(long)]
    history_db: Option<PathBuf>,

    /// Do not record location history.
    #[arg(long)]
    no_history: bool,

    /// Log level filter, e.g. `info` or `transit_relay=debug`.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Apply command-line flags on top of loaded settings.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref path) = self.history_db {
            settings.history.db_path.clone_from(path);
        }
        if self.no_history {
            settings.history.enabled = false;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn open_history(settings: &HistorySettings, base: &Path) -> Result<Arc<dyn HistorySink>> {
    if !settings.enabled {
        info!("location history disabled");
        return Ok(Arc::new(NoopHistorySink));
    }
    let path = settings.resolved_db_path(base);
    ensure_parent_dir(&path)?;
    let sink = SqliteHistorySink::open(&path)
        .with_context(|| format!("Failed to open history database: {}", path.display()))?;
    info!(path = %path.display(), "location history enabled");
    Ok(Arc::new(sink))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match cli.settings {
        Some(ref path) => load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings: {}", path.display()))?,
        None => load_settings().context("Failed to load settings")?,
    };
    cli.apply(&mut settings);

    init_subscriber(&settings.logging.level, settings.logging.format);

    let metrics =
        transit_server::metrics::install_recorder().context("Failed to install metrics")?;
    let history = open_history(&settings.history, &settings_dir())?;

    let shutdown = Arc::new(ShutdownCoordinator::with_drain_timeout(Duration::from_secs(
        settings.server.shutdown_timeout_secs,
    )));
    let (relay, worker) = RelayWorker::spawn(
        RelayConfig::from_settings(&settings.presence),
        history,
        shutdown.token(),
    );

    let server = TransitServer::new(
        ServerConfig::from_settings(&settings),
        relay,
        metrics,
        shutdown.clone(),
    )
    .with_authorizer(auth::from_settings(&settings.auth));

    let (addr, serve) = server.listen().await.context("Failed to start server")?;
    info!(
        addr = %addr,
        auth = !settings.auth.tokens.is_empty(),
        "transit relay ready"
    );

    let signal = shutdown.cancel_on_signal();
    shutdown.token().cancelled().await;
    info!(cause = ?shutdown.cause(), "shutting down");
    let stragglers = shutdown
        .drain(vec![
            (RelayTask::Listener, serve),
            (RelayTask::Worker, worker),
            (RelayTask::SignalListener, signal),
        ])
        .await;
    if stragglers.is_empty() {
        info!("shutdown complete");
    } else {
        warn!(?stragglers, "shutdown complete with aborted tasks");
    }
    Ok(())
}
