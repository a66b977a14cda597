//! The relay worker: a single task that owns [`RelayState`].
//!
//! Connections and HTTP handlers talk to it through a cloneable
//! [`RelayHandle`]. Commands and sweep ticks are processed one at a time,
//! so presence and subscription state need no locks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use transit_core::{ConnectionId, RouteId, SessionSnapshot};
use transit_settings::PresenceSettings;

use crate::connection::ClientConnection;
use crate::errors::RelayError;
use crate::history::HistorySink;
use crate::router::{self, EventRouter};
use crate::state::RelayState;
use crate::sweeper;

pub use crate::state::RelayStats;

/// Worker timing and queue sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    /// How often the staleness sweep runs.
    pub sweep_interval: Duration,
    /// Silence after which an operator is evicted.
    pub stale_threshold: Duration,
    /// Depth of the command queue.
    pub command_buffer: usize,
}

impl RelayConfig {
    /// Build from loaded settings.
    pub fn from_settings(presence: &PresenceSettings) -> Self {
        Self {
            sweep_interval: presence.sweep_interval(),
            stale_threshold: presence.stale_threshold(),
            command_buffer: presence.command_buffer.max(1),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_settings(&PresenceSettings::default())
    }
}

/// Work items for the relay worker.
#[derive(Debug)]
pub enum RelayCommand {
    /// A text frame received on a connection.
    Frame {
        /// The sending connection.
        connection: Arc<ClientConnection>,
        /// Raw frame text.
        text: String,
    },
    /// A connection closed.
    Closed {
        /// The closed connection.
        connection_id: ConnectionId,
    },
    /// Current vehicles on one route.
    RouteSnapshot {
        /// Route to read.
        route_id: RouteId,
        /// Reply channel.
        reply: oneshot::Sender<Vec<SessionSnapshot>>,
    },
    /// Current vehicles on every route.
    AllSnapshots {
        /// Reply channel.
        reply: oneshot::Sender<Vec<SessionSnapshot>>,
    },
    /// Current counters.
    Stats {
        /// Reply channel.
        reply: oneshot::Sender<RelayStats>,
    },
    /// Run a sweep immediately, replying with the number evicted.
    Sweep {
        /// Reply channel.
        reply: oneshot::Sender<usize>,
    },
}

/// Cloneable sender side of the relay worker.
#[derive(Clone, Debug)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    /// Queue a frame from `connection`. Waits if the queue is full.
    pub async fn submit_frame(
        &self,
        connection: Arc<ClientConnection>,
        text: String,
    ) -> Result<(), RelayError> {
        self.send(RelayCommand::Frame { connection, text }).await
    }

    /// Report that a connection closed.
    pub async fn connection_closed(&self, connection_id: ConnectionId) -> Result<(), RelayError> {
        self.send(RelayCommand::Closed { connection_id }).await
    }

    /// Vehicles currently broadcasting on `route_id`.
    pub async fn route_snapshot(
        &self,
        route_id: RouteId,
    ) -> Result<Vec<SessionSnapshot>, RelayError> {
        self.request(|reply| RelayCommand::RouteSnapshot { route_id, reply })
            .await
    }

    /// Vehicles currently broadcasting on any route.
    pub async fn all_snapshots(&self) -> Result<Vec<SessionSnapshot>, RelayError> {
        self.request(|reply| RelayCommand::AllSnapshots { reply }).await
    }

    /// Vehicles on `route_id` if given, otherwise on every route.
    pub async fn snapshots(
        &self,
        route_id: Option<RouteId>,
    ) -> Result<Vec<SessionSnapshot>, RelayError> {
        match route_id {
            Some(route_id) => self.route_snapshot(route_id).await,
            None => self.all_snapshots().await,
        }
    }

    /// Current relay counters.
    pub async fn stats(&self) -> Result<RelayStats, RelayError> {
        self.request(|reply| RelayCommand::Stats { reply }).await
    }

    /// Run a sweep now, outside the regular schedule.
    pub async fn sweep_now(&self) -> Result<usize, RelayError> {
        self.request(|reply| RelayCommand::Sweep { reply }).await
    }

    /// Whether the worker has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, command: RelayCommand) -> Result<(), RelayError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| RelayError::WorkerUnavailable)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> RelayCommand,
    ) -> Result<T, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply)).await?;
        rx.await.map_err(|_| RelayError::WorkerUnavailable)
    }
}

/// Owns the relay state and processes commands and sweep ticks.
pub struct RelayWorker {
    state: RelayState,
    router: EventRouter,
    config: RelayConfig,
    rx: mpsc::Receiver<RelayCommand>,
    cancel: CancellationToken,
}

impl RelayWorker {
    /// Start a worker on the current runtime.
    ///
    /// The worker runs until `cancel` fires or every [`RelayHandle`] is dropped.
    pub fn spawn(
        config: RelayConfig,
        history: Arc<dyn HistorySink>,
        cancel: CancellationToken,
    ) -> (RelayHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let worker = Self {
            state: RelayState::new(),
            router: EventRouter::new(history),
            config,
            rx,
            cancel,
        };
        let handle = tokio::spawn(worker.run());
        (RelayHandle { tx }, handle)
    }

    #[instrument(skip_all, name = "relay_worker")]
    async fn run(mut self) {
        let mut sweep = sweeper::sweep_interval(self.config.sweep_interval);
        info!(
            sweep_interval_ms = self.config.sweep_interval.as_millis(),
            stale_threshold_ms = self.config.stale_threshold.as_millis(),
            "relay worker started"
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!("relay worker cancelled");
                    break;
                }
                _ = sweep.tick() => {
                    let threshold = self.config.stale_threshold;
                    let _ = sweeper::sweep(&mut self.state, Instant::now(), threshold);
                    self.state.record_gauges();
                }
                command = self.rx.recv() => {
                    let Some(command) = command else {
                        debug!("all relay handles dropped");
                        break;
                    };
                    self.handle(command);
                }
            }
        }

        info!(
            active_sessions = self.state.presence.len(),
            "relay worker stopped"
        );
    }

    fn handle(&mut self, command: RelayCommand) {
        match command {
            RelayCommand::Frame { connection, text } => {
                let _ = self
                    .router
                    .handle_frame(&mut self.state, &connection, &text, Instant::now());
                self.state.record_gauges();
            }
            RelayCommand::Closed { connection_id } => {
                let ended = router::connection_closed(&mut self.state, &connection_id);
                debug!(
                    connection_id = %connection_id,
                    sessions_ended = ended,
                    "connection released"
                );
                self.state.record_gauges();
            }
            RelayCommand::RouteSnapshot { route_id, reply } => {
                let _ = reply.send(self.state.presence.index().snapshot(&route_id));
            }
            RelayCommand::AllSnapshots { reply } => {
                let _ = reply.send(self.state.presence.index().all_snapshots());
            }
            RelayCommand::Stats { reply } => {
                let _ = reply.send(self.state.stats());
            }
            RelayCommand::Sweep { reply } => {
                let evicted =
                    sweeper::sweep(&mut self.state, Instant::now(), self.config.stale_threshold);
                self.state.record_gauges();
                let _ = reply.send(evicted.len());
            }
        }
    }
}
