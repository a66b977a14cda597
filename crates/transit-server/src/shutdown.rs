//! Relay shutdown: signal handling and draining of relay tasks.
//!
//! One `CancellationToken` is shared by the listener, every WebSocket
//! session, the relay worker and the sweeper. Cancelling it stops intake;
//! [`ShutdownCoordinator::drain`] then awaits the long-running tasks under a
//! single deadline and aborts whatever is left.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drain budget used when none is configured.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Long-running relay tasks awaited during shutdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayTask {
    /// The HTTP/WebSocket listener and its connections.
    Listener,
    /// The relay worker that owns presence and subscriptions.
    Worker,
    /// The OS signal listener.
    SignalListener,
}

impl RelayTask {
    /// Label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Listener => "listener",
            Self::Worker => "relay_worker",
            Self::SignalListener => "signal_listener",
        }
    }
}

impl fmt::Display for RelayTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the relay is going down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownCause {
    /// Ctrl-C or `SIGTERM`.
    Signal,
    /// [`ShutdownCoordinator::shutdown`] was called.
    Requested,
}

/// Shared shutdown state for the relay process.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    signalled: Arc<AtomicBool>,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    /// Coordinator with the default drain budget.
    pub fn new() -> Self {
        Self::with_drain_timeout(DEFAULT_DRAIN_TIMEOUT)
    }

    /// Coordinator that gives tasks `drain_timeout` in total to finish.
    pub fn with_drain_timeout(drain_timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            signalled: Arc::new(AtomicBool::new(false)),
            drain_timeout,
        }
    }

    /// Token observed by every relay task.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stop accepting work. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// What started the shutdown, or `None` while the relay is running.
    pub fn cause(&self) -> Option<ShutdownCause> {
        if !self.is_shutting_down() {
            return None;
        }
        if self.signalled.load(Ordering::Acquire) {
            Some(ShutdownCause::Signal)
        } else {
            Some(ShutdownCause::Requested)
        }
    }

    /// Cancel the token on Ctrl-C or, on Unix, `SIGTERM`.
    ///
    /// The listener exits quietly if shutdown starts some other way.
    pub fn cancel_on_signal(&self) -> JoinHandle<()> {
        let token = self.token.clone();
        let signalled = Arc::clone(&self.signalled);
        tokio::spawn(async move {
            tokio::select! {
                () = wait_for_signal() => {
                    info!("shutdown signal received");
                    signalled.store(true, Ordering::Release);
                    token.cancel();
                }
                () = token.cancelled() => {}
            }
        })
    }

    /// Cancel the token, then await `tasks` in order under one shared
    /// deadline.
    ///
    /// Tasks still running at the deadline are aborted and returned.
    pub async fn drain(&self, tasks: Vec<(RelayTask, JoinHandle<()>)>) -> Vec<RelayTask> {
        self.shutdown();
        let deadline = Instant::now() + self.drain_timeout;
        info!(
            cause = ?self.cause(),
            task_count = tasks.len(),
            timeout_ms = u64::try_from(self.drain_timeout.as_millis()).unwrap_or(u64::MAX),
            "draining relay tasks"
        );

        let mut stragglers = Vec::new();
        for (task, mut handle) in tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => debug!(task = %task, "task finished"),
                Ok(Err(e)) => warn!(task = %task, error = %e, "task failed during shutdown"),
                Err(_) => {
                    warn!(task = %task, "task missed the drain deadline, aborting");
                    handle.abort();
                    stragglers.push(task);
                }
            }
        }
        stragglers
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                let _ = sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
