//! `WebSocket` session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use transit_core::ConnectionId;
use transit_relay::{ClientConnection, OutboundEvent, RelayHandle};

use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// How long the writer gets to flush a Close frame once the session ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Per-session timing and buffering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionLimits {
    /// Interval between server Ping frames and liveness checks.
    pub heartbeat_interval: Duration,
    /// Silence tolerated before the client is dropped.
    pub heartbeat_timeout: Duration,
    /// Capacity of the connection's outbound queue.
    pub outbound_buffer: usize,
}

impl SessionLimits {
    /// Limits taken from the server configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval,
            heartbeat_timeout: config.heartbeat_timeout,
            outbound_buffer: config.outbound_buffer.max(1),
        }
    }
}

/// Run a `WebSocket` session for a connected client.
///
/// 1. Enqueues `connection.established` with the connection ID
/// 2. Forwards text (and UTF-8 binary) frames to the relay worker
/// 3. Drains the connection's outbound queue, interleaving Ping frames
/// 4. Drops clients that stay silent past the heartbeat timeout
/// 5. Reports the closed connection to the relay
#[instrument(skip_all, fields(connection_id = %connection_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    connection_id: ConnectionId,
    relay: RelayHandle,
    limits: SessionLimits,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(limits.outbound_buffer);
    let connection = Arc::new(ClientConnection::new(connection_id.clone(), send_tx));
    let session_cancel = shutdown.child_token();

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let established = OutboundEvent::ConnectionEstablished {
        connection_id: connection_id.clone(),
    };
    if !connection.send_event(&established) {
        warn!("failed to enqueue connection.established");
    }

    let writer_cancel = session_cancel.clone();
    let ping_every = limits.heartbeat_interval;
    let outbound = tokio::spawn(async move {
        let mut ping_interval = time::interval_at(Instant::now() + ping_every, ping_every);
        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(frame) = msg else { break };
                    if ws_tx.send(Message::Text(frame.as_str().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
                () = writer_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let heartbeat_conn = connection.clone();
    let heartbeat_cancel = session_cancel.clone();
    let heartbeat = tokio::spawn(async move {
        let result = run_heartbeat(
            heartbeat_conn,
            limits.heartbeat_interval,
            limits.heartbeat_timeout,
            heartbeat_cancel.clone(),
        )
        .await;
        if result == HeartbeatResult::TimedOut {
            warn!(timeout = ?limits.heartbeat_timeout, "client unresponsive, disconnecting");
            heartbeat_cancel.cancel();
        }
    });

    loop {
        let next = tokio::select! {
            msg = ws_rx.next() => msg,
            () = session_cancel.cancelled() => break,
        };
        let Some(Ok(msg)) = next else { break };
        connection.mark_alive();

        let text = match msg {
            Message::Text(t) => t.as_str().to_owned(),
            Message::Binary(data) => {
                if let Ok(s) = std::str::from_utf8(&data) {
                    s.to_owned()
                } else {
                    debug!(len = data.len(), "received non-UTF8 binary frame");
                    continue;
                }
            }
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if let Err(e) = relay.submit_frame(connection.clone(), text).await {
            warn!(error = %e, "relay unavailable, closing connection");
            break;
        }
    }

    session_cancel.cancel();
    if let Err(e) = relay.connection_closed(connection_id).await {
        debug!(error = %e, "relay already stopped");
    }
    let _ = heartbeat.await;
    let abort = outbound.abort_handle();
    if time::timeout(WRITER_DRAIN_TIMEOUT, outbound).await.is_err() {
        abort.abort();
    }

    info!(
        dropped = connection.drop_count(),
        age_secs = connection.age().as_secs(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
}
