//! # transit-server
//!
//! Axum HTTP + `WebSocket` front end for the relay worker.
//!
//! - `GET /ws`: operator and viewer connections, heartbeat, frame forwarding
//! - `GET /api/locations/...`, `POST /api/locations/...`: live queries
//! - `GET /health`, `GET /metrics`: liveness and Prometheus text
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod http;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::{AppState, TransitServer};
pub use shutdown::{RelayTask, ShutdownCause, ShutdownCoordinator};
