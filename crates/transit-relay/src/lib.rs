//! # transit-relay
//!
//! The live-location relay core.
//!
//! - [`presence::PresenceRegistry`]: one session per broadcasting operator
//! - [`route_index::RouteIndex`]: route → active vehicles, maintained by the registry
//! - [`broker::SubscriptionBroker`]: per-route viewer groups and fan-out
//! - [`router::EventRouter`]: validates inbound frames and applies them
//! - [`sweeper`]: evicts operators that have gone silent
//! - [`worker::RelayWorker`]: single task owning all of the above
//! - [`history`]: append-only location log written off the relay path
//! - [`query`]: nearest-vehicle and ETA answers over route snapshots

#![deny(unsafe_code)]

pub mod broker;
pub mod connection;
pub mod errors;
pub mod history;
pub mod presence;
pub mod protocol;
pub mod query;
pub mod route_index;
pub mod router;
pub mod state;
pub mod sweeper;
pub mod telemetry;
pub mod worker;

pub use connection::ClientConnection;
pub use errors::{HistoryError, RelayError};
pub use protocol::{InboundEvent, OutboundEvent};
pub use state::RelayState;
pub use worker::{RelayConfig, RelayHandle, RelayStats, RelayWorker};
