//! `WebSocket` connection handling.

pub mod heartbeat;
pub mod session;
