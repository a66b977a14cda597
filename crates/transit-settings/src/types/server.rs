//! Listener and authorization settings.

use serde::{Deserialize, Serialize};

/// HTTP/WebSocket listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Interval between server Ping frames.
    pub heartbeat_interval_secs: u64,
    /// Close a connection that has not answered for this long.
    pub heartbeat_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue depth; messages beyond it are dropped.
    pub outbound_buffer: usize,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
    /// Time allowed for connections and the relay worker to finish on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_connections: 1000,
            heartbeat_interval_secs: 25,
            heartbeat_timeout_secs: 60,
            max_message_size: 64 * 1024,
            outbound_buffer: 256,
            cors_origins: Vec::new(),
            shutdown_timeout_secs: 10,
        }
    }
}

/// Connection authorization settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Bearer tokens accepted on the WebSocket upgrade. Empty disables the check.
    pub tokens: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_binds_all_interfaces() {
        let s = ServerSettings::default();
        assert_eq!(s.host, "0.0.0.0");
        assert_eq!(s.port, 3000);
    }

    #[test]
    fn heartbeat_timeout_exceeds_interval() {
        let s = ServerSettings::default();
        assert!(s.heartbeat_timeout_secs > s.heartbeat_interval_secs);
    }

    #[test]
    fn auth_disabled_by_default() {
        assert!(AuthSettings::default().tokens.is_empty());
    }
}
