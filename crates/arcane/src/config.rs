//! Server configuration.

use arcane_heartbeat::HeartbeatConfig;
use arcane_protocol::DEFAULT_DELIMITER;
use arcane_transport::DEFAULT_MAX_FRAME_LEN;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:6543";

/// Everything the builder needs to compose a [`Server`](crate::Server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the transport listens on, as `host:port`.
    pub bind_addr: String,
    /// Byte that terminates every frame on the wire.
    pub delimiter: u8,
    /// Sweep period and silence timeout.
    pub heartbeat: HeartbeatConfig,
    /// Longest inbound frame the TCP transport accepts.
    pub max_frame_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            delimiter: DEFAULT_DELIMITER,
            heartbeat: HeartbeatConfig::default(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl ServerConfig {
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }
}
