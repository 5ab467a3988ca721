use serde::{Deserialize, Serialize};

/// Connection settings for the signaling relay.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// WebSocket endpoint of the relay (Phoenix socket path).
    pub url: String,
    /// Optional publishable API key sent as the `apikey` query parameter.
    pub api_key: Option<String>,
    /// Heartbeat interval in seconds (valid range: 5-120).
    pub heartbeat_interval_secs: u32,
    /// Upper bound on a single connection attempt in seconds (valid range: 1-60).
    pub connect_timeout_secs: u32,
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: "wss://relay.handoff.dev/socket/websocket".into(),
            api_key: None,
            heartbeat_interval_secs: 25,
            connect_timeout_secs: 15,
        }
    }
}
