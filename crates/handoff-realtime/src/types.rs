//! Configuration, wire envelope, and event/command enums for the relay client.

use std::time::Duration;

use handoff_common::{ConnectionId, RelayError};
use serde::{Deserialize, Serialize};

use crate::credentials::RealtimeCredential;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for connecting to the relay.
#[derive(Clone)]
pub struct RelayClientConfig {
    /// WebSocket endpoint (e.g. `wss://relay.example.com/socket/websocket`).
    pub url: String,
    /// Optional publishable API key.
    pub api_key: Option<String>,
    /// Heartbeat interval in seconds (default: 25).
    pub heartbeat_interval_secs: u64,
    /// Upper bound on the WebSocket handshake in seconds (default: 15).
    pub connect_timeout_secs: u64,
}

impl std::fmt::Debug for RelayClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClientConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl Default for RelayClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: None,
            heartbeat_interval_secs: 25,
            connect_timeout_secs: 15,
        }
    }
}

impl RelayClientConfig {
    /// Build the WebSocket URL for a given credential. The token travels in
    /// the query string so an invalid one is rejected at the handshake.
    pub(crate) fn ws_url(&self, credential: &RealtimeCredential) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        let mut url = format!(
            "{}{sep}vsn=1.0.0&token={}",
            self.url,
            urlencoding::encode(&credential.token)
        );
        if let Some(key) = &self.api_key {
            url.push_str("&apikey=");
            url.push_str(&urlencoding::encode(key));
        }
        url
    }

    pub(crate) fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }
}

// ---------------------------------------------------------------------------
// Phoenix Protocol Types
// ---------------------------------------------------------------------------

/// A Phoenix protocol message envelope (v1 JSON format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
    #[serde(rename = "ref")]
    pub msg_ref: Option<String>,
}

// ---------------------------------------------------------------------------
// Events & Commands
// ---------------------------------------------------------------------------

/// Lifecycle events emitted by the relay connection.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// WebSocket connection established.
    Connected { connection_id: ConnectionId },
    /// WebSocket connection lost or closed.
    Disconnected { connection_id: ConnectionId },
    /// Join acknowledged for a topic.
    ChannelJoined { topic: String },
    /// Join rejected, or the server closed/errored a topic.
    ChannelError { topic: String, message: String },
    /// Connection-level failure (handshake refused, timeout, socket error).
    Error(RelayError),
}

/// Commands sent to a live connection task.
#[derive(Debug)]
pub(crate) enum RelayCommand {
    Join {
        topic: String,
    },
    Broadcast {
        topic: String,
        event: String,
        payload: serde_json::Value,
    },
    Disconnect,
}
