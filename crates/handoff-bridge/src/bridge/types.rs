//! Status, snapshot, and options for the pairing bridge.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::{DEFAULT_NEGOTIATION_TIMEOUT_MS, DEFAULT_RECONNECT_DELAY_MS, FORM_BRIDGE_CHANNEL};

/// Status of the current pairing link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BridgeStatus::Idle => "idle",
            BridgeStatus::Connecting => "connecting",
            BridgeStatus::Connected => "connected",
            BridgeStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// What status listeners observe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeSnapshot {
    pub status: BridgeStatus,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Delay before a failed or closed link is replaced.
    pub reconnect_delay: Duration,
    /// `None` lets a link stay `connecting` until the transport reports
    /// a failure.
    pub negotiation_timeout: Option<Duration>,
    /// Signal channel and data channel label.
    pub channel_label: String,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            negotiation_timeout: Some(Duration::from_millis(DEFAULT_NEGOTIATION_TIMEOUT_MS)),
            channel_label: FORM_BRIDGE_CHANNEL.to_string(),
        }
    }
}

impl BridgeOptions {
    /// Build from millisecond settings; a timeout of `0` disables it.
    pub fn from_millis(
        reconnect_delay_ms: u64,
        negotiation_timeout_ms: u64,
        channel_label: impl Into<String>,
    ) -> Self {
        Self {
            reconnect_delay: Duration::from_millis(reconnect_delay_ms),
            negotiation_timeout: (negotiation_timeout_ms > 0)
                .then(|| Duration::from_millis(negotiation_timeout_ms)),
            channel_label: channel_label.into(),
        }
    }
}
