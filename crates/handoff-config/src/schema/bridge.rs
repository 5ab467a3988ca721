//! Pairing bridge and ICE configuration types.

use serde::{Deserialize, Serialize};

/// Pairing bridge behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Delay before a failed or closed link is renegotiated (valid range: 100-60000).
    pub reconnect_delay_ms: u32,
    /// How long a link may stay `connecting` before it is treated as failed.
    /// `0` disables the timeout; otherwise valid range is 1000-300000.
    pub negotiation_timeout_ms: u32,
    /// Label of the data channel and of the signal channel discriminator.
    pub channel_label: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 3000,
            negotiation_timeout_ms: 20_000,
            channel_label: "form-bridge".into(),
        }
    }
}

/// One STUN/TURN server entry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl std::fmt::Debug for IceServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IceServerConfig")
            .field("urls", &self.urls)
            .field("username", &self.username)
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for IceServerConfig {
    fn default() -> Self {
        Self {
            urls: vec!["stun:stun.l.google.com:19302".into()],
            username: None,
            credential: None,
        }
    }
}

/// Connectivity infrastructure handed to the peer transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    pub servers: Vec<IceServerConfig>,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            servers: vec![IceServerConfig::default()],
        }
    }
}
