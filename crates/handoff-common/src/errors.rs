use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failures of the signaling relay connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RelayError {
    #[error("relay connect failed: {0}")]
    Connect(String),

    #[error("relay rejected credential: {0}")]
    Rejected(String),

    #[error("relay protocol error: {0}")]
    Protocol(String),

    #[error("relay connection closed")]
    Closed,
}

/// Failures inside a pairing bridge. These never reach bridge callers;
/// they are folded into the bridge status and last error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("data channel is not open")]
    ChannelNotOpen,

    #[error("encode error: {0}")]
    Encode(String),

    #[error("bridge stopped")]
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Encode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("bridge.channel_label is empty".into());
        assert_eq!(
            err.to_string(),
            "config validation error: bridge.channel_label is empty"
        );
    }

    #[test]
    fn relay_error_display() {
        assert_eq!(
            RelayError::Rejected("HTTP 401".into()).to_string(),
            "relay rejected credential: HTTP 401"
        );
        assert_eq!(RelayError::Closed.to_string(), "relay connection closed");
    }

    #[test]
    fn bridge_error_display() {
        assert_eq!(
            BridgeError::ChannelNotOpen.to_string(),
            "data channel is not open"
        );
        assert_eq!(
            BridgeError::Negotiation("bad sdp".into()).to_string(),
            "negotiation failed: bad sdp"
        );
    }

    #[test]
    fn handoff_error_from_variants() {
        let err: HandoffError = ConfigError::ParseError("bad toml".into()).into();
        assert!(matches!(err, HandoffError::Config(_)));
        assert!(err.to_string().contains("bad toml"));

        let err: HandoffError = RelayError::Connect("refused".into()).into();
        assert!(matches!(err, HandoffError::Relay(_)));

        let err: HandoffError = BridgeError::Stopped.into();
        assert!(matches!(err, HandoffError::Bridge(_)));
    }

    #[test]
    fn bridge_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let err: BridgeError = json_err.into();
        assert!(matches!(err, BridgeError::Encode(_)));
    }
}
