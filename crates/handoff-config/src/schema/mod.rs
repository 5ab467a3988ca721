//! Configuration schema types for Handoff.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod bridge;
mod relay;
mod system;

pub use bridge::*;
pub use relay::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Root configuration for Handoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct HandoffConfig {
    pub relay: RelayConfig,
    pub bridge: BridgeConfig,
    pub ice: IceConfig,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_relay_settings() {
        let config = HandoffConfig::default();
        assert!(config.relay.url.starts_with("wss://"));
        assert!(config.relay.api_key.is_none());
        assert_eq!(config.relay.heartbeat_interval_secs, 25);
        assert_eq!(config.relay.connect_timeout_secs, 15);
    }

    #[test]
    fn default_bridge_settings() {
        let config = HandoffConfig::default();
        assert_eq!(config.bridge.reconnect_delay_ms, 3000);
        assert_eq!(config.bridge.negotiation_timeout_ms, 20_000);
        assert_eq!(config.bridge.channel_label, "form-bridge");
    }

    #[test]
    fn default_ice_has_one_stun_server() {
        let config = HandoffConfig::default();
        assert_eq!(config.ice.servers.len(), 1);
        assert!(config.ice.servers[0].urls[0].starts_with("stun:"));
    }

    #[test]
    fn log_level_directives() {
        assert_eq!(LogLevel::Debug.as_directive(), "debug");
        assert_eq!(LogLevel::Warning.as_directive(), "warn");
        assert_eq!(LoggingConfig::default().level, LogLevel::Info);
    }

    #[test]
    fn log_level_deserializes_uppercase() {
        let config: HandoffConfig = toml::from_str("[logging]\nlevel = \"DEBUG\"\n").unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn relay_debug_redacts_api_key() {
        let relay = RelayConfig {
            api_key: Some("super-secret".into()),
            ..Default::default()
        };
        let dbg = format!("{relay:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn config_debug_redacts_turn_credential() {
        let mut config = HandoffConfig::default();
        config.ice.servers.push(IceServerConfig {
            urls: vec!["turn:turn.example.com:3478".into()],
            username: Some("u".into()),
            credential: Some("turn-secret".into()),
        });
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("turn-secret"));
        assert!(dbg.contains("turn.example.com"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn partial_ice_section_fills_defaults() {
        let config: HandoffConfig = toml::from_str(
            r#"
[[ice.servers]]
urls = ["turn:turn.example.com:3478"]
username = "u"
credential = "p"
"#,
        )
        .unwrap();
        assert_eq!(config.ice.servers.len(), 1);
        assert_eq!(config.ice.servers[0].username.as_deref(), Some("u"));
        assert_eq!(config.bridge.channel_label, "form-bridge");
    }
}
