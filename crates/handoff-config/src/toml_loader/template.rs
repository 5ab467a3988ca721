//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Handoff Configuration
# Only override what you want to change -- missing fields use defaults.

[relay]
# url = "wss://relay.handoff.dev/socket/websocket"
# api_key = "pk_live_..."
# heartbeat_interval_secs = 25   # 5-120
# connect_timeout_secs = 15      # 1-60

[bridge]
# reconnect_delay_ms = 3000      # 100-60000
# negotiation_timeout_ms = 20000 # 0 disables, otherwise 1000-300000
# channel_label = "form-bridge"

# [[ice.servers]]
# urls = ["stun:stun.l.google.com:19302"]
# username = "turn-user"
# credential = "turn-secret"

[logging]
# level = "INFO"                 # DEBUG, INFO, WARNING, ERROR
"##
    .to_string()
}
