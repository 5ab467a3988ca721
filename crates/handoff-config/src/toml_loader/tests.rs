//! Tests for TOML config loading, creation, and path resolution.

use super::*;
use std::path::Path;

#[test]
fn load_from_nonexistent_returns_parse_error() {
    let result = load_from_path(Path::new("/tmp/nonexistent_handoff_config.toml"));
    let err = result.unwrap_err();
    assert!(matches!(err, handoff_common::ConfigError::ParseError(_)));
    assert!(err.to_string().contains("failed to read"));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[relay]
url = "ws://127.0.0.1:4000/socket/websocket"

[bridge]
reconnect_delay_ms = 500
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.relay.url, "ws://127.0.0.1:4000/socket/websocket");
    assert_eq!(config.bridge.reconnect_delay_ms, 500);
    // Defaults preserved
    assert_eq!(config.bridge.channel_label, "form-bridge");
    assert_eq!(config.relay.heartbeat_interval_secs, 25);
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, handoff_common::ConfigError::ParseError(_)));
}

#[test]
fn load_config_with_invalid_values_is_returned_as_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[bridge]\nreconnect_delay_ms = 5\n").unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.bridge.reconnect_delay_ms, 5);
}

#[test]
fn create_and_load_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("handoff").join("config.toml");

    create_default_config(&path).unwrap();
    assert!(path.exists());

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.bridge.reconnect_delay_ms, 3000);
    assert_eq!(config.ice.servers.len(), 1);
}

#[test]
fn default_template_parses_and_validates() {
    let config: crate::schema::HandoffConfig =
        toml::from_str(&template::default_config_toml()).unwrap();
    assert!(crate::validation::validate(&config).is_ok());
}

#[test]
fn default_config_path_ends_with_handoff() {
    if let Ok(path) = default_config_path() {
        assert!(path.ends_with("handoff/config.toml"));
    }
}

#[test]
fn create_default_config_keeps_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[bridge]\nchannel_label = \"mine\"\n").unwrap();

    create_default_config(&path).unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.bridge.channel_label, "mine");
}

#[test]
fn parse_error_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[bridge\n").unwrap();

    let err = load_from_path(&path).unwrap_err().to_string();
    assert!(err.contains("broken.toml"), "{err}");
}
