//! Validation for the `[bridge]` and `[ice]` sections.

use crate::schema::HandoffConfig;

use super::helpers::{validate_non_empty, validate_range};

pub(crate) fn validate_bridge(errors: &mut Vec<String>, config: &HandoffConfig) {
    let bridge = &config.bridge;
    validate_range(
        errors,
        "bridge.reconnect_delay_ms",
        bridge.reconnect_delay_ms,
        100,
        60_000,
    );
    // 0 disables the negotiation timeout.
    if bridge.negotiation_timeout_ms != 0 {
        validate_range(
            errors,
            "bridge.negotiation_timeout_ms",
            bridge.negotiation_timeout_ms,
            1000,
            300_000,
        );
    }
    validate_non_empty(errors, "bridge.channel_label", &bridge.channel_label);
}

pub(crate) fn validate_ice(errors: &mut Vec<String>, config: &HandoffConfig) {
    for (i, server) in config.ice.servers.iter().enumerate() {
        if server.urls.is_empty() {
            errors.push(format!("ice.servers[{i}].urls must not be empty"));
        }
        for url in &server.urls {
            if !(url.starts_with("stun:") || url.starts_with("turn:") || url.starts_with("turns:"))
            {
                errors.push(format!(
                    "ice.servers[{i}] url {url} must start with stun:, turn: or turns:"
                ));
            }
        }
        if server.username.is_some() != server.credential.is_some() {
            errors.push(format!(
                "ice.servers[{i}] username and credential must be set together"
            ));
        }
    }
}
