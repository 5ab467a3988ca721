//! Validation for the `[relay]` section.

use crate::schema::HandoffConfig;

use super::helpers::{validate_non_empty, validate_range};

pub(crate) fn validate_relay(errors: &mut Vec<String>, config: &HandoffConfig) {
    let relay = &config.relay;
    validate_non_empty(errors, "relay.url", &relay.url);
    if !relay.url.trim().is_empty()
        && !(relay.url.starts_with("ws://") || relay.url.starts_with("wss://"))
    {
        errors.push(format!(
            "relay.url = {} must use the ws:// or wss:// scheme",
            relay.url
        ));
    }
    validate_range(
        errors,
        "relay.heartbeat_interval_secs",
        relay.heartbeat_interval_secs,
        5,
        120,
    );
    validate_range(
        errors,
        "relay.connect_timeout_secs",
        relay.connect_timeout_secs,
        1,
        60,
    );
}
