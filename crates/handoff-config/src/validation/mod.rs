//! Full configuration validation.
//!
//! Each section has its own submodule; this orchestrator calls them all
//! and collects errors into a single `ConfigError`.

mod bridge;
mod helpers;
mod relay;


use crate::schema::HandoffConfig;
use handoff_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &HandoffConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    relay::validate_relay(&mut errors, config);
    bridge::validate_bridge(&mut errors, config);
    bridge::validate_ice(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
