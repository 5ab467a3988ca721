//! Reading a config file, or falling back to the seeded default.

use std::path::Path;

use handoff_common::ConfigError;
use tracing::{debug, info, warn};

use super::paths::{create_default_config, default_config_path};
use crate::schema::HandoffConfig;
use crate::validation;

/// Parse `path`. Missing keys take their defaults. A config that parses but
/// fails validation is still returned; the problems are logged.
pub fn load_from_path(path: &Path) -> Result<HandoffConfig, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {e}", path.display())))?;

    let config: HandoffConfig = toml::from_str(&text)
        .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;

    if let Err(e) = validation::validate(&config) {
        warn!(path = %path.display(), error = %e, "Config has out-of-range values");
    }

    debug!(path = %path.display(), "Config loaded");
    Ok(config)
}

/// Load `<config_dir>/handoff/config.toml`, seeding it from the template
/// when it does not exist yet.
pub fn load_default() -> Result<HandoffConfig, ConfigError> {
    let path = default_config_path()?;
    if !path.exists() {
        info!(path = %path.display(), "No config file, using defaults");
        create_default_config(&path)?;
        return Ok(HandoffConfig::default());
    }
    load_from_path(&path)
}
