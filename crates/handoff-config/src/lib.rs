//! Handoff configuration system.
//!
//! TOML-based configuration with full validation. All config sections use
//! sensible defaults so partial configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use handoff_config::load_config;
//!
//! let config = load_config(None).expect("failed to load config");
//! println!("pairing on channel {}", config.bridge.channel_label);
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    BridgeConfig, HandoffConfig, IceConfig, IceServerConfig, LogLevel, LoggingConfig,
    RelayConfig,
};

use std::path::Path;

use handoff_common::ConfigError;

/// Load config from an explicit path, or from the platform default path
/// (creating it on first run) when `path` is `None`.
pub fn load_config(path: Option<&Path>) -> Result<HandoffConfig, ConfigError> {
    match path {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            toml_loader::load_from_path(path)
        }
        None => toml_loader::load_default(),
    }
}
