//! Configuration management with hierarchical layering.
//!
//! # Architecture
//!
//! ```text
//! Priority (highest to lowest):
//!
//! ┌────────────────────────────────────────────┐
//! │  1. Environment Variables (COURIER_*)      │  Runtime override
//! ├────────────────────────────────────────────┤
//! │  2. Project Config (.courier/config.toml)  │  Project-specific
//! ├────────────────────────────────────────────┤
//! │  3. Global Config (~/.courier/config.toml) │  User defaults
//! ├────────────────────────────────────────────┤
//! │  4. Default Values (compile-time)          │  Fallback
//! └────────────────────────────────────────────┘
//! ```
//!
//! Each file is read as a [`ConfigLayer`] whose keys are all optional. A
//! key present in a higher layer wins, even when it restates the default.
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `COURIER_DEBUG` | `debug` | bool |
//! | `COURIER_INSTANCE_ID` | `postman.instance_id` | String |
//! | `COURIER_MAX_RECONNECTS` | `postman.reconnect.max_attempts` | u32 |
//! | `COURIER_CANCEL_GRACE_MS` | `local.cancel_grace_ms` | u64 |
//! | `COURIER_CALL_TIMEOUT_MS` | `call.timeout_ms` | u64 |
//!
//! # Example Configuration
//!
//! ```toml
//! # ~/.courier/config.toml
//! debug = false
//!
//! [postman]
//! instance_id = "worker-1"
//!
//! [postman.reconnect]
//! initial_backoff_ms = 200
//! max_backoff_ms = 10000
//! max_attempts = 8
//!
//! [local]
//! bound_timeout_ms = 5000
//! cancel_grace_ms = 2000
//!
//! [call]
//! timeout_ms = 60000
//! ```

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::{
    CallConfig, CallLayer, ConfigLayer, CourierConfig, LocalConfig, LocalLayer, PostmanConfig,
    PostmanLayer, ReconnectConfig, ReconnectLayer,
};

/// Default global config directory.
pub fn default_config_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".courier")
}

/// Default global config file path.
pub fn default_config_path() -> std::path::PathBuf {
    default_config_dir().join("config.toml")
}

/// Project config directory name.
pub const PROJECT_CONFIG_DIR: &str = ".courier";

/// Project config file name.
pub const PROJECT_CONFIG_FILE: &str = "config.toml";
