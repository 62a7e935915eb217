//! Configuration types.
//!
//! All types implement [`Default`] for compile-time fallback values.

use crate::postman::ReconnectPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure.
///
/// This is the unified configuration after merging all layers.
///
/// # Example
///
/// ```
/// use courier_runtime::config::CourierConfig;
///
/// let config = CourierConfig::default();
/// assert_eq!(config.postman.instance_id, "default");
/// assert_eq!(config.postman.reconnect.max_attempts, 8);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CourierConfig {
    /// Enable debug logging.
    pub debug: bool,

    pub postman: PostmanConfig,

    pub local: LocalConfig,

    pub call: CallConfig,
}

impl CourierConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes to TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deserializes from TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Applies one config layer on top of this one.
    ///
    /// Every key present in `layer` wins, including keys that restate a
    /// default; absent keys leave the current value untouched.
    pub fn apply(&mut self, layer: &ConfigLayer) {
        if let Some(debug) = layer.debug {
            self.debug = debug;
        }
        self.postman.apply(&layer.postman);
        self.local.apply(&layer.local);
        self.call.apply(&layer.call);
    }
}

/// Remote assigner settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PostmanConfig {
    /// Instance id the subscription is opened for.
    pub instance_id: String,

    pub reconnect: ReconnectConfig,
}

impl Default for PostmanConfig {
    fn default() -> Self {
        Self {
            instance_id: "default".into(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl PostmanConfig {
    fn apply(&mut self, layer: &PostmanLayer) {
        if let Some(instance_id) = &layer.instance_id {
            self.instance_id.clone_from(instance_id);
        }
        self.reconnect.apply(&layer.reconnect);
    }
}

/// Subscription reconnect backoff.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Consecutive failed attempts before pending calls are failed.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 200,
            max_backoff_ms: 10_000,
            max_attempts: 8,
        }
    }
}

impl ReconnectConfig {
    fn apply(&mut self, layer: &ReconnectLayer) {
        set(&mut self.initial_backoff_ms, layer.initial_backoff_ms);
        set(&mut self.max_backoff_ms, layer.max_backoff_ms);
        set(&mut self.max_attempts, layer.max_attempts);
    }

    #[must_use]
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            max_attempts: self.max_attempts,
        }
    }
}

/// Local executor settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocalConfig {
    /// How long `enter` waits for the actor's `BOUND` event.
    pub bound_timeout_ms: u64,
    /// How long a cancel waits for the actor's `CANCELLED` event.
    pub cancel_grace_ms: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            bound_timeout_ms: 5_000,
            cancel_grace_ms: 2_000,
        }
    }
}

impl LocalConfig {
    fn apply(&mut self, layer: &LocalLayer) {
        set(&mut self.bound_timeout_ms, layer.bound_timeout_ms);
        set(&mut self.cancel_grace_ms, layer.cancel_grace_ms);
    }

    #[must_use]
    pub fn bound_timeout(&self) -> Duration {
        Duration::from_millis(self.bound_timeout_ms)
    }

    #[must_use]
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

/// Caller defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CallConfig {
    /// Default per-call timeout. Unset means calls wait indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl CallConfig {
    fn apply(&mut self, layer: &CallLayer) {
        if layer.timeout_ms.is_some() {
            self.timeout_ms = layer.timeout_ms;
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

fn set<T: Copy>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

/// One configuration source (a file) before merging.
///
/// Mirrors [`CourierConfig`] with every key optional, so a layer can tell
/// "not set here" apart from "set to the default value".
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConfigLayer {
    pub debug: Option<bool>,
    pub postman: PostmanLayer,
    pub local: LocalLayer,
    pub call: CallLayer,
}

impl ConfigLayer {
    /// Parses one layer from TOML.
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid TOML for the config schema.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PostmanLayer {
    pub instance_id: Option<String>,
    pub reconnect: ReconnectLayer,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReconnectLayer {
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocalLayer {
    pub bound_timeout_ms: Option<u64>,
    pub cancel_grace_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CallLayer {
    pub timeout_ms: Option<u64>,
}
