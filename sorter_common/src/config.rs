//! Persisted configuration types: lanes and timing.
//!
//! These are the two halves of `config.json` (see `sorter_api::persistence`
//! for the atomic load/save). Every struct here uses
//! `#[serde(deny_unknown_fields)]` so that a typo or a stale field in a
//! posted config body is rejected loudly instead of silently ignored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading, parsing, or validating configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The config file does not exist at the given path.
    #[error("configuration file not found")]
    FileNotFound,

    /// The file's contents are not valid JSON for the expected shape, or
    /// contain an unrecognized field.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// The parsed configuration failed a semantic validation rule.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// GPIO pin-numbering scheme. Changing this requires a full process restart
/// since the real GPIO provider's pin addressing is fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GpioMode {
    Bcm,
    Board,
}

impl Default for GpioMode {
    fn default() -> Self {
        GpioMode::Bcm
    }
}

/// One lane's persisted configuration.
///
/// A lane with both `push_pin` and `pull_pin` set is a *sorting* lane; with
/// both absent it is a *pass-through* lane. Exactly one of the two being set
/// is invalid and rejected by [`LaneConfig::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaneConfig {
    /// Short, stable, unique identifier. Matched against recognized codes
    /// via the canonical-key function.
    pub id: String,
    /// Human-readable label, shown in logs and the sort log.
    pub name: String,
    /// Lane presence-sensor pin.
    pub sensor_pin: u32,
    #[serde(default)]
    pub push_pin: Option<u32>,
    #[serde(default)]
    pub pull_pin: Option<u32>,
}

impl LaneConfig {
    /// A sorting lane has both pistons wired; a pass-through lane has
    /// neither. Anything else is a configuration error.
    pub fn is_sorting(&self) -> bool {
        self.push_pin.is_some() && self.pull_pin.is_some()
    }

    pub fn is_pass_through(&self) -> bool {
        self.push_pin.is_none() && self.pull_pin.is_none()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::ValidationError(
                "lane id must not be empty".into(),
            ));
        }
        if !self.is_sorting() && !self.is_pass_through() {
            return Err(ConfigError::ValidationError(format!(
                "lane '{}' has only one of push_pin/pull_pin set (must have both or neither)",
                self.id
            )));
        }
        Ok(())
    }
}

fn default_cycle_delay() -> f64 {
    0.3
}
fn default_settle_delay() -> f64 {
    0.2
}
fn default_sensor_debounce() -> f64 {
    0.05
}
fn default_push_delay() -> f64 {
    0.0
}
fn default_queue_head_timeout() -> f64 {
    15.0
}
fn default_pending_trigger_timeout() -> f64 {
    5.0
}

/// Timing parameters shared across all lanes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimingConfig {
    /// Push-relay-on duration, seconds.
    #[serde(default = "default_cycle_delay")]
    pub cycle_delay: f64,
    /// Pause between piston phases, seconds.
    #[serde(default = "default_settle_delay")]
    pub settle_delay: f64,
    /// Minimum seconds between two accepted edges on the same input.
    #[serde(default = "default_sensor_debounce")]
    pub sensor_debounce: f64,
    /// Grace period before a sort cycle begins, seconds.
    #[serde(default = "default_push_delay")]
    pub push_delay: f64,
    /// Max age of the QR-queue head before it is dropped, seconds.
    #[serde(default = "default_queue_head_timeout")]
    pub queue_head_timeout: f64,
    /// GPIO pin-numbering scheme. Changing this requires a restart.
    #[serde(default)]
    pub gpio_mode: GpioMode,
    /// Retained for forward-compatibility with a Sensor-First variant of
    /// the sensor monitor (see design notes). Accepted and parsed, but
    /// unused by the Gated-FIFO core.
    #[serde(default = "default_pending_trigger_timeout")]
    pub pending_trigger_timeout: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cycle_delay: default_cycle_delay(),
            settle_delay: default_settle_delay(),
            sensor_debounce: default_sensor_debounce(),
            push_delay: default_push_delay(),
            queue_head_timeout: default_queue_head_timeout(),
            gpio_mode: GpioMode::default(),
            pending_trigger_timeout: default_pending_trigger_timeout(),
        }
    }
}

impl TimingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("cycle_delay", self.cycle_delay),
            ("settle_delay", self.settle_delay),
            ("sensor_debounce", self.sensor_debounce),
            ("push_delay", self.push_delay),
            ("queue_head_timeout", self.queue_head_timeout),
        ] {
            if value < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "timing.{name} must be >= 0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// The full persisted configuration: exactly `{timing_config, lanes_config}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub timing_config: TimingConfig,
    pub lanes_config: Vec<LaneConfig>,
}

impl AppConfig {
    /// Validate internal consistency: each lane individually, plus
    /// uniqueness of `id` across all lanes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timing_config.validate()?;
        for lane in &self.lanes_config {
            lane.validate()?;
        }
        let mut seen = std::collections::HashSet::new();
        for lane in &self.lanes_config {
            if !seen.insert(&lane.id) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate lane id: {}",
                    lane.id
                )));
            }
        }
        Ok(())
    }

    /// A minimal, always-valid configuration used when the config file is
    /// unreadable and the system falls back to defaults (see error-handling
    /// policy for config-file failures).
    pub fn fallback_default() -> Self {
        Self {
            timing_config: TimingConfig::default(),
            lanes_config: Vec::new(),
        }
    }
}

/// Environment/CLI-sourced settings. Never part of the JSON-over-HTTP config
/// surface and never persisted to `config.json` — a process restart is the
/// only way to change any of these.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub auth_enabled: bool,
    pub admin_user: String,
    /// Hex-encoded SHA-256 of the admin token, compared at request time.
    pub admin_password_hash: String,
    pub camera_index: i32,
    pub bind_addr: std::net::SocketAddr,
    /// The entry/gate sensor pin. Fixed at the process level, like
    /// `camera_index` — not part of `LaneConfig`.
    pub entry_sensor_pin: u32,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            auth_enabled: false,
            admin_user: "admin".to_string(),
            admin_password_hash: String::new(),
            camera_index: 0,
            bind_addr: ([0, 0, 0, 0], 3000).into(),
            entry_sensor_pin: 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lane(id: &str, push: Option<u32>, pull: Option<u32>) -> LaneConfig {
        LaneConfig {
            id: id.to_string(),
            name: id.to_string(),
            sensor_pin: 1,
            push_pin: push,
            pull_pin: pull,
        }
    }

    #[test]
    fn sorting_lane_requires_both_pistons() {
        assert!(lane("A", Some(1), Some(2)).is_sorting());
        assert!(lane("A", None, None).is_pass_through());
        assert!(lane("A", Some(1), None).validate().is_err());
        assert!(lane("A", None, Some(2)).validate().is_err());
    }

    #[test]
    fn duplicate_lane_ids_rejected() {
        let cfg = AppConfig {
            timing_config: TimingConfig::default(),
            lanes_config: vec![lane("A", Some(1), Some(2)), lane("A", None, None)],
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn negative_timing_rejected() {
        let mut timing = TimingConfig::default();
        timing.cycle_delay = -1.0;
        assert!(timing.validate().is_err());
    }

    #[test]
    fn empty_lane_list_is_valid() {
        let cfg = AppConfig {
            timing_config: TimingConfig::default(),
            lanes_config: vec![],
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let json = r#"{"id":"A","name":"A","sensor_pin":1,"push_pin":null,"pull_pin":null,"bogus":true}"#;
        let result: Result<LaneConfig, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
