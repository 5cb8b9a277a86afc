//! Common re-exports for consumers of this crate.

pub use crate::canonical::canonical_key;
pub use crate::config::{AppConfig, ConfigError, GpioMode, LaneConfig, TimingConfig};
