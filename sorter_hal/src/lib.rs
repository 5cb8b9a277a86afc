//! Sorter HAL
//!
//! GPIO provider abstraction with a real Linux-sysfs-backed implementation
//! and an in-memory mock used for tests and for the `--mock-gpio` CLI
//! override.
//!
//! # Module Structure
//!
//! - [`error`] - `HalError`
//! - [`provider`] - the `GpioProvider` trait and pin-polarity helpers
//! - [`real`] - sysfs-backed `RealGpio`
//! - [`mock`] - in-memory `MockGpio`

pub mod error;
pub mod mock;
pub mod provider;
pub mod real;

pub use error::HalError;
pub use mock::MockGpio;
pub use provider::{relay_off, relay_on, Direction, GpioProvider, Level};
pub use real::RealGpio;
