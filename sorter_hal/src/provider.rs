//! The `GpioProvider` trait: the one seam between sort-control logic and
//! physical (or simulated) pins.
//!
//! All relays wired to this controller are active-low: energizing the coil
//! happens by driving the pin LOW, and the resting/off state is HIGH. The
//! [`relay_on`] / [`relay_off`] helpers encode that polarity once so callers
//! never write `Level::Low`/`Level::High` directly against relay pins.

use sorter_common::config::GpioMode;

use crate::error::HalError;

/// Logical pin level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn from_bool(active: bool) -> Self {
        if active {
            Level::High
        } else {
            Level::Low
        }
    }

    pub fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

/// Pin direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// A GPIO backend: either the real sysfs-backed provider or the in-memory
/// mock used by tests and the `mock_gpio` control-plane endpoint.
///
/// Implementors must be safe to share behind a single lock — sort-core holds
/// no lock of its own over GPIO calls, relying on the provider to serialize
/// internally if needed.
pub trait GpioProvider: Send + Sync {
    /// Set the pin-numbering scheme. Accepted for interface parity with the
    /// original control software; the sysfs provider addresses pins by BCM
    /// number regardless, so this is a no-op there.
    fn set_mode(&mut self, mode: GpioMode) -> Result<(), HalError>;

    /// Export and configure a pin as input.
    fn configure_input(&mut self, pin: u32) -> Result<(), HalError>;

    /// Export and configure a pin as output, with the given initial level.
    fn configure_output(&mut self, pin: u32, initial: Level) -> Result<(), HalError>;

    /// Write a level to a configured output pin.
    fn write(&mut self, pin: u32, level: Level) -> Result<(), HalError>;

    /// Read the current level of a configured input (or output) pin.
    fn read(&mut self, pin: u32) -> Result<Level, HalError>;

    /// Release all exported pins. Called once, last, during shutdown.
    fn cleanup(&mut self) -> Result<(), HalError>;

    /// True for the mock provider. The control plane uses this to reject
    /// `mock_gpio` calls when the real provider is active.
    fn is_mock(&self) -> bool;

    /// Force an input pin to a level, simulating an external edge. Only the
    /// mock provider supports this; the real provider returns
    /// [`HalError::Unsupported`].
    fn force_level(&mut self, pin: u32, level: Level) -> Result<(), HalError>;
}

/// Energize an active-low relay: drive the pin LOW.
pub fn relay_on(gpio: &mut dyn GpioProvider, pin: u32) -> Result<(), HalError> {
    gpio.write(pin, Level::Low)
}

/// De-energize an active-low relay: drive the pin HIGH.
pub fn relay_off(gpio: &mut dyn GpioProvider, pin: u32) -> Result<(), HalError> {
    gpio.write(pin, Level::High)
}
