//! In-memory GPIO provider used by tests and by the `mock_gpio` control-plane
//! endpoint when the process was started with `--mock-gpio`.

use std::collections::HashMap;

use sorter_common::config::GpioMode;
use tracing::debug;

use crate::error::HalError;
use crate::provider::{Direction, GpioProvider, Level};

struct Pin {
    direction: Direction,
    level: Level,
}

/// A GPIO provider backed by a plain in-memory map. [`MockGpio::force_level`]
/// lets test harnesses and the `/queue/mock_gpio` endpoint simulate an edge
/// on an input pin without real hardware.
#[derive(Default)]
pub struct MockGpio {
    pins: HashMap<u32, Pin>,
    mode: Option<GpioMode>,
}

impl MockGpio {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GpioProvider for MockGpio {
    fn set_mode(&mut self, mode: GpioMode) -> Result<(), HalError> {
        self.mode = Some(mode);
        Ok(())
    }

    fn configure_input(&mut self, pin: u32) -> Result<(), HalError> {
        self.pins.insert(
            pin,
            Pin {
                direction: Direction::Input,
                level: Level::High,
            },
        );
        Ok(())
    }

    fn configure_output(&mut self, pin: u32, initial: Level) -> Result<(), HalError> {
        self.pins.insert(
            pin,
            Pin {
                direction: Direction::Output,
                level: initial,
            },
        );
        Ok(())
    }

    fn write(&mut self, pin: u32, level: Level) -> Result<(), HalError> {
        match self.pins.get_mut(&pin) {
            Some(p) if p.direction == Direction::Output => {
                p.level = level;
                Ok(())
            }
            Some(_) => Err(HalError::Unsupported(format!(
                "pin {pin} is configured as input, cannot write"
            ))),
            None => Err(HalError::PinNotConfigured(pin)),
        }
    }

    fn read(&mut self, pin: u32) -> Result<Level, HalError> {
        self.pins
            .get(&pin)
            .map(|p| p.level)
            .ok_or(HalError::PinNotConfigured(pin))
    }

    fn cleanup(&mut self) -> Result<(), HalError> {
        self.pins.clear();
        Ok(())
    }

    fn is_mock(&self) -> bool {
        true
    }

    /// Force an input pin to a given level, as if an external edge occurred.
    /// Valid only for pins previously configured as input; writing an output
    /// pin through this path would contradict who owns that pin's state.
    fn force_level(&mut self, pin: u32, level: Level) -> Result<(), HalError> {
        match self.pins.get_mut(&pin) {
            Some(p) if p.direction == Direction::Input => {
                p.level = level;
                debug!(pin, ?level, "mock gpio forced");
                Ok(())
            }
            Some(_) => Err(HalError::Unsupported(format!(
                "pin {pin} is configured as output, cannot force"
            ))),
            None => Err(HalError::PinNotConfigured(pin)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_level_updates_configured_input() {
        let mut gpio = MockGpio::new();
        gpio.configure_input(6).unwrap();
        gpio.force_level(6, Level::Low).unwrap();
        assert_eq!(gpio.read(6).unwrap(), Level::Low);
    }

    #[test]
    fn force_level_rejects_output_pin() {
        let mut gpio = MockGpio::new();
        gpio.configure_output(6, Level::High).unwrap();
        assert!(gpio.force_level(6, Level::Low).is_err());
    }

    #[test]
    fn write_rejects_input_pin() {
        let mut gpio = MockGpio::new();
        gpio.configure_input(2).unwrap();
        assert!(gpio.write(2, Level::Low).is_err());
    }

    #[test]
    fn unconfigured_read_is_error() {
        let mut gpio = MockGpio::new();
        assert!(gpio.read(99).is_err());
    }

    #[test]
    fn is_mock_is_true() {
        assert!(MockGpio::new().is_mock());
    }
}
