//! Real GPIO provider, backed by the Linux sysfs GPIO interface
//! (`/sys/class/gpio`). Exports pins on first use and leaves them exported
//! until [`RealGpio::cleanup`] unexports them.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;

use sorter_common::config::GpioMode;
use tracing::{debug, info, warn};

use crate::error::HalError;
use crate::provider::{Direction, GpioProvider, Level};

const GPIO_ROOT: &str = "/sys/class/gpio";

/// Sysfs-backed GPIO provider. Pin numbers are interpreted as BCM GPIO
/// numbers regardless of the configured [`GpioMode`] — board-header mode is
/// accepted for interface parity but this provider has no header-map to
/// translate through.
pub struct RealGpio {
    root: PathBuf,
    mode: GpioMode,
    exported: HashSet<u32>,
}

impl RealGpio {
    /// Construct a provider rooted at the standard sysfs GPIO path.
    pub fn new() -> Self {
        Self::with_root(GPIO_ROOT)
    }

    /// Construct a provider rooted at an arbitrary path. Used by tests to
    /// point at a fake sysfs tree under a temp directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mode: GpioMode::Bcm,
            exported: HashSet::new(),
        }
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    fn export(&mut self, pin: u32) -> Result<(), HalError> {
        if self.exported.contains(&pin) || self.pin_dir(pin).is_dir() {
            self.exported.insert(pin);
            return Ok(());
        }
        let export_path = self.root.join("export");
        fs::write(&export_path, pin.to_string()).map_err(|e| HalError::ConfigureFailed {
            pin,
            reason: format!("export failed: {e}"),
        })?;
        self.exported.insert(pin);
        debug!(pin, "exported gpio pin");
        Ok(())
    }

    fn write_attr(&self, pin: u32, attr: &str, value: &str) -> Result<(), HalError> {
        let path = self.pin_dir(pin).join(attr);
        fs::write(&path, value).map_err(|e| HalError::IoError {
            pin,
            source: io_err(e, &path),
        })
    }

    fn read_attr(&self, pin: u32, attr: &str) -> Result<String, HalError> {
        let path = self.pin_dir(pin).join(attr);
        fs::read_to_string(&path)
            .map(|s| s.trim().to_string())
            .map_err(|e| HalError::IoError {
                pin,
                source: io_err(e, &path),
            })
    }

    fn configure(&mut self, pin: u32, direction: Direction) -> Result<(), HalError> {
        self.export(pin)?;
        let value = match direction {
            Direction::Input => "in",
            Direction::Output => "out",
        };
        self.write_attr(pin, "direction", value)
    }
}

impl Default for RealGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioProvider for RealGpio {
    fn set_mode(&mut self, mode: GpioMode) -> Result<(), HalError> {
        self.mode = mode;
        Ok(())
    }

    fn configure_input(&mut self, pin: u32) -> Result<(), HalError> {
        self.configure(pin, Direction::Input)?;
        info!(pin, "configured gpio input");
        Ok(())
    }

    fn configure_output(&mut self, pin: u32, initial: Level) -> Result<(), HalError> {
        self.configure(pin, Direction::Output)?;
        self.write(pin, initial)?;
        info!(pin, "configured gpio output");
        Ok(())
    }

    fn write(&mut self, pin: u32, level: Level) -> Result<(), HalError> {
        if !self.exported.contains(&pin) {
            return Err(HalError::PinNotConfigured(pin));
        }
        let value = if level.is_high() { "1" } else { "0" };
        self.write_attr(pin, "value", value)
    }

    fn read(&mut self, pin: u32) -> Result<Level, HalError> {
        if !self.exported.contains(&pin) {
            return Err(HalError::PinNotConfigured(pin));
        }
        let raw = self.read_attr(pin, "value")?;
        Ok(Level::from_bool(raw == "1"))
    }

    fn cleanup(&mut self) -> Result<(), HalError> {
        let unexport_path = self.root.join("unexport");
        for pin in self.exported.drain() {
            if let Err(e) = fs::write(&unexport_path, pin.to_string()) {
                warn!(pin, error = %e, "failed to unexport gpio pin");
            }
        }
        Ok(())
    }

    fn is_mock(&self) -> bool {
        false
    }

    fn force_level(&mut self, pin: u32, _level: Level) -> Result<(), HalError> {
        Err(HalError::Unsupported(format!(
            "pin {pin} cannot be forced: real gpio provider is active"
        )))
    }
}

fn io_err(e: io::Error, path: &std::path::Path) -> io::Error {
    io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
}

impl Drop for RealGpio {
    fn drop(&mut self) {
        if !self.exported.is_empty() {
            let _ = self.cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("export"), "").unwrap();
        fs::write(dir.path().join("unexport"), "").unwrap();
        dir
    }

    fn precreate_pin_dir(root: &std::path::Path, pin: u32) {
        let dir = root.join(format!("gpio{pin}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("direction"), "").unwrap();
        fs::write(dir.join("value"), "0").unwrap();
    }

    #[test]
    fn configure_output_then_read_back_written_value() {
        let root = fake_root();
        precreate_pin_dir(root.path(), 17);
        let mut gpio = RealGpio::with_root(root.path());
        gpio.configure_output(17, Level::High).unwrap();
        assert_eq!(gpio.read(17).unwrap(), Level::High);
        gpio.write(17, Level::Low).unwrap();
        assert_eq!(gpio.read(17).unwrap(), Level::Low);
    }

    #[test]
    fn unconfigured_pin_rejects_write() {
        let root = fake_root();
        let mut gpio = RealGpio::with_root(root.path());
        assert!(gpio.write(4, Level::High).is_err());
    }

    #[test]
    fn cleanup_unexports_all_pins() {
        let root = fake_root();
        precreate_pin_dir(root.path(), 5);
        let mut gpio = RealGpio::with_root(root.path());
        gpio.configure_input(5).unwrap();
        gpio.cleanup().unwrap();
        assert!(gpio.exported.is_empty());
    }

    #[test]
    fn is_mock_is_false() {
        let gpio = RealGpio::with_root("/tmp/unused");
        assert!(!gpio.is_mock());
    }
}
