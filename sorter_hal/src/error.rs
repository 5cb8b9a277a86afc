use thiserror::Error;

/// Errors raised by a [`crate::GpioProvider`].
#[derive(Debug, Error)]
pub enum HalError {
    /// The pin could not be exported or configured.
    #[error("failed to configure pin {pin}: {reason}")]
    ConfigureFailed { pin: u32, reason: String },

    /// A read or write to an already-configured pin failed.
    #[error("I/O error on pin {pin}: {source}")]
    IoError {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    /// The pin was never configured before use.
    #[error("pin {0} was never configured")]
    PinNotConfigured(u32),

    /// An operation only valid on the mock provider was called on the real
    /// provider (or vice versa).
    #[error("operation not supported by this GPIO provider: {0}")]
    Unsupported(String),
}
