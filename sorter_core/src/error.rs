use thiserror::Error;

/// Errors raised by the sort-control core.
///
/// Most of these are caught internally and turned into a maintenance
/// trigger rather than propagated — this enum exists mainly so the few
/// fallible public operations (config application, manual test hooks) have
/// something typed to return.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A GPIO operation failed; the caller should trigger maintenance.
    #[error("gpio error: {0}")]
    Gpio(#[from] sorter_hal::HalError),

    /// `lane_index` did not name a configured lane.
    #[error("no such lane index: {0}")]
    UnknownLane(usize),

    /// The requested action is not permitted while in maintenance mode.
    #[error("rejected: system is in maintenance ({reason})")]
    InMaintenance { reason: String },

    /// A mock-only operation was requested against the real GPIO provider.
    #[error("mock-only operation requested, but the real GPIO provider is active")]
    NotMockProvider,
}
