//! The one shared handle to the active GPIO provider.

use std::sync::Arc;

use parking_lot::Mutex;
use sorter_hal::GpioProvider;

/// Shared, lockable GPIO provider. A `parking_lot::Mutex` is fine here
/// because every caller holds it only across the handful of synchronous
/// pin operations, never across an `.await`.
pub type SharedGpio = Arc<Mutex<Box<dyn GpioProvider>>>;
