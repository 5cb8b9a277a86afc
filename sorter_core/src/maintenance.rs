//! The maintenance latch: a single global "stop the world" flag.
//!
//! `trigger` is idempotent — the first reason wins and a storm of follow-up
//! triggers (e.g. every iteration of a loop that just tripped maintenance)
//! never overwrites it. Only `reset` clears it, and only a human calls
//! `reset`.

use parking_lot::Mutex;
use tracing::{error, info};

#[derive(Debug, Clone, Default)]
struct MaintenanceInner {
    active: bool,
    reason: Option<String>,
}

/// Thread-safe maintenance latch, one per process.
#[derive(Debug, Default)]
pub struct MaintenanceController {
    inner: Mutex<MaintenanceInner>,
}

impl MaintenanceController {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if maintenance mode is currently active.
    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    /// Current reason, if active.
    pub fn reason(&self) -> Option<String> {
        self.inner.lock().reason.clone()
    }

    /// Snapshot of `(active, reason)`.
    pub fn snapshot(&self) -> (bool, Option<String>) {
        let inner = self.inner.lock();
        (inner.active, inner.reason.clone())
    }

    /// Enter maintenance mode with `reason`. A no-op if already active —
    /// the original reason is preserved.
    pub fn trigger(&self, reason: impl Into<String>) {
        let mut inner = self.inner.lock();
        if inner.active {
            return;
        }
        let reason = reason.into();
        error!(reason = %reason, "entering maintenance mode");
        inner.active = true;
        inner.reason = Some(reason);
    }

    /// Clear maintenance mode. Called only from an explicit operator action.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        if !inner.active {
            return;
        }
        info!("maintenance mode reset");
        inner.active = false;
        inner.reason = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_inactive() {
        let m = MaintenanceController::new();
        assert!(!m.is_active());
        assert_eq!(m.reason(), None);
    }

    #[test]
    fn trigger_is_idempotent_keeping_first_reason() {
        let m = MaintenanceController::new();
        m.trigger("sensor read failure");
        m.trigger("a different reason");
        assert!(m.is_active());
        assert_eq!(m.reason().as_deref(), Some("sensor read failure"));
    }

    #[test]
    fn reset_clears_state() {
        let m = MaintenanceController::new();
        m.trigger("gpio conflict");
        m.reset();
        assert!(!m.is_active());
        assert_eq!(m.reason(), None);
    }

    #[test]
    fn reset_when_inactive_is_noop() {
        let m = MaintenanceController::new();
        m.reset();
        assert!(!m.is_active());
    }
}
