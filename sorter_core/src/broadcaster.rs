//! The state broadcaster: periodically snapshots the system and pushes a
//! diff-gated update to every `/api/events` subscriber.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::maintenance::MaintenanceController;
use crate::state_store::StateStore;
use crate::types::Event;

const BROADCAST_INTERVAL: Duration = Duration::from_millis(500);

pub struct StateBroadcaster {
    state: Arc<StateStore>,
    maintenance: Arc<MaintenanceController>,
    events: broadcast::Sender<Event>,
    last_sent: Option<Vec<u8>>,
}

impl StateBroadcaster {
    pub fn new(
        state: Arc<StateStore>,
        maintenance: Arc<MaintenanceController>,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            state,
            maintenance,
            events,
            last_sent: None,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(BROADCAST_INTERVAL) => {}
            }
            self.tick();
        }
    }

    fn tick(&mut self) {
        let (active, reason) = self.maintenance.snapshot();
        let snapshot = self.state.snapshot(active, reason);

        let encoded = match serde_json::to_vec(&snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize state snapshot");
                return;
            }
        };

        if self.last_sent.as_deref() == Some(encoded.as_slice()) {
            trace!("state unchanged, skipping broadcast");
            return;
        }

        let _ = self.events.send(Event::StateUpdate { state: snapshot });
        self.last_sent = Some(encoded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorter_common::config::TimingConfig;

    fn setup() -> (StateBroadcaster, broadcast::Receiver<Event>) {
        let state = Arc::new(StateStore::new(TimingConfig::default(), &[]));
        let maintenance = Arc::new(MaintenanceController::new());
        let (tx, rx) = broadcast::channel(16);
        (StateBroadcaster::new(state, maintenance, tx), rx)
    }

    #[test]
    fn first_tick_always_broadcasts() {
        let (mut b, mut rx) = setup();
        b.tick();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn unchanged_state_is_not_rebroadcast() {
        let (mut b, mut rx) = setup();
        b.tick();
        rx.try_recv().unwrap();
        b.tick();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn changed_state_triggers_new_broadcast() {
        let (mut b, mut rx) = setup();
        b.tick();
        rx.try_recv().unwrap();
        b.maintenance.trigger("test".to_string());
        b.tick();
        assert!(rx.try_recv().is_ok());
    }
}
