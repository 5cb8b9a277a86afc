//! `SorterHandle`: the one object the control plane and process wiring hold.
//!
//! Bundles every shared piece of state plus the control-plane hooks listed
//! for the HTTP/WebSocket layer — reset maintenance, clear queues, reset a
//! counter, pulse a relay manually, sweep all relays, force a mock sensor
//! level, and toggle auto-test mode (which the sensor monitor and ingester
//! both check before acting on real input).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sorter_common::config::{AppConfig, LaneConfig};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::executor::{self, RelayKind, SortExecutorPool};
use crate::gpio_shared::SharedGpio;
use crate::maintenance::MaintenanceController;
use crate::qr_queue::QrQueue;
use crate::state_store::StateStore;
use crate::token_queue::TokenQueue;
use crate::types::{DetectorFrame, Event};

/// Everything the control plane, sensor monitor, ingester, and executor pool
/// all need a shared handle to.
pub struct SorterHandle {
    pub state: Arc<StateStore>,
    pub qr_queue: Arc<QrQueue>,
    pub token_queue: Arc<TokenQueue>,
    pub maintenance: Arc<MaintenanceController>,
    pub gpio: SharedGpio,
    pub executor: Arc<SortExecutorPool>,
    pub events: broadcast::Sender<Event>,
    pub cancel: CancellationToken,
    pub auto_test: Arc<AtomicBool>,
    frame_tx: mpsc::Sender<DetectorFrame>,
}

impl SorterHandle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<StateStore>,
        qr_queue: Arc<QrQueue>,
        token_queue: Arc<TokenQueue>,
        maintenance: Arc<MaintenanceController>,
        gpio: SharedGpio,
        executor: Arc<SortExecutorPool>,
        events: broadcast::Sender<Event>,
        cancel: CancellationToken,
        frame_tx: mpsc::Sender<DetectorFrame>,
    ) -> Self {
        Self {
            state,
            qr_queue,
            token_queue,
            maintenance,
            gpio,
            executor,
            events,
            cancel,
            auto_test: Arc::new(AtomicBool::new(false)),
            frame_tx,
        }
    }

    /// Feed a recognized frame to the ingester, as the camera loop (or a
    /// scripted test detector) does.
    pub async fn submit_frame(&self, frame: DetectorFrame) {
        let _ = self.frame_tx.send(frame).await;
    }

    pub fn reset_maintenance(&self) {
        self.maintenance.reset();
        if let Err(e) = executor::reset_all_relays(&self.gpio, &self.state, &self.state.lanes()) {
            self.maintenance
                .trigger(format!("failed to restore safe baseline on reset: {e}"));
        }
        let _ = self.events.send(Event::MaintenanceUpdate {
            enabled: self.maintenance.is_active(),
            reason: self.maintenance.reason(),
        });
    }

    pub fn clear_all_queues(&self) {
        self.qr_queue.clear();
        self.token_queue.clear();
        self.state.set_token_count(0);
    }

    pub fn reset_counter(&self, lane_index: Option<usize>) -> Result<(), CoreError> {
        self.guard_not_in_maintenance()?;
        match lane_index {
            Some(index) => {
                if index >= self.state.lane_count() {
                    return Err(CoreError::UnknownLane(index));
                }
                self.state.reset_lane_counter(index);
            }
            None => self.state.reset_all_counters(),
        }
        Ok(())
    }

    pub async fn manual_relay_test(&self, lane_index: usize, relay: RelayKind) -> Result<(), CoreError> {
        self.guard_not_in_maintenance()?;
        let lane = self
            .state
            .lane(lane_index)
            .ok_or(CoreError::UnknownLane(lane_index))?;
        let timing = self.state.timing();
        executor::manual_relay_test(
            &self.gpio,
            &self.state,
            lane_index,
            &lane,
            relay,
            timing.cycle_delay,
            &self.cancel,
        )
        .await?;
        Ok(())
    }

    pub async fn sweep_all_relays(&self) -> Result<(), CoreError> {
        self.guard_not_in_maintenance()?;
        let lanes = self.state.lanes();
        let timing = self.state.timing();
        executor::sweep_all_relays(
            &self.gpio,
            &self.state,
            &lanes,
            timing.settle_delay,
            timing.cycle_delay,
            &self.cancel,
        )
        .await?;
        let _ = self.events.send(Event::TestSequenceComplete);
        Ok(())
    }

    /// Force an input pin to a level, only against the mock GPIO provider.
    pub fn set_mock_sensor(&self, pin: u32, active: bool) -> Result<(), CoreError> {
        let mut gpio = self.gpio.lock();
        if !gpio.is_mock() {
            return Err(CoreError::NotMockProvider);
        }
        // `active` is the sensor's logical state; the wire level is
        // inverted (idle = high, tripped = low).
        let level = sorter_hal::Level::from_bool(!active);
        gpio.force_level(pin, level).map_err(CoreError::from)
    }

    pub fn toggle_auto_test(&self, enabled: bool) -> Result<(), CoreError> {
        self.guard_not_in_maintenance()?;
        self.auto_test.store(enabled, Ordering::Relaxed);
        Ok(())
    }

    pub fn apply_config(&self, config: &AppConfig) {
        self.state.set_timing(config.timing_config.clone());
        self.state.replace_lanes(&config.lanes_config);
    }

    pub fn lane_configs(&self) -> Vec<LaneConfig> {
        self.state.lane_configs()
    }

    fn guard_not_in_maintenance(&self) -> Result<(), CoreError> {
        let (active, reason) = self.maintenance.snapshot();
        if active {
            return Err(CoreError::InMaintenance {
                reason: reason.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorter_common::config::TimingConfig;
    use sorter_hal::MockGpio;

    fn lane(id: &str) -> LaneConfig {
        LaneConfig {
            id: id.to_string(),
            name: id.to_string(),
            sensor_pin: 6,
            push_pin: Some(17),
            pull_pin: Some(27),
        }
    }

    fn handle() -> SorterHandle {
        let lanes = [lane("A")];
        let state = Arc::new(StateStore::new(TimingConfig::default(), &lanes));
        let qr_queue = Arc::new(QrQueue::new(Arc::clone(&state)));
        let token_queue = Arc::new(TokenQueue::new());
        let maintenance = Arc::new(MaintenanceController::new());
        let mut mock = MockGpio::new();
        mock.configure_input(6).unwrap();
        mock.configure_output(17, sorter_hal::Level::High).unwrap();
        mock.configure_output(27, sorter_hal::Level::High).unwrap();
        let gpio: SharedGpio = Arc::new(parking_lot::Mutex::new(Box::new(mock)));
        let (events, _rx) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        let executor = SortExecutorPool::spawn(
            2,
            Arc::clone(&state),
            Arc::clone(&gpio),
            Arc::clone(&maintenance),
            events.clone(),
            cancel.clone(),
        );
        let (frame_tx, _rx) = mpsc::channel(16);
        SorterHandle::new(state, qr_queue, token_queue, maintenance, gpio, executor, events, cancel, frame_tx)
    }

    #[test]
    fn reset_counter_rejects_unknown_lane() {
        let h = handle();
        assert!(matches!(h.reset_counter(Some(99)), Err(CoreError::UnknownLane(99))));
    }

    #[test]
    fn reset_counter_all_zeroes_every_lane() {
        let h = handle();
        h.state.update_lane_runtime(0, |rt| rt.count = 5);
        h.reset_counter(None).unwrap();
        assert_eq!(h.state.lane(0).unwrap().runtime.count, 0);
    }

    #[test]
    fn set_mock_sensor_rejects_real_provider() {
        use sorter_hal::RealGpio;
        let gpio: SharedGpio = Arc::new(parking_lot::Mutex::new(Box::new(RealGpio::new())));
        let mut h = handle();
        h.gpio = gpio;
        assert!(matches!(h.set_mock_sensor(6, true), Err(CoreError::NotMockProvider)));
    }

    #[test]
    fn set_mock_sensor_drives_active_low() {
        let h = handle();
        h.set_mock_sensor(6, true).unwrap();
        assert_eq!(h.gpio.lock().read(6).unwrap(), sorter_hal::Level::Low);
        h.set_mock_sensor(6, false).unwrap();
        assert_eq!(h.gpio.lock().read(6).unwrap(), sorter_hal::Level::High);
    }

    #[test]
    fn clear_all_queues_empties_both() {
        let h = handle();
        h.token_queue.add();
        h.clear_all_queues();
        assert!(h.token_queue.is_empty());
        assert_eq!(h.state.queue_indices().len(), 0);
    }
}
