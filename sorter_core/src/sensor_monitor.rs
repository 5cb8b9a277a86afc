//! The sensor monitor: the ~200 Hz loop that polls the gate sensor and every
//! lane sensor, debounces, and runs the two-way match decision table.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sorter_hal::Level;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::executor::{SortExecutorPool, SortJob};
use crate::gpio_shared::SharedGpio;
use crate::maintenance::MaintenanceController;
use crate::qr_queue::QrQueue;
use crate::state_store::StateStore;
use crate::token_queue::TokenQueue;
use crate::types::{Event, LaneSnapshot, LaneStatus, LogEvent};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Clone, Copy)]
struct EdgeState {
    last_level: Level,
    last_accepted: Option<Instant>,
}

impl Default for EdgeState {
    fn default() -> Self {
        Self {
            last_level: Level::High,
            last_accepted: None,
        }
    }
}

/// Returns true iff this reading is an accepted falling edge: the previous
/// level was high, the current level is low, and either no edge has ever
/// been accepted or more than `debounce` has elapsed since the last one.
fn detect_falling_edge(edge: &mut EdgeState, current: Level, debounce: Duration) -> bool {
    let was_high = edge.last_level.is_high();
    let now_low = !current.is_high();
    edge.last_level = current;

    if !(was_high && now_low) {
        return false;
    }

    let accept = match edge.last_accepted {
        None => true,
        Some(prev) => prev.elapsed() > debounce,
    };
    if accept {
        edge.last_accepted = Some(Instant::now());
    }
    accept
}

pub struct SensorMonitor {
    state: Arc<StateStore>,
    qr_queue: Arc<QrQueue>,
    token_queue: Arc<TokenQueue>,
    maintenance: Arc<MaintenanceController>,
    gpio: SharedGpio,
    events: broadcast::Sender<Event>,
    executor: Arc<SortExecutorPool>,
    auto_test: Arc<AtomicBool>,
    entry_pin: u32,
    gate_edge: EdgeState,
    lane_edges: Vec<EdgeState>,
}

impl SensorMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<StateStore>,
        qr_queue: Arc<QrQueue>,
        token_queue: Arc<TokenQueue>,
        maintenance: Arc<MaintenanceController>,
        gpio: SharedGpio,
        events: broadcast::Sender<Event>,
        executor: Arc<SortExecutorPool>,
        auto_test: Arc<AtomicBool>,
        entry_pin: u32,
    ) -> Self {
        let lane_count = state.lane_count();
        Self {
            state,
            qr_queue,
            token_queue,
            maintenance,
            gpio,
            events,
            executor,
            auto_test,
            entry_pin,
            gate_edge: EdgeState::default(),
            lane_edges: vec![EdgeState::default(); lane_count],
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }

            if self.maintenance.is_active() || self.auto_test.load(Ordering::Relaxed) {
                continue;
            }

            self.tick().await;
        }
    }

    async fn tick(&mut self) {
        let timing = self.state.timing();
        let debounce = Duration::from_secs_f64(timing.sensor_debounce);

        if let Some(item) = self
            .qr_queue
            .timeout_head(Duration::from_secs_f64(timing.queue_head_timeout))
        {
            warn!(lane_id = %item.lane_id, "qr queue head timed out, dropping");
            self.state
                .update_lane_runtime(item.lane_index, |rt| rt.status = LaneStatus::Ready);
            let _ = self.events.send(Event::Log(LogEvent::message(
                "queue_timeout",
                format!("dropped stale QR for lane {}", item.lane_id),
            )));
        }

        match self.read_pin(self.entry_pin) {
            Ok(level) => {
                self.state
                    .set_gate_sensor_reading(if level.is_high() { 1 } else { 0 });
                if detect_falling_edge(&mut self.gate_edge, level, debounce) {
                    let count = self.token_queue.add();
                    info!(token_count = count, "gate edge accepted");
                    let _ = self
                        .events
                        .send(Event::Log(LogEvent::message("gate_edge", "entry token added")));
                }
            }
            Err(e) => {
                self.maintenance
                    .trigger(format!("gate sensor read failed: {e}"));
                self.emit_maintenance_update();
                return;
            }
        }

        let lane_count = self.state.lane_count();
        for lane_index in 0..lane_count {
            let Some(lane) = self.state.lane(lane_index) else {
                continue;
            };
            match self.read_pin(lane.sensor_pin) {
                Ok(level) => {
                    self.state.update_lane_runtime(lane_index, |rt| {
                        rt.sensor_reading = if level.is_high() { 1 } else { 0 };
                    });
                    if detect_falling_edge(&mut self.lane_edges[lane_index], level, debounce) {
                        self.handle_lane_edge(lane_index, &lane).await;
                    }
                }
                Err(e) => {
                    self.maintenance
                        .trigger(format!("lane {} sensor read failed: {e}", lane.id));
                    self.emit_maintenance_update();
                    break;
                }
            }
        }

        self.state.set_token_count(self.token_queue.length());
    }

    fn read_pin(&self, pin: u32) -> Result<Level, sorter_hal::HalError> {
        self.gpio.lock().read(pin)
    }

    fn emit_maintenance_update(&self) {
        let _ = self.events.send(Event::MaintenanceUpdate {
            enabled: true,
            reason: self.maintenance.reason(),
        });
    }

    /// The two-way match decision table (§4.6 step 4).
    async fn handle_lane_edge(&mut self, lane_index: usize, lane: &LaneSnapshot) {
        let is_sorting = lane.is_sorting();
        let qr_item = self.qr_queue.pop_by_lane(lane_index);
        let token_present = !self.token_queue.is_empty();

        match (qr_item, token_present) {
            (Some(item), true) => {
                self.token_queue.consume();
                self.dispatch_sort(lane_index, Some(item), "match").await;
            }
            (Some(item), false) => {
                warn!(lane_id = %lane.id, "false trigger: QR present but no token, returning to queue front");
                let _ = self.events.send(Event::Log(LogEvent::message(
                    "false_trigger",
                    format!("lane {} has a QR item but no entry token", lane.id),
                )));
                self.qr_queue.push_front(item);
            }
            (None, true) => {
                if is_sorting {
                    debug!(lane_id = %lane.id, "lane edge with token but no QR yet, waiting");
                    let _ = self.events.send(Event::Log(LogEvent::message(
                        "waiting_for_qr",
                        format!("lane {} triggered with a token but no recognition yet", lane.id),
                    )));
                } else {
                    self.token_queue.consume();
                    self.dispatch_sort(lane_index, None, "pass-through").await;
                }
            }
            (None, false) => {
                warn!(lane_id = %lane.id, "spurious trigger: no QR, no token");
                let _ = self.events.send(Event::Log(LogEvent::message(
                    "spurious_trigger",
                    format!("lane {} triggered with no QR and no token", lane.id),
                )));
            }
        }
    }

    async fn dispatch_sort(
        &self,
        lane_index: usize,
        qr_item: Option<crate::qr_queue::QrQueueItem>,
        source: &'static str,
    ) {
        self.state
            .update_lane_runtime(lane_index, |rt| rt.status = LaneStatus::WaitingForPush);
        self.executor
            .submit(SortJob {
                lane_index,
                qr_item,
                source,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falling_edge_requires_prior_high_level() {
        let mut edge = EdgeState::default();
        assert!(!detect_falling_edge(&mut edge, Level::Low, Duration::from_millis(0)));
        // already low -> low is not a new falling edge
        assert!(!detect_falling_edge(&mut edge, Level::Low, Duration::from_millis(0)));
    }

    #[test]
    fn falling_edge_accepted_after_high_then_low() {
        let mut edge = EdgeState::default();
        assert!(!detect_falling_edge(&mut edge, Level::High, Duration::ZERO));
        assert!(detect_falling_edge(&mut edge, Level::Low, Duration::ZERO));
    }

    #[test]
    fn second_edge_within_debounce_window_is_rejected() {
        let mut edge = EdgeState::default();
        detect_falling_edge(&mut edge, Level::Low, Duration::from_secs(10));
        edge.last_level = Level::High;
        assert!(!detect_falling_edge(&mut edge, Level::Low, Duration::from_secs(10)));
    }

    #[test]
    fn edge_accepted_once_debounce_elapses() {
        let mut edge = EdgeState::default();
        detect_falling_edge(&mut edge, Level::Low, Duration::from_millis(5));
        edge.last_level = Level::High;
        std::thread::sleep(Duration::from_millis(10));
        assert!(detect_falling_edge(&mut edge, Level::Low, Duration::from_millis(5)));
    }
}
