//! The sort executor: one task per in-flight sort or pass-through, drawn
//! from a bounded worker pool, plus the shared piston-cycle and safe-baseline
//! helpers used by the executor, manual relay tests, and startup/reset.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sorter_hal::{relay_off, relay_on, HalError};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::gpio_shared::SharedGpio;
use crate::maintenance::MaintenanceController;
use crate::qr_queue::QrQueueItem;
use crate::state_store::StateStore;
use crate::types::{Event, LaneSnapshot, LaneStatus, LogEvent};

/// Grace sleep for a pass-through lane (no pistons to actuate).
const PASS_THROUGH_SETTLE: Duration = Duration::from_millis(100);

/// One unit of work for the sort-executor pool.
pub struct SortJob {
    pub lane_index: usize,
    pub qr_item: Option<QrQueueItem>,
    pub source: &'static str,
}

/// Which relay a manual test pulses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    Push,
    Grab,
}

struct WorkerDeps {
    state: Arc<StateStore>,
    gpio: SharedGpio,
    maintenance: Arc<MaintenanceController>,
    events: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

/// Bounded pool of sort-execution workers. The bound exists to cap damage
/// from a runaway test storm, not because normal traffic needs concurrency
/// across lanes — jobs are dispatched round-robin across a fixed worker set.
pub struct SortExecutorPool {
    senders: Vec<mpsc::Sender<SortJob>>,
    next: AtomicUsize,
}

impl SortExecutorPool {
    pub fn spawn(
        workers: usize,
        state: Arc<StateStore>,
        gpio: SharedGpio,
        maintenance: Arc<MaintenanceController>,
        events: broadcast::Sender<Event>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let mut senders = Vec::with_capacity(workers);
        for _ in 0..workers {
            let (tx, rx) = mpsc::channel(16);
            senders.push(tx);
            let deps = WorkerDeps {
                state: Arc::clone(&state),
                gpio: Arc::clone(&gpio),
                maintenance: Arc::clone(&maintenance),
                events: events.clone(),
                cancel: cancel.clone(),
            };
            tokio::task::spawn(worker_loop(rx, deps));
        }
        Arc::new(Self {
            senders,
            next: AtomicUsize::new(0),
        })
    }

    /// Dispatch a job to the next worker in round-robin order.
    pub async fn submit(&self, job: SortJob) {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.senders.len();
        let _ = self.senders[idx].send(job).await;
    }
}

async fn worker_loop(mut rx: mpsc::Receiver<SortJob>, deps: WorkerDeps) {
    loop {
        let job = tokio::select! {
            _ = deps.cancel.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        run_job(job, &deps).await;
    }
}

async fn run_job(job: SortJob, deps: &WorkerDeps) {
    let SortJob {
        lane_index,
        source,
        ..
    } = job;
    let Some(lane) = deps.state.lane(lane_index) else {
        return;
    };
    let timing = deps.state.timing();

    if timing.push_delay > 0.0 && lane.is_sorting() {
        sleep_honoring_cancel(&deps.cancel, timing.push_delay).await;
        if deps.cancel.is_cancelled() {
            return;
        }
    }

    if !lane.is_sorting() {
        deps.state
            .update_lane_runtime(lane_index, |rt| rt.status = LaneStatus::PassingThrough);
        tokio::select! {
            _ = deps.cancel.cancelled() => return,
            _ = tokio::time::sleep(PASS_THROUGH_SETTLE) => {}
        }
        complete_success(deps, lane_index, &lane.name, source);
        return;
    }

    deps.state
        .update_lane_runtime(lane_index, |rt| rt.status = LaneStatus::Sorting);

    match run_piston_cycle(&deps.gpio, &deps.state, lane_index, &lane, &deps.cancel, timing.settle_delay, timing.cycle_delay).await {
        Ok(()) => complete_success(deps, lane_index, &lane.name, source),
        Err(e) => {
            deps.maintenance
                .trigger(format!("sort cycle failed on lane {}: {e}", lane.name));
            deps.state
                .update_lane_runtime(lane_index, |rt| rt.status = LaneStatus::Ready);
            let _ = deps.events.send(Event::MaintenanceUpdate {
                enabled: true,
                reason: deps.maintenance.reason(),
            });
        }
    }
}

fn complete_success(deps: &WorkerDeps, lane_index: usize, name: &str, source: &str) {
    let mut new_count = 0u64;
    deps.state.update_lane_runtime(lane_index, |rt| {
        rt.count += 1;
        rt.status = LaneStatus::Ready;
        new_count = rt.count;
    });
    info!(lane = name, count = new_count, source, "sort completed");
    let _ = deps
        .events
        .send(Event::Log(LogEvent::sort_completed(name, new_count)));
}

async fn sleep_honoring_cancel(cancel: &CancellationToken, secs: f64) {
    if secs <= 0.0 {
        return;
    }
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(Duration::from_secs_f64(secs)) => {}
    }
}

/// Run the four-phase piston cycle: pull off (grab released), push on,
/// push off, pull on (grab engaged). Any GPIO error aborts immediately,
/// leaving the physical state indeterminate — only `reset_all_relays`
/// (after a human reset) restores the safe baseline.
#[allow(clippy::too_many_arguments)]
async fn run_piston_cycle(
    gpio: &SharedGpio,
    state: &StateStore,
    lane_index: usize,
    lane: &LaneSnapshot,
    cancel: &CancellationToken,
    settle_delay: f64,
    cycle_delay: f64,
) -> Result<(), HalError> {
    let push_pin = lane.push_pin.expect("sorting lane always has push_pin");
    let pull_pin = lane.pull_pin.expect("sorting lane always has pull_pin");

    {
        let mut gpio = gpio.lock();
        relay_off(&mut **gpio, pull_pin)?;
    }
    state.update_lane_runtime(lane_index, |rt| rt.relay_grab = 0);
    sleep_honoring_cancel(cancel, settle_delay).await;

    {
        let mut gpio = gpio.lock();
        relay_on(&mut **gpio, push_pin)?;
    }
    state.update_lane_runtime(lane_index, |rt| rt.relay_push = 1);
    sleep_honoring_cancel(cancel, cycle_delay).await;

    {
        let mut gpio = gpio.lock();
        relay_off(&mut **gpio, push_pin)?;
    }
    state.update_lane_runtime(lane_index, |rt| rt.relay_push = 0);
    sleep_honoring_cancel(cancel, settle_delay).await;

    {
        let mut gpio = gpio.lock();
        relay_on(&mut **gpio, pull_pin)?;
    }
    state.update_lane_runtime(lane_index, |rt| rt.relay_grab = 1);

    Ok(())
}

/// The safe baseline: grab engaged, push retracted on every sorting lane.
/// Used at startup and after a maintenance reset.
pub fn reset_all_relays(gpio: &SharedGpio, state: &StateStore, lanes: &[LaneSnapshot]) -> Result<(), HalError> {
    let mut gpio = gpio.lock();
    for (index, lane) in lanes.iter().enumerate() {
        if let Some(pull) = lane.pull_pin {
            relay_on(&mut **gpio, pull)?;
            state.update_lane_runtime(index, |rt| rt.relay_grab = 1);
        }
        if let Some(push) = lane.push_pin {
            relay_off(&mut **gpio, push)?;
            state.update_lane_runtime(index, |rt| rt.relay_push = 0);
        }
    }
    Ok(())
}

/// A single manual pulse on one relay, used by the `test_relay` control
/// action.
pub async fn manual_relay_test(
    gpio: &SharedGpio,
    state: &StateStore,
    lane_index: usize,
    lane: &LaneSnapshot,
    relay: RelayKind,
    cycle_delay: f64,
    cancel: &CancellationToken,
) -> Result<(), HalError> {
    let pin = match relay {
        RelayKind::Push => lane.push_pin,
        RelayKind::Grab => lane.pull_pin,
    };
    let Some(pin) = pin else {
        return Ok(());
    };

    {
        let mut gpio = gpio.lock();
        relay_on(&mut **gpio, pin)?;
    }
    state.update_lane_runtime(lane_index, |rt| match relay {
        RelayKind::Push => rt.relay_push = 1,
        RelayKind::Grab => rt.relay_grab = 1,
    });

    sleep_honoring_cancel(cancel, cycle_delay).await;

    {
        let mut gpio = gpio.lock();
        relay_off(&mut **gpio, pin)?;
    }
    state.update_lane_runtime(lane_index, |rt| match relay {
        RelayKind::Push => rt.relay_push = 0,
        RelayKind::Grab => rt.relay_grab = 0,
    });

    Ok(())
}

/// A full four-phase cycle on every sorting lane, interruptible by
/// cancellation. Used by `test_all_relays`.
pub async fn sweep_all_relays(
    gpio: &SharedGpio,
    state: &StateStore,
    lanes: &[LaneSnapshot],
    settle_delay: f64,
    cycle_delay: f64,
    cancel: &CancellationToken,
) -> Result<(), HalError> {
    for (index, lane) in lanes.iter().enumerate() {
        if !lane.is_sorting() {
            continue;
        }
        if cancel.is_cancelled() {
            break;
        }
        run_piston_cycle(gpio, state, index, lane, cancel, settle_delay, cycle_delay).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorter_common::config::{LaneConfig, TimingConfig};
    use sorter_hal::MockGpio;

    fn lane(id: &str, push: Option<u32>, pull: Option<u32>) -> LaneConfig {
        LaneConfig {
            id: id.to_string(),
            name: id.to_string(),
            sensor_pin: 1,
            push_pin: push,
            pull_pin: pull,
        }
    }

    fn setup(lanes: &[LaneConfig]) -> (Arc<StateStore>, SharedGpio) {
        let state = Arc::new(StateStore::new(TimingConfig::default(), lanes));
        let mut mock = MockGpio::new();
        for lane in lanes {
            if let Some(p) = lane.push_pin {
                mock.configure_output(p, sorter_hal::Level::High).unwrap();
            }
            if let Some(p) = lane.pull_pin {
                mock.configure_output(p, sorter_hal::Level::High).unwrap();
            }
        }
        let gpio: SharedGpio = Arc::new(parking_lot::Mutex::new(Box::new(mock)));
        (state, gpio)
    }

    #[tokio::test]
    async fn piston_cycle_ends_with_grab_engaged_push_retracted() {
        let cfg = lane("A", Some(17), Some(27));
        let (state, gpio) = setup(&[cfg]);
        let lane_snap = state.lane(0).unwrap();
        let cancel = CancellationToken::new();
        run_piston_cycle(&gpio, &state, 0, &lane_snap, &cancel, 0.0, 0.0)
            .await
            .unwrap();
        let rt = state.lane(0).unwrap().runtime;
        assert_eq!(rt.relay_grab, 1);
        assert_eq!(rt.relay_push, 0);
    }

    #[test]
    fn reset_all_relays_establishes_safe_baseline() {
        let cfg = lane("A", Some(17), Some(27));
        let (state, gpio) = setup(&[cfg]);
        {
            let mut g = gpio.lock();
            relay_on(&mut **g, 17).unwrap();
            relay_off(&mut **g, 27).unwrap();
        }
        let lanes = state.lanes();
        reset_all_relays(&gpio, &state, &lanes).unwrap();
        let rt = state.lane(0).unwrap().runtime;
        assert_eq!(rt.relay_grab, 1);
        assert_eq!(rt.relay_push, 0);
    }

    #[test]
    fn reset_all_relays_skips_pass_through_lanes() {
        let cfg = lane("D", None, None);
        let (state, gpio) = setup(&[cfg]);
        assert!(reset_all_relays(&gpio, &state, &state.lanes()).is_ok());
    }

    #[tokio::test]
    async fn manual_relay_test_pulses_then_restores_off() {
        let cfg = lane("A", Some(17), Some(27));
        let (state, gpio) = setup(&[cfg]);
        let lane_snap = state.lane(0).unwrap();
        let cancel = CancellationToken::new();
        manual_relay_test(&gpio, &state, 0, &lane_snap, RelayKind::Push, 0.0, &cancel)
            .await
            .unwrap();
        assert_eq!(state.lane(0).unwrap().runtime.relay_push, 0);
    }
}
