//! The system-state store: one lock guarding the fused lane list, timing
//! config, gate-sensor/token readings, and the QR-queue projection.
//!
//! Every read obtains a consistent copy by deep-copying under the lock
//! before releasing it; every write takes the lock, mutates, releases.

use parking_lot::Mutex;
use sorter_common::config::{LaneConfig, TimingConfig};

use crate::types::{LaneRuntime, LaneSnapshot, StateSnapshot};

struct Inner {
    lanes: Vec<LaneSnapshot>,
    timing: TimingConfig,
    gate_sensor_reading: u8,
    token_count: u64,
    queue_indices: Vec<usize>,
}

/// Single-lock snapshot of everything the control plane and sensor monitor
/// need to read or partially update.
pub struct StateStore {
    inner: Mutex<Inner>,
}

impl StateStore {
    /// Build a fresh store from a loaded config. All lanes start at their
    /// default runtime (status `Ready`, counters zeroed).
    pub fn new(timing: TimingConfig, lanes: &[LaneConfig]) -> Self {
        let lanes = lanes.iter().map(LaneSnapshot::from_config).collect();
        Self {
            inner: Mutex::new(Inner {
                lanes,
                timing,
                gate_sensor_reading: 1,
                token_count: 0,
                queue_indices: Vec::new(),
            }),
        }
    }

    /// Replace the lane list, e.g. after a `POST config` with `lanes_config`
    /// set. Counters are preserved for lanes whose `name` is unchanged;
    /// everything else starts fresh.
    pub fn replace_lanes(&self, lanes: &[LaneConfig]) {
        let mut inner = self.inner.lock();
        let previous_counts: std::collections::HashMap<String, u64> = inner
            .lanes
            .iter()
            .map(|l| (l.name.clone(), l.runtime.count))
            .collect();
        inner.lanes = lanes
            .iter()
            .map(|cfg| {
                let mut snap = LaneSnapshot::from_config(cfg);
                if let Some(count) = previous_counts.get(&cfg.name) {
                    snap.runtime.count = *count;
                }
                snap
            })
            .collect();
    }

    pub fn set_timing(&self, timing: TimingConfig) {
        self.inner.lock().timing = timing;
    }

    pub fn timing(&self) -> TimingConfig {
        self.inner.lock().timing.clone()
    }

    pub fn lane_count(&self) -> usize {
        self.inner.lock().lanes.len()
    }

    pub fn lane_configs(&self) -> Vec<LaneConfig> {
        self.inner
            .lock()
            .lanes
            .iter()
            .map(|l| LaneConfig {
                id: l.id.clone(),
                name: l.name.clone(),
                sensor_pin: l.sensor_pin,
                push_pin: l.push_pin,
                pull_pin: l.pull_pin,
            })
            .collect()
    }

    /// Deep-copy the lane list (config fused with runtime).
    pub fn lanes(&self) -> Vec<LaneSnapshot> {
        self.inner.lock().lanes.clone()
    }

    pub fn lane(&self, index: usize) -> Option<LaneSnapshot> {
        self.inner.lock().lanes.get(index).cloned()
    }

    /// Partial merge of runtime fields for one lane, keyed by index.
    pub fn update_lane_runtime(&self, index: usize, f: impl FnOnce(&mut LaneRuntime)) {
        let mut inner = self.inner.lock();
        if let Some(lane) = inner.lanes.get_mut(index) {
            f(&mut lane.runtime);
        }
    }

    pub fn reset_lane_counter(&self, index: usize) {
        self.update_lane_runtime(index, |rt| rt.count = 0);
    }

    pub fn reset_all_counters(&self) {
        let mut inner = self.inner.lock();
        for lane in &mut inner.lanes {
            lane.runtime.count = 0;
        }
    }

    pub fn set_gate_sensor_reading(&self, reading: u8) {
        self.inner.lock().gate_sensor_reading = reading;
    }

    pub fn set_token_count(&self, count: u64) {
        self.inner.lock().token_count = count;
    }

    /// Called by the QR queue while it still holds its own lock — the only
    /// sanctioned nested-lock order (QR then state).
    pub fn set_queue_indices(&self, indices: Vec<usize>) {
        self.inner.lock().queue_indices = indices;
    }

    pub fn queue_indices(&self) -> Vec<usize> {
        self.inner.lock().queue_indices.clone()
    }

    /// Full snapshot, merged with the maintenance flag supplied by the
    /// caller (the broadcaster reads `MaintenanceController` separately and
    /// passes it in here, per the 4.9 responsibility split).
    pub fn snapshot(&self, maintenance_active: bool, maintenance_reason: Option<String>) -> StateSnapshot {
        let inner = self.inner.lock();
        StateSnapshot {
            lanes: inner.lanes.clone(),
            timing: inner.timing.clone(),
            gate_sensor_reading: inner.gate_sensor_reading,
            token_count: inner.token_count,
            queue_indices: inner.queue_indices.clone(),
            maintenance_active,
            maintenance_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorter_common::config::LaneConfig;

    fn lane(id: &str, name: &str) -> LaneConfig {
        LaneConfig {
            id: id.to_string(),
            name: name.to_string(),
            sensor_pin: 1,
            push_pin: Some(2),
            pull_pin: Some(3),
        }
    }

    #[test]
    fn replace_lanes_preserves_count_by_name() {
        let store = StateStore::new(TimingConfig::default(), &[lane("A", "Lane A")]);
        store.update_lane_runtime(0, |rt| rt.count = 7);
        store.replace_lanes(&[lane("A2", "Lane A"), lane("B", "Lane B")]);
        let lanes = store.lanes();
        assert_eq!(lanes[0].runtime.count, 7);
        assert_eq!(lanes[1].runtime.count, 0);
    }

    #[test]
    fn update_lane_runtime_is_partial_merge() {
        let store = StateStore::new(TimingConfig::default(), &[lane("A", "Lane A")]);
        store.update_lane_runtime(0, |rt| rt.relay_push = 1);
        let lane = store.lane(0).unwrap();
        assert_eq!(lane.runtime.relay_push, 1);
        assert_eq!(lane.runtime.count, 0);
    }

    #[test]
    fn snapshot_merges_supplied_maintenance_state() {
        let store = StateStore::new(TimingConfig::default(), &[lane("A", "Lane A")]);
        let snap = store.snapshot(true, Some("test".to_string()));
        assert!(snap.maintenance_active);
        assert_eq!(snap.maintenance_reason.as_deref(), Some("test"));
    }
}
