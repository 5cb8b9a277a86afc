//! Shared runtime types: lane status, the fused config+runtime lane view
//! exposed to the state store, QR-queue items, and the outbound event
//! stream's wire shape.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use sorter_common::config::{LaneConfig, TimingConfig};

/// A lane's current phase in the sort cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneStatus {
    Ready,
    WaitingForItem,
    WaitingForPush,
    Sorting,
    PassingThrough,
}

/// Ephemeral per-lane fields, reset at config load and otherwise mutated
/// only by the sensor monitor, the sort executor, or an explicit reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneRuntime {
    pub status: LaneStatus,
    pub count: u64,
    /// 0 = active/low, 1 = inactive/high — matches the raw sensor encoding.
    pub sensor_reading: u8,
    pub relay_push: u8,
    pub relay_grab: u8,
}

impl Default for LaneRuntime {
    fn default() -> Self {
        Self {
            status: LaneStatus::Ready,
            count: 0,
            sensor_reading: 1,
            relay_push: 0,
            relay_grab: 1,
        }
    }
}

/// Config and runtime fused into the shape the state store carries and the
/// control plane serializes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneSnapshot {
    pub id: String,
    pub name: String,
    pub sensor_pin: u32,
    pub push_pin: Option<u32>,
    pub pull_pin: Option<u32>,
    #[serde(flatten)]
    pub runtime: LaneRuntime,
}

impl LaneSnapshot {
    pub fn from_config(config: &LaneConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            sensor_pin: config.sensor_pin,
            push_pin: config.push_pin,
            pull_pin: config.pull_pin,
            runtime: LaneRuntime::default(),
        }
    }

    pub fn is_sorting(&self) -> bool {
        self.push_pin.is_some() && self.pull_pin.is_some()
    }
}

/// One raw recognition handed up from the detector, before it has been
/// mapped to a lane or deduplicated.
#[derive(Debug, Clone)]
pub struct DetectorFrame {
    pub raw: String,
    pub source: &'static str,
}

/// One pending recognition, targeting a specific lane.
#[derive(Debug, Clone)]
pub struct QrQueueItem {
    pub lane_index: usize,
    pub qr_key: String,
    pub lane_id: String,
    pub timestamp: Instant,
    pub data_raw: String,
    pub source: String,
}

/// Full state snapshot as read by `GET config`/broadcast over `/api/events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub lanes: Vec<LaneSnapshot>,
    pub timing: TimingConfig,
    pub gate_sensor_reading: u8,
    pub token_count: u64,
    pub queue_indices: Vec<usize>,
    pub maintenance_active: bool,
    pub maintenance_reason: Option<String>,
}

/// A single log line pushed to `/api/events` subscribers. Fields beyond
/// `log_type` are populated per the originating event — a sort completion
/// sets `name`/`count`, a dropped/returned queue item sets `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub log_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub timestamp: f64,
}

impl LogEvent {
    pub fn message(log_type: &str, message: impl Into<String>) -> Self {
        Self {
            log_type: log_type.to_string(),
            message: Some(message.into()),
            data: None,
            count: None,
            name: None,
            timestamp: unix_timestamp(),
        }
    }

    pub fn sort_completed(name: impl Into<String>, count: u64) -> Self {
        Self {
            log_type: "sort".to_string(),
            message: None,
            data: None,
            count: Some(count),
            name: Some(name.into()),
            timestamp: unix_timestamp(),
        }
    }
}

fn unix_timestamp() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Outbound events pushed over `/api/events`. Tagged to match the wire
/// contract's `type` discriminator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    StateUpdate { state: StateSnapshot },
    Log(LogEvent),
    MaintenanceUpdate { enabled: bool, reason: Option<String> },
    TestSequenceComplete,
}
