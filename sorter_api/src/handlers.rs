//! HTTP handlers bound to the routes in [`crate::routes::build_router`].

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use sorter_common::config::{AppConfig, GpioMode, LaneConfig, TimingConfig};
use sorter_core::executor::RelayKind;

use crate::error::ApiError;
use crate::persistence;
use crate::state::ApiState;

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub timing_config: TimingConfig,
    pub lanes_config: Vec<LaneConfig>,
}

pub async fn get_config(State(state): State<ApiState>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        timing_config: state.handle.state.timing(),
        lanes_config: state.handle.lane_configs(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialTiming {
    pub cycle_delay: Option<f64>,
    pub settle_delay: Option<f64>,
    pub sensor_debounce: Option<f64>,
    pub push_delay: Option<f64>,
    pub queue_head_timeout: Option<f64>,
    pub gpio_mode: Option<GpioMode>,
    pub pending_trigger_timeout: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfigPatch {
    #[serde(default)]
    pub timing_config: Option<PartialTiming>,
    #[serde(default)]
    pub lanes_config: Option<Vec<LaneConfig>>,
}

#[derive(Debug, Serialize)]
pub struct ConfigPatchResponse {
    pub timing_config: TimingConfig,
    pub lanes_config: Vec<LaneConfig>,
    pub restart_required: bool,
}

fn apply_timing_patch(current: TimingConfig, patch: PartialTiming) -> TimingConfig {
    TimingConfig {
        cycle_delay: patch.cycle_delay.unwrap_or(current.cycle_delay),
        settle_delay: patch.settle_delay.unwrap_or(current.settle_delay),
        sensor_debounce: patch.sensor_debounce.unwrap_or(current.sensor_debounce),
        push_delay: patch.push_delay.unwrap_or(current.push_delay),
        queue_head_timeout: patch.queue_head_timeout.unwrap_or(current.queue_head_timeout),
        gpio_mode: patch.gpio_mode.unwrap_or(current.gpio_mode),
        pending_trigger_timeout: patch.pending_trigger_timeout.unwrap_or(current.pending_trigger_timeout),
    }
}

pub async fn post_config(
    State(state): State<ApiState>,
    Json(patch): Json<ConfigPatch>,
) -> Result<Json<ConfigPatchResponse>, ApiError> {
    let previous_timing = state.handle.state.timing();
    let mut restart_required = false;

    let new_timing = match patch.timing_config {
        Some(partial) => {
            let merged = apply_timing_patch(previous_timing.clone(), partial);
            if merged.gpio_mode != previous_timing.gpio_mode {
                restart_required = true;
            }
            merged
        }
        None => previous_timing,
    };
    new_timing
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let new_lanes = match patch.lanes_config {
        Some(lanes) => {
            restart_required = true;
            lanes
        }
        None => state.handle.lane_configs(),
    };

    let merged = AppConfig {
        timing_config: new_timing,
        lanes_config: new_lanes,
    };
    merged.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    state.handle.state.set_timing(merged.timing_config.clone());
    state.handle.state.replace_lanes(&merged.lanes_config);

    if let Err(e) = persistence::atomic_save_json(&state.config_path(), &merged).await {
        return Err(ApiError::Internal(format!("failed to persist config: {e}")));
    }

    Ok(Json(ConfigPatchResponse {
        timing_config: merged.timing_config,
        lanes_config: merged.lanes_config,
        restart_required,
    }))
}

pub async fn get_sort_log(State(state): State<ApiState>) -> Json<persistence::SortLog> {
    Json(persistence::load_sort_log(&state.sort_log_path()).await)
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

pub async fn post_maintenance_reset(State(state): State<ApiState>) -> Json<OkResponse> {
    state.handle.reset_maintenance();
    state.handle.clear_all_queues();
    Json(OkResponse { ok: true })
}

pub async fn post_queue_reset(State(state): State<ApiState>) -> Result<Json<OkResponse>, ApiError> {
    let (active, reason) = state.handle.maintenance.snapshot();
    if active {
        return Err(ApiError::Forbidden(format!(
            "cannot reset queues while in maintenance: {}",
            reason.unwrap_or_default()
        )));
    }
    state.handle.clear_all_queues();
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Debug, Deserialize)]
pub struct MockGpioRequest {
    pub lane_index: usize,
    pub state: bool,
}

pub async fn post_mock_gpio(
    State(state): State<ApiState>,
    Json(req): Json<MockGpioRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let lane_count = state.handle.state.lane_count();
    let pin = if req.lane_index == lane_count {
        state.bootstrap.entry_sensor_pin
    } else {
        let lane = state
            .handle
            .state
            .lane(req.lane_index)
            .ok_or(ApiError::BadRequest(format!("no such lane index: {}", req.lane_index)))?;
        lane.sensor_pin
    };

    state.handle.set_mock_sensor(pin, req.state)?;
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Debug, Deserialize)]
pub struct RelayTestRequest {
    pub lane_index: usize,
    pub relay: RelayKindWire,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayKindWire {
    Push,
    Grab,
}

impl From<RelayKindWire> for RelayKind {
    fn from(wire: RelayKindWire) -> Self {
        match wire {
            RelayKindWire::Push => RelayKind::Push,
            RelayKindWire::Grab => RelayKind::Grab,
        }
    }
}

pub async fn post_test_relay(
    State(state): State<ApiState>,
    Json(req): Json<RelayTestRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    state.handle.manual_relay_test(req.lane_index, req.relay.into()).await?;
    Ok(Json(OkResponse { ok: true }))
}

pub async fn post_test_all_relays(State(state): State<ApiState>) -> Result<Json<OkResponse>, ApiError> {
    state.handle.sweep_all_relays().await?;
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Debug, Deserialize)]
pub struct CounterResetRequest {
    /// `None` (the field omitted) resets every lane's counter.
    #[serde(default)]
    pub lane_index: Option<usize>,
}

pub async fn post_counter_reset(
    State(state): State<ApiState>,
    Json(req): Json<CounterResetRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    state.handle.reset_counter(req.lane_index)?;
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Debug, Deserialize)]
pub struct AutoTestRequest {
    pub enabled: bool,
}

pub async fn post_auto_test(
    State(state): State<ApiState>,
    Json(req): Json<AutoTestRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    state.handle.toggle_auto_test(req.enabled)?;
    Ok(Json(OkResponse { ok: true }))
}
