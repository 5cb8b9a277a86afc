//! `GET /api/events`: the bidirectional event stream. Downstream: every
//! `Event` the core broadcasts. Upstream: inbound control actions, so a
//! single connection can both watch and drive the system.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sorter_core::executor::RelayKind;
use tracing::debug;

use crate::auth::validate_query_token;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub token: Option<String>,
}

pub async fn events_handler(
    State(state): State<ApiState>,
    Query(query): Query<EventsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(e) = validate_query_token(query.token.as_deref(), &state) {
        return e.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state)).into_response()
}

/// An inbound action sent by a connected client over the same socket that
/// receives broadcasts.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum InboundAction {
    ResetMaintenance,
    ResetCounter { lane_index: Option<usize> },
    TestRelay { lane_index: usize, relay: WireRelay },
    TestAllRelays,
    ToggleAutoTest { enabled: bool },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WireRelay {
    Push,
    Grab,
}

impl From<WireRelay> for RelayKind {
    fn from(wire: WireRelay) -> Self {
        match wire {
            WireRelay::Push => RelayKind::Push,
            WireRelay::Grab => RelayKind::Grab,
        }
    }
}

async fn handle_socket(socket: WebSocket, state: ApiState) {
    let mut events = state.handle.events.subscribe();
    let cancel = state.handle.cancel.clone();
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(text) = serde_json::to_string(&event) else { continue };
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => dispatch_inbound(&state, &text).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

async fn dispatch_inbound(state: &ApiState, text: &str) {
    let action: InboundAction = match serde_json::from_str(text) {
        Ok(action) => action,
        Err(e) => {
            debug!(error = %e, "ignoring malformed inbound ws action");
            return;
        }
    };

    let result = match action {
        InboundAction::ResetMaintenance => {
            state.handle.reset_maintenance();
            state.handle.clear_all_queues();
            Ok(())
        }
        InboundAction::ResetCounter { lane_index } => state.handle.reset_counter(lane_index).map_err(|e| e.to_string()),
        InboundAction::TestRelay { lane_index, relay } => state
            .handle
            .manual_relay_test(lane_index, relay.into())
            .await
            .map_err(|e| e.to_string()),
        InboundAction::TestAllRelays => state.handle.sweep_all_relays().await.map_err(|e| e.to_string()),
        InboundAction::ToggleAutoTest { enabled } => state.handle.toggle_auto_test(enabled).map_err(|e| e.to_string()),
    };

    if let Err(e) = result {
        debug!(error = %e, "inbound ws action failed");
    }
}
