//! Builds the axum `Router` binding the control surface to concrete routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::auth_layer;
use crate::handlers;
use crate::state::ApiState;
use crate::ws::events_handler;

pub fn build_router(state: ApiState) -> Router {
    let events_route = Router::new().route("/api/events", get(events_handler)).with_state(state.clone());

    let authenticated = Router::new()
        .route("/api/config", get(handlers::get_config).post(handlers::post_config))
        .route("/api/sort_log", get(handlers::get_sort_log))
        .route("/api/maintenance/reset", post(handlers::post_maintenance_reset))
        .route("/api/queue/reset", post(handlers::post_queue_reset))
        .route("/api/mock_gpio", post(handlers::post_mock_gpio))
        .route("/api/test_relay", post(handlers::post_test_relay))
        .route("/api/test_all_relays", post(handlers::post_test_all_relays))
        .route("/api/counter/reset", post(handlers::post_counter_reset))
        .route("/api/auto_test", post(handlers::post_auto_test))
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .with_state(state);

    Router::new()
        .merge(events_route)
        .merge(authenticated)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
