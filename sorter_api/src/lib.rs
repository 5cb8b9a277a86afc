//! Sort API
//!
//! The HTTP/WebSocket control plane: the axum router, bearer-token auth
//! gate, and atomic `config.json`/`sort_log.json` persistence.
//!
//! # Module Structure
//!
//! - [`state`] - [`state::ApiState`], the shared axum `State`
//! - [`auth`] - bearer-token / query-token validation and middleware
//! - [`handlers`] - the `/api/*` REST handlers
//! - [`ws`] - the `/api/events` bidirectional WebSocket handler
//! - [`routes`] - [`routes::build_router`]
//! - [`persistence`] - atomic config/sort-log load, save, and autosave task

pub mod auth;
pub mod error;
pub mod handlers;
pub mod persistence;
pub mod routes;
pub mod state;
pub mod ws;

pub use error::ApiError;
pub use routes::build_router;
pub use state::ApiState;
