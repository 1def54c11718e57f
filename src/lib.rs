//! Adaptive rate limiting and admission control.
//!
//! A [`RateLimitEngine`] decides allow or deny for a client identity on a
//! route under a named endpoint profile, tracks per-key request windows and
//! blocks in a sharded in-memory store, and evicts stale state with a
//! background sweeper. The `handlers` module wires the engine into axum.

pub mod block;
pub mod classify;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod policy;
pub mod rate_limit;
pub mod state;
pub mod stats;
pub mod store;
pub mod sweeper;
pub mod window;

pub use engine::{Decision, RateLimitEngine};
pub use error::ConfigError;
pub use policy::{EndpointProfile, PolicyTable, ProfileId};
pub use state::AppState;
pub use sweeper::{SweeperConfig, SweeperHandle};

use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

// Service routes: health, metrics, stats and the external check endpoint
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/stats", get(handlers::stats_handler))
        .route("/check", post(handlers::check_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Put `routes` behind the rate limiting middleware
pub fn protect(routes: Router, state: Arc<AppState>) -> Router {
    routes.layer(middleware::from_fn_with_state(state, handlers::rate_limit))
}
