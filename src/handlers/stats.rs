use crate::state::AppState;
use crate::stats::Stats;
use axum::{Json, extract::State};
use std::sync::Arc;

pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<Stats> {
    Json(state.engine.stats())
}
