use super::ceil_secs;
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Admission check request, for a fronting proxy that enforces decisions
/// itself.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub ip: String,
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub async fn check_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckRequest>,
) -> (StatusCode, Json<CheckResponse>) {
    let ip = req.ip.trim();
    if ip.is_empty() || !req.path.starts_with('/') {
        warn!(ip = %req.ip, path = %req.path, "Malformed check request");
        return (
            StatusCode::BAD_REQUEST,
            Json(CheckResponse {
                allowed: false,
                profile: None,
                limit: None,
                remaining: None,
                retry_after_secs: None,
                reset_after_secs: None,
                reason: Some("ip must be set and path must start with '/'".to_string()),
            }),
        );
    }

    let profile_id = state.classifier.classify(&req.path);
    let profile = state.engine.profile(profile_id).name.clone();
    let decision = state.engine.check_request(ip, &req.path, profile_id);
    debug!(%ip, path = %req.path, %profile, allowed = decision.allowed, "Processed check");

    // 200 either way so the proxy can read the body
    (
        StatusCode::OK,
        Json(CheckResponse {
            allowed: decision.allowed,
            profile: Some(profile),
            limit: Some(decision.limit),
            remaining: decision.remaining,
            retry_after_secs: decision.retry_after.map(ceil_secs),
            reset_after_secs: Some(ceil_secs(decision.reset_after)),
            reason: (!decision.allowed).then(|| "Rate limit exceeded".to_string()),
        }),
    )
}
