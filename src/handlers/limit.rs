//! Rate limiting middleware for axum routers.

use super::ceil_secs;
use crate::classify::client_identity;
use crate::engine::Decision;
use crate::state::AppState;
use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

pub const RETRY_AFTER: &str = "retry-after";
pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Admit or reject a request before it reaches the wrapped routes.
///
/// Use with `axum::middleware::from_fn_with_state`. Rejected requests get a
/// 429 with `Retry-After` and the `X-RateLimit-*` headers; admitted ones are
/// forwarded and carry the `X-RateLimit-*` headers on the way back.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let identity = client_identity(request.headers(), peer);
    let path = request.uri().path().to_string();
    let profile = state.classifier.classify(&path);

    let decision = state.engine.check_request(&identity, &path, profile);

    if !decision.allowed {
        let retry_secs = decision.retry_after.map(ceil_secs).unwrap_or_default();
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse {
                error: "Rate limit exceeded. Try again later.".to_string(),
                code: "RATE_LIMITED",
                retry_after_secs: Some(retry_secs),
            }),
        )
            .into_response();
        let headers = response.headers_mut();
        headers.insert(RETRY_AFTER, HeaderValue::from(retry_secs));
        apply_rate_limit_headers(headers, &decision);
        return response;
    }

    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

// X-RateLimit-Reset is the unix time (seconds) when the window or block ends
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    let reset_in = i64::try_from(ceil_secs(decision.reset_after)).unwrap_or(i64::MAX);
    let reset_at = chrono::Utc::now().timestamp().saturating_add(reset_in);

    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(
        RATE_LIMIT_REMAINING,
        HeaderValue::from(decision.remaining.unwrap_or(0)),
    );
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(reset_at));
}
