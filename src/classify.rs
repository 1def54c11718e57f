//! Request-side helpers: who is calling and which profile applies.

use crate::error::ConfigError;
use crate::policy::{API, AUTH, NORMAL, PolicyTable, ProfileId, SENSITIVE};
use axum::http::HeaderMap;
use std::net::SocketAddr;

const AUTH_MARKERS: &[&str] = &["/auth", "/login", "/register", "/password"];
const SENSITIVE_MARKERS: &[&str] = &["/admin", "/settings"];

// Client identity: first hop of X-Forwarded-For, then X-Real-IP, then the
// socket peer.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Maps request paths to endpoint profiles with substring rules.
///
/// Profiles are resolved when the classifier is built, so a table missing
/// one of the standard profiles fails at startup.
#[derive(Debug, Clone, Copy)]
pub struct RouteClassifier {
    normal: ProfileId,
    auth: ProfileId,
    api: ProfileId,
    sensitive: ProfileId,
}

impl RouteClassifier {
    pub fn new(table: &PolicyTable) -> Result<Self, ConfigError> {
        Ok(Self {
            normal: table.resolve(NORMAL)?,
            auth: table.resolve(AUTH)?,
            api: table.resolve(API)?,
            sensitive: table.resolve(SENSITIVE)?,
        })
    }

    pub fn classify(&self, path: &str) -> ProfileId {
        let path = path.to_ascii_lowercase();

        if AUTH_MARKERS.iter().any(|m| path.contains(m)) {
            self.auth
        } else if SENSITIVE_MARKERS.iter().any(|m| path.contains(m)) {
            self.sensitive
        } else if path.starts_with("/api") {
            self.api
        } else {
            self.normal
        }
    }
}
