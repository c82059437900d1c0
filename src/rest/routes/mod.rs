//! Route handlers for the REST API.

pub mod health;
pub mod projects;
pub mod sessions;

use axum::http::HeaderMap;
use uuid::Uuid;

/// Correlation id for callbacks: the caller's `X-Request-ID`, or a fresh one
pub(crate) fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
