/// Request header helpers
use axum::http::HeaderMap;

/// Header carrying an optional client device identifier on login
pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Extract the device id header, if present and printable
pub fn extract_device_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(DEVICE_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}
