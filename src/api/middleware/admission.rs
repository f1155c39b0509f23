//! Admission responses
//!
//! Turns [`AdmissionResult`] rejections into 429 responses and decorates
//! admitted responses with daily quota headers.

use actix_web::{
    http::header::{HeaderMap, HeaderName, HeaderValue},
    HttpResponse,
};
use std::time::Duration;

/// Daily quota headers
pub const DAILY_QUOTA_USED: &str = "X-Daily-Quota-Used";
pub const DAILY_QUOTA_LIMIT: &str = "X-Daily-Quota-Limit";
pub const RETRY_AFTER: &str = "Retry-After";

/// Whole seconds a client should wait, never less than one
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    retry_after.as_secs_f64().ceil().max(1.0) as u64
}

/// 429 for an empty token bucket
pub fn rate_limited_response(retry_after: Duration, requests_per_minute: u32) -> HttpResponse {
    let seconds = retry_after_secs(retry_after);

    HttpResponse::TooManyRequests()
        .insert_header((RETRY_AFTER, seconds.to_string()))
        .json(serde_json::json!({
            "error": "rate_limit_exceeded",
            "message": format!("Rate limit exceeded. Maximum {} requests per minute.", requests_per_minute),
            "retry_after_seconds": seconds
        }))
}

/// 429 for an exhausted daily quota
pub fn quota_exceeded_response(daily_used: u64, daily_limit: u64) -> HttpResponse {
    HttpResponse::TooManyRequests()
        .insert_header((DAILY_QUOTA_USED, daily_used.to_string()))
        .insert_header((DAILY_QUOTA_LIMIT, daily_limit.to_string()))
        .json(serde_json::json!({
            "error": "quota_exceeded",
            "message": "Daily quota exceeded.",
            "quota": daily_limit,
            "usage": daily_used
        }))
}

/// 401 for a missing or unknown key
pub fn unauthorized_response() -> HttpResponse {
    HttpResponse::Unauthorized().json(serde_json::json!({
        "error": "unauthorized",
        "message": "Missing or invalid API key."
    }))
}

/// Add daily quota headers to an admitted response
pub fn add_quota_headers(headers: &mut HeaderMap, daily_used: u64, daily_limit: u64) {
    if let Ok(name) = HeaderName::try_from(DAILY_QUOTA_USED) {
        headers.insert(name, HeaderValue::from(daily_used));
    }
    if let Ok(name) = HeaderName::try_from(DAILY_QUOTA_LIMIT) {
        headers.insert(name, HeaderValue::from(daily_limit));
    }
}
