//! Health check endpoint

use actix_web::{web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use crate::admission::AdmissionTotals;
use crate::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    /// Keys with a daily count since the last reset
    pub keys_counted_today: usize,
    /// Keys holding a rate limit bucket
    pub rate_limited_keys: usize,
    pub admissions: AdmissionTotals,
}

/// GET /health - Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let response = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        keys_counted_today: state.pipeline.quota().tracked_keys(),
        rate_limited_keys: state.pipeline.limiter().tracked_keys(),
        admissions: state.stats.totals(),
    };

    HttpResponse::Ok().json(response)
}
