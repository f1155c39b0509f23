//! Usage Statistics Handler
//!
//! Lets a caller see its plan, limits and how much of today's quota is used.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::middleware::ApiKeyExt;
use crate::AppState;

/// Usage stats response
#[derive(Debug, Serialize, ToSchema)]
pub struct UsageStatsResponse {
    pub plan: String,
    pub requests_per_minute: u32,
    pub quota: DailyQuotaInfo,
}

/// Daily quota information
#[derive(Debug, Serialize, ToSchema)]
pub struct DailyQuotaInfo {
    pub daily_limit: u64,
    pub used: u64,
    pub remaining: u64,
    pub percentage_used: f64,
    pub is_exceeded: bool,
}

impl DailyQuotaInfo {
    pub fn new(used: u64, daily_limit: u64) -> Self {
        let percentage_used = if daily_limit == 0 {
            100.0
        } else {
            (used as f64 / daily_limit as f64) * 100.0
        };

        Self {
            daily_limit,
            used,
            remaining: daily_limit.saturating_sub(used),
            percentage_used,
            is_exceeded: used > daily_limit,
        }
    }
}

/// GET /api/v1/usage - Current plan and daily usage
#[utoipa::path(
    get,
    path = "/api/v1/usage",
    tag = "usage",
    params(("X-Api-Key" = Option<String>, Header, description = "API key")),
    responses(
        (status = 200, description = "Usage for the calling key", body = UsageStatsResponse),
        (status = 401, description = "Missing or invalid API key"),
        (status = 429, description = "Rate limited or daily quota exceeded")
    )
)]
pub async fn get_usage_stats(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let api_key = req.admitted_key().map(|k| k.api_key).unwrap_or_default();

    let pipeline = &state.pipeline;
    let limit = pipeline.limits_for(&api_key);
    let used = pipeline.quota().get_count(&api_key);

    HttpResponse::Ok().json(UsageStatsResponse {
        plan: pipeline.plans().plan_name(&api_key).to_string(),
        requests_per_minute: limit.requests_per_minute,
        quota: DailyQuotaInfo::new(used, limit.daily_limit),
    })
}
