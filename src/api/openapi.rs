//! OpenAPI 3.0 specification definition

use utoipa::OpenApi;

use crate::admission::{AdmissionTotals, PlanLimit};
use crate::api::handlers::{
    health::HealthResponse,
    images::{ApiError, ErrorResponse},
    usage::{DailyQuotaInfo, UsageStatsResponse},
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Image Gate API",
        version = "1.0.0",
        description = "Image processing API with per-key rate limiting and daily quotas",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "system", description = "System health and status endpoints"),
        (name = "images", description = "Image processing endpoints"),
        (name = "usage", description = "Plan and daily quota for the calling key")
    ),
    paths(
        crate::api::handlers::health::health_check,
        crate::api::handlers::usage::get_usage_stats,
        crate::api::handlers::images::resize,
        crate::api::handlers::images::crop,
        crate::api::handlers::images::crop_rounded,
        crate::api::handlers::images::convert,
        crate::api::handlers::images::filter,
        crate::api::handlers::images::watermark,
        crate::api::handlers::images::enhance,
    ),
    components(
        schemas(
            HealthResponse,
            AdmissionTotals,
            UsageStatsResponse,
            DailyQuotaInfo,
            PlanLimit,
            ErrorResponse,
            ApiError,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_image_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        assert!(paths.iter().any(|p| *p == "/api/v1/images/crop/rounded"));
        assert!(paths.iter().any(|p| *p == "/api/v1/images/watermark"));
        assert!(paths.iter().any(|p| *p == "/api/v1/usage"));
        assert!(paths.iter().any(|p| *p == "/health"));
    }
}
