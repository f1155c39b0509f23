//! API module - HTTP routes and handlers

pub mod handlers;
pub mod middleware;
pub mod openapi;

use actix_web::web;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::openapi::ApiDoc;

/// Configure all API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::scope("/images")
                    // More specific routes first
                    .route("/crop/rounded", web::post().to(handlers::images::crop_rounded))
                    .route("/crop", web::post().to(handlers::images::crop))
                    .route("/resize", web::post().to(handlers::images::resize))
                    .route("/convert", web::post().to(handlers::images::convert))
                    .route("/filter", web::post().to(handlers::images::filter))
                    .route("/watermark", web::post().to(handlers::images::watermark))
                    .route("/enhance", web::post().to(handlers::images::enhance))
            )
            .route("/usage", web::get().to(handlers::usage::get_usage_stats))
    )
    .route("/health", web::get().to(handlers::health::health_check))
    // Swagger UI and OpenAPI spec
    .service(
        SwaggerUi::new("/swagger-ui/{_:.*}")
            .url("/api-docs/openapi.json", ApiDoc::openapi())
    );
}
