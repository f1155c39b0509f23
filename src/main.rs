//! Image Gate
//!
//! Image processing API with an admission layer in front of it: every
//! request is checked against a per-key token bucket and a daily quota
//! before it reaches a handler. Daily counts reset at local midnight.

use actix_web::{web, App, HttpServer, middleware};
use anyhow::Context;
use tracing::info;
use tracing_actix_web::TracingLogger;
use std::sync::Arc;
use std::time::Instant;

mod admission;
mod api;
mod config;
mod engine;

use crate::admission::{
    AdmissionPipeline, AdmissionStats, DailyQuotaCounter, PlanRegistry, QuotaResetScheduler,
    RateLimiterRegistry,
};
use crate::api::middleware::{ApiKeyValidator, ApiMiddleware};
use crate::config::Settings;
use crate::engine::{ImageEnhancer, ImageProcessor, NullEnhancer, RasterProcessor};

/// Application state shared across all handlers
pub struct AppState {
    pub pipeline: Arc<AdmissionPipeline>,
    pub stats: Arc<AdmissionStats>,
    pub validator: Arc<ApiKeyValidator>,
    pub processor: Arc<dyn ImageProcessor>,
    pub enhancer: Arc<dyn ImageEnhancer>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire plans, limiter, quota counter and processors from settings
    pub fn from_settings(settings: Settings) -> Self {
        let plans = PlanRegistry::new(settings.plans.key_plans(), settings.plans.plan_limits());
        let stats = Arc::new(AdmissionStats::default());

        let pipeline = AdmissionPipeline::new(
            Arc::new(plans),
            Arc::new(RateLimiterRegistry::new()),
            Arc::new(DailyQuotaCounter::new()),
        )
        .with_observer(stats.clone());

        let validator = ApiKeyValidator::new(settings.auth.allowed_api_keys);
        if !validator.is_enabled() {
            tracing::warn!("No API keys configured, authentication is disabled");
        }

        Self {
            pipeline: Arc::new(pipeline),
            stats,
            validator: Arc::new(validator),
            processor: Arc::new(RasterProcessor::new()),
            enhancer: Arc::new(NullEnhancer),
            started_at: Instant::now(),
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("image_gate=info".parse()?)
                .add_directive("actix_web=info".parse()?)
        )
        .json()
        .init();

    // Load configuration
    let settings = Settings::load().context("Failed to load configuration")?;
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);
    let workers = settings.server.workers.unwrap_or_else(|| num_cpus::get() * 2);
    let max_body_bytes = settings.server.max_body_bytes;

    info!(
        "Starting Image Gate v{} on {}",
        env!("CARGO_PKG_VERSION"),
        bind_addr
    );

    let app_state = web::Data::new(AppState::from_settings(settings));

    // Daily counts go back to zero at local midnight
    let scheduler = QuotaResetScheduler::start(app_state.pipeline.quota().clone());

    let pipeline = app_state.pipeline.clone();
    let validator = app_state.validator.clone();

    // Configure and start HTTP server
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(web::PayloadConfig::new(max_body_bytes))
            // Authentication and admission (rate limit + daily quota)
            .wrap(ApiMiddleware::new(pipeline.clone(), validator.clone()))
            // Middleware (order matters - these wrap around ApiMiddleware)
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(
                middleware::DefaultHeaders::new()
                    .add(("X-Service", "image-gate"))
                    .add(("X-Version", env!("CARGO_PKG_VERSION")))
            )
            // Routes
            .configure(api::configure_routes)
    })
    .workers(workers)
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run()
    .await;

    scheduler.stop();
    info!(scheduler = ?scheduler.state(), "Server stopped");

    server.context("Server terminated with an error")
}
