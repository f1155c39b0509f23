//! API Middleware Service
//!
//! Actix-web middleware that combines authentication, admission control
//! and request logging into a single service wrapper.

use actix_web::{
    body::{BoxBody, EitherBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::admission::{AdmissionPipeline, AdmissionResult};
use super::admission::{
    add_quota_headers, quota_exceeded_response, rate_limited_response, unauthorized_response,
};
use super::auth::{extract_api_key, redact, AdmittedKey, ApiKeyValidator};

/// Middleware factory for API authentication and admission
pub struct ApiMiddleware {
    pipeline: Arc<AdmissionPipeline>,
    validator: Arc<ApiKeyValidator>,
    /// Paths that skip authentication and admission
    public_paths: Rc<Vec<String>>,
}

impl ApiMiddleware {
    pub fn new(pipeline: Arc<AdmissionPipeline>, validator: Arc<ApiKeyValidator>) -> Self {
        Self {
            pipeline,
            validator,
            public_paths: Rc::new(vec![
                "/health".to_string(),
                "/swagger-ui".to_string(),
                "/api-docs".to_string(),
            ]),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Transform = ApiMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(ApiMiddlewareService {
            service: Rc::new(service),
            pipeline: self.pipeline.clone(),
            validator: self.validator.clone(),
            public_paths: self.public_paths.clone(),
        })
    }
}

/// The actual middleware service
pub struct ApiMiddlewareService<S> {
    service: Rc<S>,
    pipeline: Arc<AdmissionPipeline>,
    validator: Arc<ApiKeyValidator>,
    public_paths: Rc<Vec<String>>,
}

impl<S> ApiMiddlewareService<S> {
    fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| path.starts_with(p.as_str()))
    }
}

impl<S, B> Service<ServiceRequest> for ApiMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut core::task::Context<'_>) -> core::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let pipeline = self.pipeline.clone();
        let validator = self.validator.clone();
        let is_public = self.is_public_path(req.path());

        Box::pin(async move {
            // Skip auth and admission for public paths
            if is_public {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }

            let start = Instant::now();
            let method = req.method().to_string();
            let path = req.path().to_string();
            let header_key = extract_api_key(&req);

            if !validator.validate(header_key.as_deref()) {
                warn!(method = %method, path = %path, "Missing or invalid API key");
                return Ok(req.into_response(unauthorized_response()).map_into_right_body());
            }

            // Absent key is admitted under the Free plan
            let api_key = header_key.unwrap_or_default();
            let key_label = redact(&api_key);

            let (daily_used, daily_limit) = match pipeline.admit(&api_key) {
                AdmissionResult::Admitted { daily_used, daily_limit } => (daily_used, daily_limit),
                AdmissionResult::RateLimited { retry_after } => {
                    let rpm = pipeline.limits_for(&api_key).requests_per_minute;
                    let response = rate_limited_response(retry_after, rpm);
                    return Ok(req.into_response(response).map_into_right_body());
                }
                AdmissionResult::QuotaExceeded { daily_used, daily_limit } => {
                    let response = quota_exceeded_response(daily_used, daily_limit);
                    return Ok(req.into_response(response).map_into_right_body());
                }
            };

            req.extensions_mut().insert(AdmittedKey {
                plan: pipeline.plans().plan_name(&api_key).to_string(),
                api_key,
                daily_used,
                daily_limit,
            });

            info!(method = %method, path = %path, api_key = %key_label, "Incoming request");

            let res = service.call(req).await?;

            info!(
                method = %method,
                path = %path,
                api_key = %key_label,
                status = res.status().as_u16(),
                elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Completed request"
            );

            let mut res = res.map_into_left_body();
            add_quota_headers(res.headers_mut(), daily_used, daily_limit);

            Ok(res)
        })
    }
}
