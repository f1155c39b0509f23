//! API Middleware Module
//!
//! Provides authentication, admission control (rate limit + daily quota)
//! and request logging middleware for the image API.

pub mod admission;
pub mod auth;
pub mod service;

pub use auth::{ApiKeyExt, ApiKeyValidator, AdmittedKey, API_KEY_HEADER};
pub use service::ApiMiddleware;
