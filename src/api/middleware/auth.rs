//! API Key Authentication
//!
//! Reads the API key from the X-Api-Key header and checks it against the
//! configured allow-list. Admitted key info is stored in request extensions
//! for downstream handlers.

use actix_web::{dev::ServiceRequest, HttpMessage};
use std::collections::HashSet;

/// Header name for API key
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Extract API key from request headers
pub fn extract_api_key(req: &ServiceRequest) -> Option<String> {
    req.headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Short, log-safe form of an API key
pub fn redact(api_key: &str) -> String {
    if api_key.is_empty() {
        return "none".to_string();
    }
    let prefix: String = api_key.chars().take(4).collect();
    format!("{prefix}…")
}

/// Allow-list of API keys. An empty list lets every request through.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyValidator {
    allowed: HashSet<String>,
}

impl ApiKeyValidator {
    pub fn new<I: IntoIterator<Item = String>>(keys: I) -> Self {
        Self {
            allowed: keys.into_iter().collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.allowed.is_empty()
    }

    /// `true` if `api_key` may use the API
    pub fn validate(&self, api_key: Option<&str>) -> bool {
        if !self.is_enabled() {
            return true;
        }
        api_key.is_some_and(|key| self.allowed.contains(key))
    }
}

/// Admission outcome for the current request, available to handlers
#[derive(Debug, Clone)]
pub struct AdmittedKey {
    /// Empty when the request carried no key
    pub api_key: String,
    pub plan: String,
    pub daily_used: u64,
    pub daily_limit: u64,
}

/// Access to the admitted key stored in request extensions
pub trait ApiKeyExt {
    fn admitted_key(&self) -> Option<AdmittedKey>;
}

impl<T: HttpMessage> ApiKeyExt for T {
    fn admitted_key(&self) -> Option<AdmittedKey> {
        self.extensions().get::<AdmittedKey>().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_allow_list_disables_auth() {
        let validator = ApiKeyValidator::default();
        assert!(!validator.is_enabled());
        assert!(validator.validate(None));
        assert!(validator.validate(Some("anything")));
    }

    #[test]
    fn test_allow_list() {
        let validator = ApiKeyValidator::new(vec!["good".to_string()]);
        assert!(validator.validate(Some("good")));
        assert!(!validator.validate(Some("GOOD")));
        assert!(!validator.validate(Some("bad")));
        assert!(!validator.validate(None));
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("abcdefgh"), "abcd…");
        assert_eq!(redact(""), "none");
    }
}
