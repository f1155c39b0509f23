//! Request admission: plan lookup, rate limit, then daily quota

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use utoipa::ToSchema;

use super::limiter::RateLimiterRegistry;
use super::plans::{PlanLimit, PlanRegistry};
use super::quota::DailyQuotaCounter;

/// Outcome of admitting one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionResult {
    /// Forward to the handler. `daily_used` includes this request.
    Admitted { daily_used: u64, daily_limit: u64 },
    /// Per-minute bucket is empty; the daily count was not touched
    RateLimited { retry_after: Duration },
    /// Over today's limit. The rejected request is itself counted.
    QuotaExceeded { daily_used: u64, daily_limit: u64 },
}

/// Receives every admission decision (metrics, audit, ...)
pub trait AdmissionObserver: Send + Sync {
    fn on_decision(&self, api_key: &str, result: &AdmissionResult);
}

/// Running totals of admission decisions
#[derive(Debug, Default)]
pub struct AdmissionStats {
    admitted: AtomicU64,
    rate_limited: AtomicU64,
    quota_exceeded: AtomicU64,
}

/// Point-in-time copy of [`AdmissionStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct AdmissionTotals {
    pub admitted: u64,
    pub rate_limited: u64,
    pub quota_exceeded: u64,
}

impl AdmissionStats {
    pub fn totals(&self) -> AdmissionTotals {
        AdmissionTotals {
            admitted: self.admitted.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            quota_exceeded: self.quota_exceeded.load(Ordering::Relaxed),
        }
    }
}

impl AdmissionObserver for AdmissionStats {
    fn on_decision(&self, _api_key: &str, result: &AdmissionResult) {
        let counter = match result {
            AdmissionResult::Admitted { .. } => &self.admitted,
            AdmissionResult::RateLimited { .. } => &self.rate_limited,
            AdmissionResult::QuotaExceeded { .. } => &self.quota_exceeded,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Ordered, short-circuiting gate in front of the protected handlers
pub struct AdmissionPipeline {
    plans: Arc<PlanRegistry>,
    limiter: Arc<RateLimiterRegistry>,
    quota: Arc<DailyQuotaCounter>,
    observers: Vec<Arc<dyn AdmissionObserver>>,
}

impl AdmissionPipeline {
    pub fn new(
        plans: Arc<PlanRegistry>,
        limiter: Arc<RateLimiterRegistry>,
        quota: Arc<DailyQuotaCounter>,
    ) -> Self {
        Self {
            plans,
            limiter,
            quota,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn AdmissionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Decide whether the request carrying `api_key` may proceed.
    ///
    /// The rate limit is consulted first, so a rate-limited request never
    /// touches the daily count. A request that passes the rate limit is
    /// always counted, including the one that takes the count past the limit.
    pub fn admit(&self, api_key: &str) -> AdmissionResult {
        let limit = self.plans.resolve_limits(api_key);

        let result = match self.limiter.check(api_key, &limit) {
            Err(retry_after) => AdmissionResult::RateLimited { retry_after },
            Ok(()) => {
                let daily_used = self.quota.increment_and_get(api_key);
                if daily_used > limit.daily_limit {
                    AdmissionResult::QuotaExceeded {
                        daily_used,
                        daily_limit: limit.daily_limit,
                    }
                } else {
                    AdmissionResult::Admitted {
                        daily_used,
                        daily_limit: limit.daily_limit,
                    }
                }
            }
        };

        match &result {
            AdmissionResult::Admitted { daily_used, daily_limit } => {
                debug!(daily_used, daily_limit, "Request admitted");
            }
            AdmissionResult::RateLimited { retry_after } => {
                warn!(
                    plan = self.plans.plan_name(api_key),
                    requests_per_minute = limit.requests_per_minute,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Rate limit exceeded"
                );
            }
            AdmissionResult::QuotaExceeded { daily_used, daily_limit } => {
                warn!(
                    plan = self.plans.plan_name(api_key),
                    daily_used,
                    daily_limit,
                    "Daily quota exceeded"
                );
            }
        }

        for observer in &self.observers {
            observer.on_decision(api_key, &result);
        }

        result
    }

    /// Limits that apply to `api_key`
    pub fn limits_for(&self, api_key: &str) -> PlanLimit {
        self.plans.resolve_limits(api_key)
    }

    pub fn limiter(&self) -> &RateLimiterRegistry {
        &self.limiter
    }

    pub fn plans(&self) -> &PlanRegistry {
        &self.plans
    }

    /// Shared handle to the daily counter, for the reset scheduler
    pub fn quota(&self) -> &Arc<DailyQuotaCounter> {
        &self.quota
    }
}
