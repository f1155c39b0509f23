//! Plan tiers and API key -> limit resolution

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use utoipa::ToSchema;

/// Name of the plan every unknown key falls back to
pub const FREE_PLAN: &str = "Free";

/// Free plan limits used when configuration does not define one
pub const FREE_PLAN_FALLBACK: PlanLimit = PlanLimit {
    requests_per_minute: 30,
    daily_limit: 500,
};

/// Limits attached to a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlanLimit {
    /// Token bucket capacity, refilled in full every 60 seconds
    pub requests_per_minute: u32,
    /// Admitted requests per calendar day
    pub daily_limit: u64,
}

impl PlanLimit {
    pub const fn new(requests_per_minute: u32, daily_limit: u64) -> Self {
        Self { requests_per_minute, daily_limit }
    }
}

/// Static key -> plan -> limit lookup, built once at startup.
#[derive(Debug, Clone)]
pub struct PlanRegistry {
    key_plans: HashMap<String, String>,
    plan_limits: HashMap<String, PlanLimit>,
    free: PlanLimit,
}

impl PlanRegistry {
    pub fn new(
        key_plans: HashMap<String, String>,
        plan_limits: HashMap<String, PlanLimit>,
    ) -> Self {
        let free = plan_limits
            .get(FREE_PLAN)
            .copied()
            .unwrap_or(FREE_PLAN_FALLBACK);

        let dangling = key_plans
            .values()
            .filter(|plan| !plan_limits.contains_key(plan.as_str()))
            .count();

        info!(
            keys = key_plans.len(),
            plans = plan_limits.len(),
            free_configured = plan_limits.contains_key(FREE_PLAN),
            dangling_assignments = dangling,
            "Plan registry initialized"
        );

        Self { key_plans, plan_limits, free }
    }

    /// Limits for `api_key`. Unknown keys, and keys whose plan is not
    /// configured, get the Free plan.
    pub fn resolve_limits(&self, api_key: &str) -> PlanLimit {
        self.key_plans
            .get(api_key)
            .and_then(|plan| self.plan_limits.get(plan))
            .copied()
            .unwrap_or_else(|| {
                debug!("Key resolved to free plan");
                self.free
            })
    }

    /// Plan name for `api_key` as it will be enforced
    pub fn plan_name(&self, api_key: &str) -> &str {
        match self.key_plans.get(api_key) {
            Some(plan) if self.plan_limits.contains_key(plan) => plan,
            _ => FREE_PLAN,
        }
    }
}

impl Default for PlanRegistry {
    fn default() -> Self {
        Self::new(HashMap::new(), HashMap::new())
    }
}
