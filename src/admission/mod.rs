//! Request admission layer
//!
//! Enforces per-API-key usage policy before any image work happens:
//! - Plan tier resolution (unknown keys fall back to Free)
//! - Per-minute token bucket rate limiting
//! - Calendar-day quota with a midnight reset

mod limiter;
mod pipeline;
mod plans;
mod quota;
mod scheduler;

pub use limiter::RateLimiterRegistry;
pub use pipeline::{AdmissionPipeline, AdmissionResult, AdmissionStats, AdmissionTotals};
pub use plans::{PlanLimit, PlanRegistry};
pub use quota::DailyQuotaCounter;
pub use scheduler::QuotaResetScheduler;
