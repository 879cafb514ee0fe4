//! Observability module for the Subscription Controller
//!
//! Implements metrics and instrumentation per ADR-0011 (Observability Framework).
//!
//! # Privacy by Default
//!
//! All instrumentation uses `#[instrument(skip_all)]` and explicit safe field
//! allow-listing. Subscription, user and resource identifiers appear in log
//! fields but never as metric labels.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `sc_subscriptions_active` | Gauge | none | Live registry entries |
//! | `sc_subscriptions_established_total` | Counter | `priority` | Successful establishments |
//! | `sc_subscriptions_terminated_total` | Counter | `reason` | Removals by cause |
//! | `sc_revalidations_total` | Counter | `outcome` | Revalidation results |
//! | `sc_admission_denied_total` | Counter | `priority` | Admission control rejections |
//! | `sc_stale_evictions_total` | Counter | none | Staleness sweeper evictions |
//! | `sc_permission_resolution_duration_seconds` | Histogram | `operation`, `status` | Resolver latency |
//! | `sc_errors_total` | Counter | `error_type`, `status_code` | API request failures |

pub mod health;
pub mod metrics;
pub mod performance;

// Re-exports for convenience
pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
pub use performance::{PerformanceSnapshot, SubscriptionMetrics};
