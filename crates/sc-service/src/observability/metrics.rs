//! Metrics definitions for the Subscription Controller per ADR-0011
//!
//! All metrics follow Prometheus naming conventions:
//! - `sc_` prefix for Subscription Controller
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion (ADR-0011):
//! - `priority`: 4 values (critical, high, normal, low)
//! - `reason`: bounded termination reasons (explicit, bulk, expired, revoked, ...)
//! - `outcome`: bounded revalidation outcomes
//! - `operation`: 2 values (resolve_role, resource_liveness)
//!
//! Subscription ids, user ids and resource ids are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// ADR-0011: Must be called before any metrics are recorded.
/// Permission resolution is an internal service call (p95 < 100ms).
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("sc_permission_resolution".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set permission resolution buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

/// Set the number of live subscriptions in the registry.
///
/// Metric: `sc_subscriptions_active`
/// Labels: none
pub fn set_subscriptions_active(count: usize) {
    // usize to f64 conversion is safe for realistic subscription counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("sc_subscriptions_active").set(count as f64);
}

/// Record a subscription establishment.
///
/// Metric: `sc_subscriptions_established_total`
/// Labels: `priority`
pub fn record_subscription_established(priority: &'static str) {
    counter!("sc_subscriptions_established_total", "priority" => priority).increment(1);
}

/// Record subscription removals.
///
/// Metric: `sc_subscriptions_terminated_total`
/// Labels: `reason` (explicit, bulk, expired, inactive, revoked, unknown_type,
/// resolver_error, stale)
pub fn record_subscriptions_terminated(reason: &'static str, count: u64) {
    counter!("sc_subscriptions_terminated_total", "reason" => reason).increment(count);
}

/// Record a revalidation outcome.
///
/// Metric: `sc_revalidations_total`
/// Labels: `outcome` (valid, rate_limited, not_found, unauthorized, unauthenticated, evicted)
pub fn record_revalidation(outcome: &'static str) {
    counter!("sc_revalidations_total", "outcome" => outcome).increment(1);
}

/// Record an admission denial.
///
/// Metric: `sc_admission_denied_total`
/// Labels: `priority`
pub fn record_admission_denied(priority: &'static str) {
    counter!("sc_admission_denied_total", "priority" => priority).increment(1);
}

/// Record subscriptions evicted by the staleness sweeper.
///
/// Metric: `sc_stale_evictions_total`
/// Labels: none
pub fn record_stale_evictions(count: u64) {
    counter!("sc_stale_evictions_total").increment(count);
}

/// Record latency of a permission-resolver call.
///
/// Metric: `sc_permission_resolution_duration_seconds`
/// Labels: `operation` (resolve_role, resource_liveness), `status` (success, error)
pub fn record_permission_resolution(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!(
        "sc_permission_resolution_duration_seconds",
        "operation" => operation,
        "status" => status,
    )
    .record(duration.as_secs_f64());
}

/// Record an HTTP request failure on the subscription API.
///
/// Metric: `sc_errors_total`
/// Labels: `error_type`, `status_code`
pub fn record_error(error_type: &'static str, status_code: u16) {
    counter!(
        "sc_errors_total",
        "error_type" => error_type,
        "status_code" => status_code.to_string(),
    )
    .increment(1);
}
