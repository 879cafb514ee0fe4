//! Subscription Controller facade.
//!
//! [`SubscriptionService`] is constructed once by the host process and wires
//! the registry, lifecycle, revalidation and sweeper components to the
//! external collaborators. It owns no global state: two services built side
//! by side are fully independent.

use crate::admission::AdmissionControl;
use crate::collaborators::{AuditSink, CacheInvalidator, PermissionResolver};
use crate::errors::ScError;
use crate::lifecycle::{BulkTerminateOutcome, EstablishOutcome, EstablishRequest, LifecycleController};
use crate::observability::{PerformanceSnapshot, SubscriptionMetrics};
use crate::registry::{SubscriptionRegistry, DEFAULT_STALENESS_THRESHOLD};
use crate::revalidation::{RevalidationService, ValidationOutcome};
use crate::subscription::Priority;
use crate::sweeper::{StalenessSweeper, DEFAULT_SWEEP_INTERVAL};
use common::types::{SubscriptionId, UserId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Identity of the caller as established by the authenticating layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    user_id: Option<UserId>,
}

impl CallerContext {
    #[must_use]
    pub fn authenticated(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    /// The caller identity, or [`ScError::Unauthenticated`].
    pub fn require_user(&self) -> Result<&UserId, ScError> {
        self.user_id.as_ref().ok_or(ScError::Unauthenticated)
    }
}

/// Timing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Entries not revalidated within this window are evicted by the sweeper.
    pub staleness_threshold: Duration,
    /// Interval between staleness sweeps.
    pub sweep_interval: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            staleness_threshold: DEFAULT_STALENESS_THRESHOLD,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// External collaborators consumed by the service.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn PermissionResolver>,
    pub admission: Arc<dyn AdmissionControl>,
    pub audit: Arc<dyn AuditSink>,
    pub cache: Arc<dyn CacheInvalidator>,
}

/// Caller-scoped subscription statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionStats {
    pub total_active: usize,
    pub by_resource_type: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<&'static str, usize>,
    pub performance_stats: PerformanceSnapshot,
}

/// The Subscription Controller.
pub struct SubscriptionService {
    registry: Arc<SubscriptionRegistry>,
    tracker: Arc<SubscriptionMetrics>,
    lifecycle: LifecycleController,
    revalidation: RevalidationService,
    sweeper: StalenessSweeper,
}

impl SubscriptionService {
    #[must_use]
    pub fn new(settings: ServiceSettings, collaborators: Collaborators) -> Self {
        let Collaborators {
            resolver,
            admission,
            audit,
            cache,
        } = collaborators;

        let tracker = SubscriptionMetrics::new();
        let registry = Arc::new(SubscriptionRegistry::new(
            settings.staleness_threshold,
            Arc::clone(&tracker),
        ));

        let lifecycle = LifecycleController::new(
            Arc::clone(&registry),
            Arc::clone(&resolver),
            Arc::clone(&admission),
            audit,
            Arc::clone(&cache),
            Arc::clone(&tracker),
        );
        let revalidation = RevalidationService::new(
            Arc::clone(&registry),
            resolver,
            Arc::clone(&admission),
            cache,
            Arc::clone(&tracker),
        );
        let sweeper = StalenessSweeper::new(
            Arc::clone(&registry),
            admission,
            Arc::clone(&tracker),
            settings.sweep_interval,
        );

        Self {
            registry,
            tracker,
            lifecycle,
            revalidation,
            sweeper,
        }
    }

    /// Start the staleness sweeper. Must be called from within a Tokio runtime.
    pub fn start(&self) {
        if self.sweeper.start() {
            info!(target: "sc.lifecycle", "Subscription service started");
        }
    }

    /// Stop the staleness sweeper and wait for it to exit.
    pub async fn stop(&self) {
        if self.sweeper.stop().await {
            info!(target: "sc.lifecycle", "Subscription service stopped");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sweeper.is_running()
    }

    pub async fn establish_subscription(
        &self,
        ctx: &CallerContext,
        request: EstablishRequest,
    ) -> Result<EstablishOutcome, ScError> {
        let caller = ctx.require_user()?;
        Ok(self.lifecycle.establish(caller, request).await)
    }

    pub async fn validate_and_update_subscription(
        &self,
        ctx: &CallerContext,
        subscription_id: &SubscriptionId,
    ) -> ValidationOutcome {
        self.revalidation
            .validate_and_update(ctx.user_id(), subscription_id)
            .await
    }

    /// Terminate one of the caller's subscriptions. Unknown or foreign ids
    /// succeed without effect.
    pub async fn terminate_subscription(
        &self,
        ctx: &CallerContext,
        subscription_id: &SubscriptionId,
        reason: Option<String>,
    ) -> Result<(), ScError> {
        let caller = ctx.require_user()?;
        self.lifecycle
            .terminate(caller, subscription_id, reason)
            .await;
        Ok(())
    }

    /// System-invoked bulk termination (e.g. on account removal).
    pub async fn bulk_terminate_user_subscriptions(
        &self,
        user_id: &UserId,
        resource_type: Option<&str>,
        resource_id: Option<&str>,
        reason: &str,
    ) -> BulkTerminateOutcome {
        self.lifecycle
            .bulk_terminate(user_id, resource_type, resource_id, reason)
            .await
    }

    /// Statistics over the caller's own subscriptions plus process-wide
    /// performance counters.
    pub fn get_subscription_stats(&self, ctx: &CallerContext) -> Result<SubscriptionStats, ScError> {
        let caller = ctx.require_user()?;
        let entries = self.registry.get_by_user(caller);

        let mut by_resource_type = BTreeMap::new();
        let mut by_priority: BTreeMap<&'static str, usize> =
            Priority::ALL.iter().map(|p| (p.as_str(), 0)).collect();
        for entry in &entries {
            *by_resource_type
                .entry(entry.resource_type.clone())
                .or_insert(0) += 1;
            *by_priority.entry(entry.priority.as_str()).or_insert(0) += 1;
        }

        Ok(SubscriptionStats {
            total_active: entries.len(),
            by_resource_type,
            by_priority,
            performance_stats: self.tracker.snapshot(),
        })
    }

    /// Run one staleness sweep now. Returns the number of evicted subscriptions.
    pub fn run_staleness_sweep(&self) -> usize {
        self.sweeper.run_once()
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_context() {
        let ctx = CallerContext::authenticated(UserId::from("u1"));
        assert_eq!(ctx.user_id(), Some(&UserId::from("u1")));
        assert_eq!(ctx.require_user().unwrap().as_str(), "u1");

        let anonymous = CallerContext::anonymous();
        assert!(anonymous.user_id().is_none());
        assert!(matches!(
            anonymous.require_user(),
            Err(ScError::Unauthenticated)
        ));
    }

    #[test]
    fn test_default_settings() {
        let settings = ServiceSettings::default();
        assert_eq!(settings.staleness_threshold, Duration::from_secs(600));
        assert_eq!(settings.sweep_interval, Duration::from_secs(300));
    }
}
