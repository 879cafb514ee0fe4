//! Validate-and-update read path.
//!
//! Re-asks the permission resolver and admission control about one live
//! subscription and either refreshes the registry entry in place or evicts
//! it. Every outcome is encoded in [`ValidationOutcome`]; nothing here
//! raises, and nothing is written outside the registry.
//!
//! Admission exhaustion is reported as `rate_limited` on a still-valid
//! subscription. It never evicts.

use crate::admission::AdmissionControl;
use crate::collaborators::{
    resolve_role_timed, resource_liveness_timed, CacheInvalidator, PermissionResolver,
    ResolveError,
};
use crate::observability::{metrics, SubscriptionMetrics};
use crate::policy::ResourceKind;
use crate::registry::SubscriptionRegistry;
use crate::subscription::ActiveSubscription;
use chrono::{DateTime, Utc};
use common::types::{SubscriptionId, UserId};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Why a subscription is no longer valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InvalidReason {
    #[serde(rename = "unauthenticated")]
    Unauthenticated,
    #[serde(rename = "not found")]
    NotFound,
    #[serde(rename = "unauthorized")]
    Unauthorized,
    #[serde(rename = "resource expired")]
    ResourceExpired,
    #[serde(rename = "unknown resource type")]
    UnknownResourceType,
    #[serde(rename = "access revoked")]
    AccessRevoked,
    #[serde(rename = "resource no longer active")]
    ResourceInactive,
    #[serde(rename = "permission check failed")]
    ResolverFailed,
}

impl InvalidReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::Unauthenticated => "unauthenticated",
            InvalidReason::NotFound => "not found",
            InvalidReason::Unauthorized => "unauthorized",
            InvalidReason::ResourceExpired => "resource expired",
            InvalidReason::UnknownResourceType => "unknown resource type",
            InvalidReason::AccessRevoked => "access revoked",
            InvalidReason::ResourceInactive => "resource no longer active",
            InvalidReason::ResolverFailed => "permission check failed",
        }
    }

    /// Label for `sc_subscriptions_terminated_total` when this reason evicts.
    const fn eviction_label(self) -> &'static str {
        match self {
            InvalidReason::ResourceExpired => "expired",
            InvalidReason::UnknownResourceType => "unknown_type",
            InvalidReason::AccessRevoked => "revoked",
            InvalidReason::ResourceInactive => "inactive",
            InvalidReason::ResolverFailed => "resolver_error",
            InvalidReason::Unauthenticated
            | InvalidReason::NotFound
            | InvalidReason::Unauthorized => "none",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of validate-and-update.
///
/// `resource_type` and `resource_id` are only filled in once the caller is
/// known to own the subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    pub rate_limited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,
    pub should_reconnect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl ValidationOutcome {
    fn valid(
        entry: &ActiveSubscription,
        permissions: &BTreeSet<String>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            valid: true,
            permissions: permissions.iter().cloned().collect(),
            valid_until,
            rate_limited: false,
            reason: None,
            should_reconnect: false,
            resource_type: Some(entry.resource_type.clone()),
            resource_id: Some(entry.resource_id.clone()),
        }
    }

    fn rate_limited(entry: &ActiveSubscription) -> Self {
        Self {
            rate_limited: true,
            ..Self::valid(entry, &entry.permissions, entry.valid_until)
        }
    }

    /// Refusal that reveals nothing about the subscription.
    fn invalid(reason: InvalidReason) -> Self {
        Self {
            valid: false,
            permissions: Vec::new(),
            valid_until: None,
            rate_limited: false,
            reason: Some(reason),
            should_reconnect: false,
            resource_type: None,
            resource_id: None,
        }
    }

    /// Eviction of a subscription the caller owns.
    fn evicted(entry: &ActiveSubscription, reason: InvalidReason, should_reconnect: bool) -> Self {
        Self {
            should_reconnect,
            resource_type: Some(entry.resource_type.clone()),
            resource_id: Some(entry.resource_id.clone()),
            ..Self::invalid(reason)
        }
    }
}

/// On-demand revalidation of live subscriptions.
pub struct RevalidationService {
    registry: Arc<SubscriptionRegistry>,
    resolver: Arc<dyn PermissionResolver>,
    admission: Arc<dyn AdmissionControl>,
    cache: Arc<dyn CacheInvalidator>,
    tracker: Arc<SubscriptionMetrics>,
}

impl RevalidationService {
    #[must_use]
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        resolver: Arc<dyn PermissionResolver>,
        admission: Arc<dyn AdmissionControl>,
        cache: Arc<dyn CacheInvalidator>,
        tracker: Arc<SubscriptionMetrics>,
    ) -> Self {
        Self {
            registry,
            resolver,
            admission,
            cache,
            tracker,
        }
    }

    /// Re-check one subscription and refresh or evict it.
    #[instrument(skip_all, name = "sc.revalidation.validate", fields(subscription_id = %subscription_id))]
    pub async fn validate_and_update(
        &self,
        caller: Option<&UserId>,
        subscription_id: &SubscriptionId,
    ) -> ValidationOutcome {
        let outcome = self.check(caller, subscription_id).await;

        self.tracker.record_revalidation();
        let label = if outcome.rate_limited {
            "rate_limited"
        } else if outcome.valid {
            "valid"
        } else {
            match outcome.reason {
                Some(InvalidReason::Unauthenticated) => "unauthenticated",
                Some(InvalidReason::NotFound) => "not_found",
                Some(InvalidReason::Unauthorized) => "unauthorized",
                _ => "evicted",
            }
        };
        metrics::record_revalidation(label);

        outcome
    }

    async fn check(
        &self,
        caller: Option<&UserId>,
        subscription_id: &SubscriptionId,
    ) -> ValidationOutcome {
        let Some(caller) = caller else {
            return ValidationOutcome::invalid(InvalidReason::Unauthenticated);
        };

        let Some(entry) = self.registry.get(subscription_id) else {
            return ValidationOutcome::invalid(InvalidReason::NotFound);
        };

        if !entry.is_owned_by(caller) {
            warn!(target: "sc.revalidation", "Revalidation by non-owner rejected");
            return ValidationOutcome::invalid(InvalidReason::Unauthorized);
        }

        if entry.is_expired_at(Utc::now()) {
            return self.evict(&entry, InvalidReason::ResourceExpired, false).await;
        }

        if !self.admission.can_admit(subscription_id, entry.priority) {
            self.tracker.record_rate_limited();
            debug!(target: "sc.revalidation", "Revalidation rate limited, keeping permissions");
            return ValidationOutcome::rate_limited(&entry);
        }

        let Some(kind) = ResourceKind::parse(&entry.resource_type) else {
            return self
                .evict(&entry, InvalidReason::UnknownResourceType, false)
                .await;
        };

        let (permissions, valid_until) = match self.resolve(kind, &entry, caller).await {
            Ok(Resolution::Granted {
                permissions,
                valid_until,
            }) => (permissions, valid_until),
            Ok(Resolution::Revoked) => {
                return self.evict(&entry, InvalidReason::AccessRevoked, false).await;
            }
            Ok(Resolution::Inactive) => {
                return self.evict(&entry, InvalidReason::ResourceInactive, false).await;
            }
            Err(e) => {
                warn!(
                    target: "sc.revalidation",
                    error = %e,
                    error_kind = e.kind_label(),
                    "Permission check failed, evicting subscription"
                );
                return self
                    .evict(&entry, InvalidReason::ResolverFailed, !e.is_resource_gone())
                    .await;
            }
        };

        if permissions != entry.permissions {
            info!(
                target: "sc.revalidation",
                before = entry.permissions.len(),
                after = permissions.len(),
                "Permissions changed"
            );
            if !self
                .registry
                .update_permissions(subscription_id, caller, permissions.clone())
            {
                return ValidationOutcome::invalid(InvalidReason::NotFound);
            }
        }
        if !self
            .registry
            .mark_validated(subscription_id, caller, valid_until)
        {
            return ValidationOutcome::invalid(InvalidReason::NotFound);
        }

        ValidationOutcome::valid(&entry, &permissions, valid_until)
    }

    async fn resolve(
        &self,
        kind: ResourceKind,
        entry: &ActiveSubscription,
        caller: &UserId,
    ) -> Result<Resolution, ResolveError> {
        let Some(role) =
            resolve_role_timed(self.resolver.as_ref(), kind, &entry.resource_id, caller).await?
        else {
            return Ok(Resolution::Revoked);
        };
        let permissions = self.resolver.capabilities_for(kind, role);

        if !kind.is_session_bound() {
            return Ok(Resolution::Granted {
                permissions,
                valid_until: entry.valid_until,
            });
        }

        let liveness =
            resource_liveness_timed(self.resolver.as_ref(), kind, &entry.resource_id).await?;
        if !liveness.is_live_at(Utc::now()) {
            return Ok(Resolution::Inactive);
        }

        Ok(Resolution::Granted {
            permissions,
            valid_until: liveness.ends_at,
        })
    }

    async fn evict(
        &self,
        entry: &ActiveSubscription,
        reason: InvalidReason,
        should_reconnect: bool,
    ) -> ValidationOutcome {
        // Only the entry that was checked; a re-established id is left alone.
        if self
            .registry
            .unregister_owned(&entry.subscription_id, &entry.user_id)
            .is_some()
        {
            self.admission.release(&entry.subscription_id);
            self.tracker.record_evicted_on_revalidation();
            metrics::record_subscriptions_terminated(reason.eviction_label(), 1);
            self.cache.invalidate(&entry.resource_id).await;
        }

        info!(
            target: "sc.revalidation",
            reason = reason.as_str(),
            should_reconnect,
            "Subscription evicted on revalidation"
        );
        ValidationOutcome::evicted(entry, reason, should_reconnect)
    }
}

enum Resolution {
    Granted {
        permissions: BTreeSet<String>,
        valid_until: Option<DateTime<Utc>>,
    },
    Revoked,
    Inactive,
}
