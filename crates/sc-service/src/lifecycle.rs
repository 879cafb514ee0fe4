//! Subscription lifecycle: establish, terminate and bulk terminate.
//!
//! Establishment is gated, in order, by role resolution, resource liveness
//! (session-bound kinds only) and admission control. Only a fully admitted
//! subscription reaches the registry. Termination removes the entry first
//! and then emits the side effects: admission release, cache invalidation
//! and an audit record.

use crate::admission::AdmissionControl;
use crate::collaborators::{
    resolve_role_timed, resource_liveness_timed, AuditAction, AuditEvent, AuditMetadata,
    AuditSink, CacheInvalidator, PermissionResolver,
};
use crate::observability::{metrics, SubscriptionMetrics};
use crate::policy::ResourceKind;
use crate::registry::SubscriptionRegistry;
use crate::subscription::{ActiveSubscription, Priority};
use chrono::{DateTime, Utc};
use common::types::{SubscriptionId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Request to establish a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EstablishRequest {
    pub resource_type: String,
    pub resource_id: String,
    /// Client-chosen id; generated when omitted.
    #[serde(default = "SubscriptionId::generate")]
    pub subscription_id: SubscriptionId,
    #[serde(default)]
    pub priority: Priority,
}

/// Why an establishment was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstablishRejection {
    /// The caller has no relationship to the resource.
    NoRelationship,
    /// The session-bound resource is not live.
    ResourceInactive,
    /// Admission control refused the subscription.
    RateLimited,
    /// The permission resolver failed.
    ResolverUnavailable,
    /// The subscription id belongs to another user's live subscription.
    SubscriptionIdInUse,
}

/// Result of an establishment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EstablishOutcome {
    pub success: bool,
    pub subscription_id: SubscriptionId,
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    pub rate_limited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<EstablishRejection>,
}

impl EstablishOutcome {
    fn rejected(subscription_id: SubscriptionId, reason: EstablishRejection) -> Self {
        Self {
            success: false,
            subscription_id,
            permissions: Vec::new(),
            valid_until: None,
            rate_limited: reason == EstablishRejection::RateLimited,
            reason: Some(reason),
        }
    }

    fn admitted(entry: &ActiveSubscription) -> Self {
        Self {
            success: true,
            subscription_id: entry.subscription_id.clone(),
            permissions: entry.permissions.iter().cloned().collect(),
            valid_until: entry.valid_until,
            rate_limited: false,
            reason: None,
        }
    }
}

/// Result of a bulk termination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkTerminateOutcome {
    pub terminated_count: usize,
    pub subscription_ids: Vec<SubscriptionId>,
}

/// Orchestrates registry, admission, audit and cache side effects for
/// subscription creation and removal.
pub struct LifecycleController {
    registry: Arc<SubscriptionRegistry>,
    resolver: Arc<dyn PermissionResolver>,
    admission: Arc<dyn AdmissionControl>,
    audit: Arc<dyn AuditSink>,
    cache: Arc<dyn CacheInvalidator>,
    tracker: Arc<SubscriptionMetrics>,
}

impl LifecycleController {
    #[must_use]
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        resolver: Arc<dyn PermissionResolver>,
        admission: Arc<dyn AdmissionControl>,
        audit: Arc<dyn AuditSink>,
        cache: Arc<dyn CacheInvalidator>,
        tracker: Arc<SubscriptionMetrics>,
    ) -> Self {
        Self {
            registry,
            resolver,
            admission,
            audit,
            cache,
            tracker,
        }
    }

    /// Establish a subscription for `caller`.
    ///
    /// Refusals are reported in the outcome, never as errors.
    #[instrument(
        skip_all,
        name = "sc.lifecycle.establish",
        fields(
            subscription_id = %request.subscription_id,
            resource_type = %request.resource_type,
            priority = request.priority.as_str(),
        )
    )]
    pub async fn establish(&self, caller: &UserId, request: EstablishRequest) -> EstablishOutcome {
        let EstablishRequest {
            resource_type,
            resource_id,
            subscription_id,
            priority,
        } = request;

        if self.is_held_by_other(&subscription_id, caller) {
            return EstablishOutcome::rejected(
                subscription_id,
                EstablishRejection::SubscriptionIdInUse,
            );
        }

        let now = Utc::now();
        let mut valid_until = None;

        let permissions = match ResourceKind::parse(&resource_type) {
            None => {
                debug!(
                    target: "sc.lifecycle",
                    resource_type = %resource_type,
                    "Unknown resource type, establishing without capabilities"
                );
                BTreeSet::new()
            }
            Some(kind) => {
                let role = match resolve_role_timed(
                    self.resolver.as_ref(),
                    kind,
                    &resource_id,
                    caller,
                )
                .await
                {
                    Ok(Some(role)) => role,
                    Ok(None) => {
                        debug!(target: "sc.lifecycle", "Caller has no relationship to resource");
                        return EstablishOutcome::rejected(
                            subscription_id,
                            EstablishRejection::NoRelationship,
                        );
                    }
                    Err(e) => {
                        warn!(
                            target: "sc.lifecycle",
                            error = %e,
                            error_kind = e.kind_label(),
                            "Role resolution failed"
                        );
                        return EstablishOutcome::rejected(
                            subscription_id,
                            EstablishRejection::ResolverUnavailable,
                        );
                    }
                };

                if kind.is_session_bound() {
                    match resource_liveness_timed(self.resolver.as_ref(), kind, &resource_id).await
                    {
                        Ok(liveness) if liveness.is_live_at(now) => valid_until = liveness.ends_at,
                        Ok(_) => {
                            debug!(target: "sc.lifecycle", "Resource is not active");
                            return EstablishOutcome::rejected(
                                subscription_id,
                                EstablishRejection::ResourceInactive,
                            );
                        }
                        Err(e) => {
                            warn!(
                                target: "sc.lifecycle",
                                error = %e,
                                error_kind = e.kind_label(),
                                "Liveness lookup failed"
                            );
                            return EstablishOutcome::rejected(
                                subscription_id,
                                EstablishRejection::ResolverUnavailable,
                            );
                        }
                    }
                }

                self.resolver.capabilities_for(kind, role)
            }
        };

        if !self.admission.can_admit(&subscription_id, priority) {
            self.tracker.record_rate_limited();
            // Budget state is only kept for registered subscriptions.
            if self.registry.get(&subscription_id).is_none() {
                self.admission.release(&subscription_id);
            }
            info!(target: "sc.lifecycle", "Subscription rejected by admission control");
            return EstablishOutcome::rejected(subscription_id, EstablishRejection::RateLimited);
        }

        let entry = ActiveSubscription::established(
            subscription_id,
            caller.clone(),
            resource_type,
            resource_id,
            permissions,
            priority,
            valid_until,
            now,
        );
        let outcome = EstablishOutcome::admitted(&entry);

        if !self.registry.register_unless_foreign(entry.clone()) {
            // Claimed by another user since the first check. The budget
            // entry now belongs to that subscription, so it is not released.
            info!(target: "sc.lifecycle", "Subscription id taken concurrently by another user");
            return EstablishOutcome::rejected(
                entry.subscription_id,
                EstablishRejection::SubscriptionIdInUse,
            );
        }

        self.audit
            .record(AuditEvent {
                actor: caller.clone(),
                resource_type: entry.resource_type,
                resource_id: entry.resource_id,
                action: AuditAction::SubscriptionEstablished,
                metadata: AuditMetadata {
                    subscription_id: entry.subscription_id,
                    permissions: outcome.permissions.clone(),
                    priority,
                    duration_ms: None,
                    reason: None,
                },
                occurred_at: now,
            })
            .await;

        info!(
            target: "sc.lifecycle",
            permissions = outcome.permissions.len(),
            "Subscription established"
        );
        outcome
    }

    /// Terminate a subscription owned by `caller`.
    ///
    /// Returns whether an entry was removed. A missing or foreign entry is a
    /// silent no-op.
    #[instrument(skip_all, name = "sc.lifecycle.terminate", fields(subscription_id = %subscription_id))]
    pub async fn terminate(
        &self,
        caller: &UserId,
        subscription_id: &SubscriptionId,
        reason: Option<String>,
    ) -> bool {
        let Some(entry) = self.registry.unregister_owned(subscription_id, caller) else {
            debug!(target: "sc.lifecycle", "No owned subscription to terminate");
            return false;
        };

        metrics::record_subscriptions_terminated("explicit", 1);
        self.finish_removal(entry, AuditAction::SubscriptionTerminated, reason)
            .await;

        info!(target: "sc.lifecycle", "Subscription terminated");
        true
    }

    /// Terminate every subscription of `user_id`, optionally narrowed to a
    /// resource type and/or resource id.
    #[instrument(skip_all, name = "sc.lifecycle.bulk_terminate", fields(user_id = %user_id))]
    pub async fn bulk_terminate(
        &self,
        user_id: &UserId,
        resource_type: Option<&str>,
        resource_id: Option<&str>,
        reason: &str,
    ) -> BulkTerminateOutcome {
        let targets: Vec<SubscriptionId> = self
            .registry
            .get_by_user(user_id)
            .into_iter()
            .filter(|entry| resource_type.map_or(true, |t| entry.resource_type == t))
            .filter(|entry| resource_id.map_or(true, |id| entry.resource_id == id))
            .map(|entry| entry.subscription_id)
            .collect();

        let mut subscription_ids = Vec::with_capacity(targets.len());
        for subscription_id in targets {
            // Entries removed concurrently since the lookup are skipped.
            let Some(entry) = self.registry.unregister_owned(&subscription_id, user_id) else {
                continue;
            };
            self.finish_removal(
                entry,
                AuditAction::SubscriptionBulkTerminated,
                Some(reason.to_string()),
            )
            .await;
            subscription_ids.push(subscription_id);
        }
        subscription_ids.sort();

        let terminated_count = subscription_ids.len();
        if terminated_count > 0 {
            metrics::record_subscriptions_terminated("bulk", terminated_count as u64);
        }

        info!(
            target: "sc.lifecycle",
            terminated_count,
            reason,
            "Bulk termination complete"
        );

        BulkTerminateOutcome {
            terminated_count,
            subscription_ids,
        }
    }

    fn is_held_by_other(&self, subscription_id: &SubscriptionId, caller: &UserId) -> bool {
        let held = self
            .registry
            .get(subscription_id)
            .is_some_and(|existing| !existing.is_owned_by(caller));
        if held {
            warn!(
                target: "sc.lifecycle",
                "Subscription id already held by another user"
            );
        }
        held
    }

    async fn finish_removal(
        &self,
        entry: ActiveSubscription,
        action: AuditAction,
        reason: Option<String>,
    ) {
        let now = Utc::now();
        self.admission.release(&entry.subscription_id);
        self.tracker.record_terminated(1);
        self.cache.invalidate(&entry.resource_id).await;

        let duration_ms = (now - entry.established_at).num_milliseconds();
        self.audit
            .record(AuditEvent {
                actor: entry.user_id,
                resource_type: entry.resource_type,
                resource_id: entry.resource_id,
                action,
                metadata: AuditMetadata {
                    subscription_id: entry.subscription_id,
                    permissions: entry.permissions.into_iter().collect(),
                    priority: entry.priority,
                    duration_ms: Some(duration_ms),
                    reason,
                },
                occurred_at: now,
            })
            .await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_establish_request_defaults_priority() {
        let request: EstablishRequest = serde_json::from_value(json!({
            "resource_type": "meetings",
            "resource_id": "m-1",
            "subscription_id": "sub-1",
        }))
        .unwrap();

        assert_eq!(request.priority, Priority::Normal);
        assert_eq!(request.subscription_id.as_str(), "sub-1");
    }

    #[test]
    fn test_rejected_outcome_shape() {
        let outcome =
            EstablishOutcome::rejected(SubscriptionId::from("sub-1"), EstablishRejection::RateLimited);
        let value = serde_json::to_value(&outcome).unwrap();

        assert_eq!(
            value,
            json!({
                "success": false,
                "subscription_id": "sub-1",
                "permissions": [],
                "rate_limited": true,
                "reason": "rate_limited",
            })
        );
    }

    #[test]
    fn test_only_admission_rejection_is_rate_limited() {
        for reason in [
            EstablishRejection::NoRelationship,
            EstablishRejection::ResourceInactive,
            EstablishRejection::ResolverUnavailable,
            EstablishRejection::SubscriptionIdInUse,
        ] {
            let outcome = EstablishOutcome::rejected(SubscriptionId::from("s"), reason);
            assert!(!outcome.rate_limited);
            assert!(!outcome.success);
        }
    }
}
