//! External collaborators of the Subscription Controller.
//!
//! The controller consumes three services it does not implement:
//!
//! - [`PermissionResolver`]: role resolution and resource liveness (the
//!   authorization oracle owned by the resource service)
//! - [`AuditSink`]: append-only audit trail
//! - [`CacheInvalidator`]: best-effort signal to downstream caches
//!
//! These calls are the only points where the subscription paths may suspend.
//! Admission control is a separate, synchronous seam (see [`crate::admission`]).

use crate::observability::metrics;
use crate::policy::{capabilities_for, ResourceKind, Role};
use crate::subscription::Priority;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{SubscriptionId, UserId};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Instant;
use thiserror::Error;
use tracing::info;

/// Failure kinds reported by the permission resolver.
///
/// The read path derives `should_reconnect` from the variant: a resource
/// that is gone must not be retried, anything else may be.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The resource no longer exists (deleted, purged).
    #[error("resource not found")]
    ResourceGone,

    /// The resolver could not be reached or answered with a server error.
    #[error("permission service unavailable: {0}")]
    Unavailable(String),

    /// The resolver answered with something that could not be interpreted.
    #[error("invalid permission service response: {0}")]
    InvalidResponse(String),
}

impl ResolveError {
    /// Whether the failure means the resource itself is gone.
    #[must_use]
    pub fn is_resource_gone(&self) -> bool {
        matches!(self, ResolveError::ResourceGone)
    }

    /// Returns a bounded label for metrics.
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            ResolveError::ResourceGone => "resource_gone",
            ResolveError::Unavailable(_) => "unavailable",
            ResolveError::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Liveness of a session-bound resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLiveness {
    pub active: bool,
    /// Scheduled end of the session, if known.
    pub ends_at: Option<DateTime<Utc>>,
}

impl ResourceLiveness {
    /// An active resource with an optional scheduled end.
    #[must_use]
    pub fn active(ends_at: Option<DateTime<Utc>>) -> Self {
        Self {
            active: true,
            ends_at,
        }
    }

    /// A resource whose session has ended.
    #[must_use]
    pub fn ended() -> Self {
        Self {
            active: false,
            ends_at: None,
        }
    }

    /// Active and not past its scheduled end at `now`.
    #[must_use]
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.ends_at.map_or(true, |end| end > now)
    }
}

/// Authorization oracle for subscribable resources.
#[async_trait]
pub trait PermissionResolver: Send + Sync {
    /// Resolve the caller's role on a resource.
    ///
    /// Returns `Ok(None)` when the caller has no relationship to the resource.
    async fn resolve_role(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        caller: &UserId,
    ) -> Result<Option<Role>, ResolveError>;

    /// Capabilities for a resolved role. Pure; defaults to the built-in table.
    fn capabilities_for(&self, kind: ResourceKind, role: Role) -> BTreeSet<String> {
        capabilities_for(kind, role)
    }

    /// Liveness of a session-bound resource. Only called for kinds where
    /// [`ResourceKind::is_session_bound`] is true.
    async fn resource_liveness(
        &self,
        kind: ResourceKind,
        resource_id: &str,
    ) -> Result<ResourceLiveness, ResolveError>;
}

/// Audited subscription actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SubscriptionEstablished,
    SubscriptionTerminated,
    SubscriptionBulkTerminated,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            AuditAction::SubscriptionEstablished => "subscription_established",
            AuditAction::SubscriptionTerminated => "subscription_terminated",
            AuditAction::SubscriptionBulkTerminated => "subscription_bulk_terminated",
        }
    }
}

/// Metadata carried by an audit event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditMetadata {
    pub subscription_id: SubscriptionId,
    pub permissions: Vec<String>,
    pub priority: Priority,
    /// Lived duration in milliseconds (termination events only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub actor: UserId,
    pub resource_type: String,
    pub resource_id: String,
    pub action: AuditAction,
    pub metadata: AuditMetadata,
    pub occurred_at: DateTime<Utc>,
}

/// Append-only audit sink. Implementations swallow their own failures.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Best-effort downstream cache invalidation keyed by resource id.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, resource_id: &str);
}

/// Audit sink that emits each event as a structured log record on `sc.audit`.
///
/// Durable audit storage belongs to the log pipeline, not to this service.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        info!(
            target: "sc.audit",
            actor = %event.actor,
            resource_type = %event.resource_type,
            resource_id = %event.resource_id,
            action = event.action.as_str(),
            occurred_at = %event.occurred_at.to_rfc3339(),
            metadata = %metadata,
            "Subscription audit event"
        );
    }
}

/// Resolve a role through `resolver`, recording resolver latency.
pub(crate) async fn resolve_role_timed(
    resolver: &dyn PermissionResolver,
    kind: ResourceKind,
    resource_id: &str,
    caller: &UserId,
) -> Result<Option<Role>, ResolveError> {
    let start = Instant::now();
    let result = resolver.resolve_role(kind, resource_id, caller).await;
    metrics::record_permission_resolution("resolve_role", status_label(&result), start.elapsed());
    result
}

/// Fetch resource liveness through `resolver`, recording resolver latency.
pub(crate) async fn resource_liveness_timed(
    resolver: &dyn PermissionResolver,
    kind: ResourceKind,
    resource_id: &str,
) -> Result<ResourceLiveness, ResolveError> {
    let start = Instant::now();
    let result = resolver.resource_liveness(kind, resource_id).await;
    metrics::record_permission_resolution(
        "resource_liveness",
        status_label(&result),
        start.elapsed(),
    );
    result
}

fn status_label<T>(result: &Result<T, ResolveError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(_) => "error",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_resource_gone_classification() {
        assert!(ResolveError::ResourceGone.is_resource_gone());
        assert!(!ResolveError::Unavailable("timeout".to_string()).is_resource_gone());
        assert!(!ResolveError::InvalidResponse("bad json".to_string()).is_resource_gone());
    }

    #[test]
    fn test_resolve_error_display() {
        assert_eq!(ResolveError::ResourceGone.to_string(), "resource not found");
        assert_eq!(
            ResolveError::Unavailable("connection refused".to_string()).to_string(),
            "permission service unavailable: connection refused"
        );
    }

    #[test]
    fn test_liveness_respects_scheduled_end() {
        let now = Utc::now();
        assert!(ResourceLiveness::active(None).is_live_at(now));
        assert!(ResourceLiveness::active(Some(now + Duration::minutes(30))).is_live_at(now));
        assert!(!ResourceLiveness::active(Some(now - Duration::seconds(1))).is_live_at(now));
        assert!(!ResourceLiveness::ended().is_live_at(now));
    }

    #[test]
    fn test_audit_action_labels_match_serde() {
        for action in [
            AuditAction::SubscriptionEstablished,
            AuditAction::SubscriptionTerminated,
            AuditAction::SubscriptionBulkTerminated,
        ] {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.as_str()));
        }
    }

    #[test]
    fn test_audit_metadata_omits_absent_fields() {
        let metadata = AuditMetadata {
            subscription_id: SubscriptionId::from("sub-1"),
            permissions: vec!["meeting:read".to_string()],
            priority: Priority::High,
            duration_ms: None,
            reason: None,
        };

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["subscription_id"], "sub-1");
        assert_eq!(json["priority"], "high");
        assert!(json.get("duration_ms").is_none());
        assert!(json.get("reason").is_none());
    }

    #[tokio::test]
    async fn test_tracing_audit_sink_accepts_events() {
        let sink = TracingAuditSink;
        sink.record(AuditEvent {
            actor: UserId::from("user-1"),
            resource_type: "meetings".to_string(),
            resource_id: "meeting-1".to_string(),
            action: AuditAction::SubscriptionEstablished,
            metadata: AuditMetadata {
                subscription_id: SubscriptionId::from("sub-1"),
                permissions: vec![],
                priority: Priority::Normal,
                duration_ms: None,
                reason: None,
            },
            occurred_at: Utc::now(),
        })
        .await;
    }
}
