//! Test fixtures: a wired-up service harness, requests and registry entries.

use crate::mock_admission::MockAdmission;
use crate::mock_resolver::MockPermissionResolver;
use crate::mock_sinks::{RecordingAuditSink, RecordingCacheInvalidator};
use chrono::{DateTime, Duration, Utc};
use common::types::{SubscriptionId, UserId};
use sc_service::lifecycle::EstablishRequest;
use sc_service::service::{CallerContext, Collaborators, ServiceSettings, SubscriptionService};
use sc_service::subscription::{ActiveSubscription, Priority};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A [`SubscriptionService`] wired to mock collaborators, with handles to
/// each mock for scripting and assertions.
pub struct TestHarness {
    pub service: Arc<SubscriptionService>,
    pub resolver: Arc<MockPermissionResolver>,
    pub admission: Arc<MockAdmission>,
    pub audit: Arc<RecordingAuditSink>,
    pub cache: Arc<RecordingCacheInvalidator>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Harness with default settings and an admitting admission mock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(ServiceSettings::default())
    }

    #[must_use]
    pub fn with_settings(settings: ServiceSettings) -> Self {
        let resolver = Arc::new(MockPermissionResolver::new());
        let admission = Arc::new(MockAdmission::admitting());
        let audit = Arc::new(RecordingAuditSink::new());
        let cache = Arc::new(RecordingCacheInvalidator::new());

        let service = Arc::new(SubscriptionService::new(
            settings,
            Collaborators {
                resolver: resolver.clone(),
                admission: admission.clone(),
                audit: audit.clone(),
                cache: cache.clone(),
            },
        ));

        Self {
            service,
            resolver,
            admission,
            audit,
            cache,
        }
    }
}

/// Authenticated caller context for `user`.
#[must_use]
pub fn caller(user: &str) -> CallerContext {
    CallerContext::authenticated(UserId::from(user))
}

/// Establish request with normal priority.
#[must_use]
pub fn request(resource_type: &str, resource_id: &str, subscription_id: &str) -> EstablishRequest {
    EstablishRequest {
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        subscription_id: SubscriptionId::from(subscription_id),
        priority: Priority::Normal,
    }
}

/// Establish request for a meeting.
#[must_use]
pub fn meeting_request(meeting_id: &str, subscription_id: &str) -> EstablishRequest {
    request("meetings", meeting_id, subscription_id)
}

/// Establish request for a transcript stream.
#[must_use]
pub fn transcript_request(transcript_id: &str, subscription_id: &str) -> EstablishRequest {
    request("transcripts", transcript_id, subscription_id)
}

/// Builder for registry entries with controlled timestamps.
#[derive(Debug, Clone)]
pub struct TestSubscription {
    subscription_id: String,
    user_id: String,
    resource_type: String,
    resource_id: String,
    permissions: BTreeSet<String>,
    priority: Priority,
    now: DateTime<Utc>,
    validated_ago: Duration,
    valid_until: Option<DateTime<Utc>>,
}

impl TestSubscription {
    #[must_use]
    pub fn new(subscription_id: &str, user_id: &str) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            user_id: user_id.to_string(),
            resource_type: "meetings".to_string(),
            resource_id: "meeting-1".to_string(),
            permissions: BTreeSet::new(),
            priority: Priority::Normal,
            now: Utc::now(),
            validated_ago: Duration::zero(),
            valid_until: None,
        }
    }

    #[must_use]
    pub fn resource(mut self, resource_type: &str, resource_id: &str) -> Self {
        self.resource_type = resource_type.to_string();
        self.resource_id = resource_id.to_string();
        self
    }

    #[must_use]
    pub fn permissions(mut self, permissions: &[&str]) -> Self {
        self.permissions = permissions.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Reference instant the other timestamps are relative to.
    #[must_use]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Establish and last validate the entry `ago` before the reference instant.
    #[must_use]
    pub fn validated_ago(mut self, ago: Duration) -> Self {
        self.validated_ago = ago;
        self
    }

    #[must_use]
    pub fn valid_until(mut self, valid_until: DateTime<Utc>) -> Self {
        self.valid_until = Some(valid_until);
        self
    }

    #[must_use]
    pub fn build(self) -> ActiveSubscription {
        ActiveSubscription::established(
            SubscriptionId::from(self.subscription_id),
            UserId::from(self.user_id),
            self.resource_type,
            self.resource_id,
            self.permissions,
            self.priority,
            self.valid_until,
            self.now - self.validated_ago,
        )
    }
}
