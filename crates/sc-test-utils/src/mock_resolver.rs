//! Scriptable permission resolver.
//!
//! Roles and liveness are keyed by resource and can be changed while a test
//! is running to simulate upstream permission changes. Unscripted lookups
//! answer "no relationship" for roles and "active, no scheduled end" for
//! liveness.

use async_trait::async_trait;
use common::types::UserId;
use sc_service::collaborators::{PermissionResolver, ResolveError, ResourceLiveness};
use sc_service::policy::{ResourceKind, Role};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type RoleKey = (ResourceKind, String, String);
type LivenessKey = (ResourceKind, String);

/// Mock [`PermissionResolver`].
#[derive(Debug, Default)]
pub struct MockPermissionResolver {
    roles: Mutex<HashMap<RoleKey, Result<Option<Role>, ResolveError>>>,
    liveness: Mutex<HashMap<LivenessKey, Result<ResourceLiveness, ResolveError>>>,
    role_calls: AtomicUsize,
    liveness_calls: AtomicUsize,
}

impl MockPermissionResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Self::set_role`].
    #[must_use]
    pub fn with_role(self, kind: ResourceKind, resource_id: &str, user: &str, role: Role) -> Self {
        self.set_role(kind, resource_id, user, Some(role));
        self
    }

    /// Builder form of [`Self::set_liveness`].
    #[must_use]
    pub fn with_liveness(
        self,
        kind: ResourceKind,
        resource_id: &str,
        liveness: ResourceLiveness,
    ) -> Self {
        self.set_liveness(kind, resource_id, liveness);
        self
    }

    /// Set (or with `None`, revoke) the role of `user` on a resource.
    pub fn set_role(&self, kind: ResourceKind, resource_id: &str, user: &str, role: Option<Role>) {
        self.roles
            .lock()
            .unwrap()
            .insert((kind, resource_id.to_string(), user.to_string()), Ok(role));
    }

    /// Make role resolution for `user` on a resource fail.
    pub fn fail_role(&self, kind: ResourceKind, resource_id: &str, user: &str, error: ResolveError) {
        self.roles
            .lock()
            .unwrap()
            .insert((kind, resource_id.to_string(), user.to_string()), Err(error));
    }

    pub fn set_liveness(&self, kind: ResourceKind, resource_id: &str, liveness: ResourceLiveness) {
        self.liveness
            .lock()
            .unwrap()
            .insert((kind, resource_id.to_string()), Ok(liveness));
    }

    /// Make liveness lookups for a resource fail.
    pub fn fail_liveness(&self, kind: ResourceKind, resource_id: &str, error: ResolveError) {
        self.liveness
            .lock()
            .unwrap()
            .insert((kind, resource_id.to_string()), Err(error));
    }

    /// Number of `resolve_role` calls so far.
    #[must_use]
    pub fn role_calls(&self) -> usize {
        self.role_calls.load(Ordering::SeqCst)
    }

    /// Number of `resource_liveness` calls so far.
    #[must_use]
    pub fn liveness_calls(&self) -> usize {
        self.liveness_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionResolver for MockPermissionResolver {
    async fn resolve_role(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        caller: &UserId,
    ) -> Result<Option<Role>, ResolveError> {
        self.role_calls.fetch_add(1, Ordering::SeqCst);
        self.roles
            .lock()
            .unwrap()
            .get(&(kind, resource_id.to_string(), caller.as_str().to_string()))
            .cloned()
            .unwrap_or(Ok(None))
    }

    async fn resource_liveness(
        &self,
        kind: ResourceKind,
        resource_id: &str,
    ) -> Result<ResourceLiveness, ResolveError> {
        self.liveness_calls.fetch_add(1, Ordering::SeqCst);
        self.liveness
            .lock()
            .unwrap()
            .get(&(kind, resource_id.to_string()))
            .cloned()
            .unwrap_or(Ok(ResourceLiveness::active(None)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unscripted_lookups() {
        let resolver = MockPermissionResolver::new();
        let user = UserId::from("alice");

        assert_eq!(
            resolver
                .resolve_role(ResourceKind::Meetings, "m-1", &user)
                .await,
            Ok(None)
        );
        assert_eq!(
            resolver
                .resource_liveness(ResourceKind::Transcripts, "t-1")
                .await,
            Ok(ResourceLiveness::active(None))
        );
        assert_eq!(resolver.role_calls(), 1);
        assert_eq!(resolver.liveness_calls(), 1);
    }

    #[tokio::test]
    async fn test_role_changes_are_visible() {
        let resolver =
            MockPermissionResolver::new().with_role(ResourceKind::Notes, "n-1", "bob", Role::Viewer);
        let user = UserId::from("bob");

        assert_eq!(
            resolver.resolve_role(ResourceKind::Notes, "n-1", &user).await,
            Ok(Some(Role::Viewer))
        );

        resolver.set_role(ResourceKind::Notes, "n-1", "bob", None);
        assert_eq!(
            resolver.resolve_role(ResourceKind::Notes, "n-1", &user).await,
            Ok(None)
        );

        resolver.fail_role(ResourceKind::Notes, "n-1", "bob", ResolveError::ResourceGone);
        assert_eq!(
            resolver.resolve_role(ResourceKind::Notes, "n-1", &user).await,
            Err(ResolveError::ResourceGone)
        );
    }
}
