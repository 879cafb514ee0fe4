//! In-process subscription registry.
//!
//! The registry is the authoritative, exclusively-owning store of live
//! subscriptions, keyed by subscription id. It knows nothing about
//! authorization; callers decide, the registry records.
//!
//! # Concurrency
//!
//! A single `std::sync::Mutex` guards the whole map. Every operation takes
//! the lock, does in-memory bookkeeping and releases it before returning; the
//! guard is never held across an `.await`. A lookup therefore observes an
//! entry either whole or absent, and eviction is linearizable with respect
//! to lookups.
//!
//! Poisoning is recovered rather than propagated: all mutations are single
//! `HashMap` operations, so a panicking holder cannot leave a half-written
//! entry behind.

use crate::observability::metrics;
use crate::observability::SubscriptionMetrics;
use crate::subscription::ActiveSubscription;
use chrono::{DateTime, Utc};
use common::types::{SubscriptionId, UserId};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Default staleness threshold: entries not revalidated for 10 minutes are evicted.
pub const DEFAULT_STALENESS_THRESHOLD: Duration = Duration::from_secs(600);

/// Keyed store of live subscriptions.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    entries: Mutex<HashMap<SubscriptionId, ActiveSubscription>>,
    staleness_threshold: chrono::Duration,
    tracker: Arc<SubscriptionMetrics>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    ///
    /// `tracker` is notified of every registration.
    #[must_use]
    pub fn new(staleness_threshold: Duration, tracker: Arc<SubscriptionMetrics>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            staleness_threshold: chrono::Duration::from_std(staleness_threshold)
                .unwrap_or_else(|_| chrono::Duration::weeks(52)),
            tracker,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<SubscriptionId, ActiveSubscription>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite an entry by subscription id.
    pub fn register(&self, entry: ActiveSubscription) {
        let priority = entry.priority;
        let subscription_id = entry.subscription_id.clone();

        let active = {
            let mut entries = self.entries();
            entries.insert(subscription_id.clone(), entry);
            entries.len()
        };

        self.tracker.record_established();
        metrics::record_subscription_established(priority.as_str());
        metrics::set_subscriptions_active(active);

        debug!(
            target: "sc.registry",
            subscription_id = %subscription_id,
            priority = priority.as_str(),
            active,
            "Subscription registered"
        );
    }

    /// Insert `entry` unless its id is held by another user.
    ///
    /// The ownership check and the insert happen under one lock acquisition.
    /// An entry already owned by the same user is overwritten. Returns
    /// `false`, leaving the registry untouched, when the id belongs to
    /// someone else.
    pub fn register_unless_foreign(&self, entry: ActiveSubscription) -> bool {
        let priority = entry.priority;
        let subscription_id = entry.subscription_id.clone();

        let active = {
            let mut entries = self.entries();
            if entries
                .get(&subscription_id)
                .is_some_and(|existing| !existing.is_owned_by(&entry.user_id))
            {
                None
            } else {
                entries.insert(subscription_id.clone(), entry);
                Some(entries.len())
            }
        };

        let Some(active) = active else {
            debug!(
                target: "sc.registry",
                subscription_id = %subscription_id,
                "Subscription id held by another user, not registered"
            );
            return false;
        };

        self.tracker.record_established();
        metrics::record_subscription_established(priority.as_str());
        metrics::set_subscriptions_active(active);

        debug!(
            target: "sc.registry",
            subscription_id = %subscription_id,
            priority = priority.as_str(),
            active,
            "Subscription registered"
        );
        true
    }

    /// Remove an entry if present. Idempotent.
    pub fn unregister(&self, subscription_id: &SubscriptionId) -> Option<ActiveSubscription> {
        let (removed, active) = {
            let mut entries = self.entries();
            let removed = entries.remove(subscription_id);
            (removed, entries.len())
        };

        if removed.is_some() {
            metrics::set_subscriptions_active(active);
            debug!(
                target: "sc.registry",
                subscription_id = %subscription_id,
                active,
                "Subscription unregistered"
            );
        }

        removed
    }

    /// Remove an entry only if it is owned by `user_id`.
    ///
    /// The ownership check and the removal happen under one lock acquisition,
    /// so an entry re-registered by another user in between cannot be removed.
    pub fn unregister_owned(
        &self,
        subscription_id: &SubscriptionId,
        user_id: &UserId,
    ) -> Option<ActiveSubscription> {
        let (removed, active) = {
            let mut entries = self.entries();
            let owned = entries
                .get(subscription_id)
                .is_some_and(|entry| entry.is_owned_by(user_id));
            let removed = if owned {
                entries.remove(subscription_id)
            } else {
                None
            };
            (removed, entries.len())
        };

        if removed.is_some() {
            metrics::set_subscriptions_active(active);
            debug!(
                target: "sc.registry",
                subscription_id = %subscription_id,
                active,
                "Owned subscription unregistered"
            );
        }

        removed
    }

    #[must_use]
    pub fn get(&self, subscription_id: &SubscriptionId) -> Option<ActiveSubscription> {
        self.entries().get(subscription_id).cloned()
    }

    /// All entries owned by `user_id`, in no particular order.
    #[must_use]
    pub fn get_by_user(&self, user_id: &UserId) -> Vec<ActiveSubscription> {
        self.entries()
            .values()
            .filter(|entry| entry.is_owned_by(user_id))
            .cloned()
            .collect()
    }

    /// All entries subscribed to `(resource_type, resource_id)`, in no particular order.
    #[must_use]
    pub fn get_by_resource(&self, resource_type: &str, resource_id: &str) -> Vec<ActiveSubscription> {
        self.entries()
            .values()
            .filter(|entry| entry.resource_type == resource_type && entry.resource_id == resource_id)
            .cloned()
            .collect()
    }

    /// Replace the permission set and refresh `last_validated`.
    ///
    /// Returns `false` if the entry is absent or no longer owned by `owner`
    /// (it may have been terminated and re-established concurrently).
    pub fn update_permissions(
        &self,
        subscription_id: &SubscriptionId,
        owner: &UserId,
        permissions: BTreeSet<String>,
    ) -> bool {
        self.update_permissions_at(subscription_id, owner, permissions, Utc::now())
    }

    /// [`Self::update_permissions`] against an explicit instant.
    pub fn update_permissions_at(
        &self,
        subscription_id: &SubscriptionId,
        owner: &UserId,
        permissions: BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> bool {
        let mut entries = self.entries();
        let Some(entry) = entries
            .get_mut(subscription_id)
            .filter(|entry| entry.is_owned_by(owner))
        else {
            return false;
        };

        entry.permissions = permissions;
        entry.last_validated = entry.last_validated.max(now);
        true
    }

    /// Record a successful revalidation: refresh `last_validated` and `valid_until`.
    ///
    /// Returns `false` if the entry is absent or not owned by `owner`.
    pub fn mark_validated(
        &self,
        subscription_id: &SubscriptionId,
        owner: &UserId,
        valid_until: Option<DateTime<Utc>>,
    ) -> bool {
        self.mark_validated_at(subscription_id, owner, valid_until, Utc::now())
    }

    /// [`Self::mark_validated`] against an explicit instant.
    pub fn mark_validated_at(
        &self,
        subscription_id: &SubscriptionId,
        owner: &UserId,
        valid_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let mut entries = self.entries();
        let Some(entry) = entries
            .get_mut(subscription_id)
            .filter(|entry| entry.is_owned_by(owner))
        else {
            return false;
        };

        entry.last_validated = entry.last_validated.max(now);
        entry.valid_until = valid_until;
        true
    }

    /// Evict every entry not revalidated within the staleness threshold.
    ///
    /// Returns the evicted entries. Never fails.
    pub fn cleanup(&self) -> Vec<ActiveSubscription> {
        self.cleanup_at(Utc::now())
    }

    /// [`Self::cleanup`] against an explicit instant.
    pub fn cleanup_at(&self, now: DateTime<Utc>) -> Vec<ActiveSubscription> {
        let cutoff = now - self.staleness_threshold;

        let (evicted, active) = {
            let mut entries = self.entries();
            let stale: Vec<SubscriptionId> = entries
                .iter()
                .filter(|(_, entry)| entry.last_validated < cutoff)
                .map(|(id, _)| id.clone())
                .collect();

            let evicted: Vec<ActiveSubscription> = stale
                .iter()
                .filter_map(|id| entries.remove(id))
                .collect();
            (evicted, entries.len())
        };

        if !evicted.is_empty() {
            metrics::set_subscriptions_active(active);
            info!(
                target: "sc.registry",
                evicted = evicted.len(),
                active,
                "Evicted stale subscriptions"
            );
        }

        evicted
    }

    /// Snapshot of every live entry.
    #[must_use]
    pub fn get_all_active(&self) -> Vec<ActiveSubscription> {
        self.entries().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::subscription::Priority;
    use chrono::Duration as ChronoDuration;
    use std::collections::HashSet;

    fn registry() -> SubscriptionRegistry {
        SubscriptionRegistry::new(DEFAULT_STALENESS_THRESHOLD, SubscriptionMetrics::new())
    }

    fn entry(id: &str, user: &str, resource_type: &str, resource_id: &str) -> ActiveSubscription {
        ActiveSubscription::established(
            SubscriptionId::from(id),
            UserId::from(user),
            resource_type,
            resource_id,
            BTreeSet::from(["meeting:read".to_string()]),
            Priority::Normal,
            None,
            Utc::now(),
        )
    }

    fn validated_ago(id: &str, age: ChronoDuration, now: DateTime<Utc>) -> ActiveSubscription {
        let mut e = entry(id, "user-1", "meetings", "meeting-1");
        e.established_at = now - age;
        e.last_validated = now - age;
        e
    }

    fn ids(entries: &[ActiveSubscription]) -> HashSet<String> {
        entries
            .iter()
            .map(|e| e.subscription_id.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_register_and_get() {
        let registry = registry();
        registry.register(entry("s1", "u1", "meetings", "m1"));

        let found = registry.get(&SubscriptionId::from("s1")).unwrap();
        assert_eq!(found.user_id, UserId::from("u1"));
        assert!(registry.get(&SubscriptionId::from("missing")).is_none());
    }

    #[test]
    fn test_register_overwrites_same_id() {
        let registry = registry();
        registry.register(entry("s1", "u1", "meetings", "m1"));
        registry.register(entry("s1", "u1", "transcripts", "m1"));

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(&SubscriptionId::from("s1")).unwrap().resource_type,
            "transcripts"
        );
    }

    #[test]
    fn test_register_notifies_tracker() {
        let tracker = SubscriptionMetrics::new();
        let registry = SubscriptionRegistry::new(DEFAULT_STALENESS_THRESHOLD, Arc::clone(&tracker));

        registry.register(entry("s1", "u1", "meetings", "m1"));
        registry.register(entry("s2", "u1", "meetings", "m1"));

        assert_eq!(tracker.snapshot().established_total, 2);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = registry();
        registry.register(entry("s1", "u1", "meetings", "m1"));

        assert!(registry.unregister(&SubscriptionId::from("s1")).is_some());
        assert!(registry.unregister(&SubscriptionId::from("s1")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_owned_requires_owner() {
        let registry = registry();
        registry.register(entry("s1", "u1", "meetings", "m1"));

        assert!(registry
            .unregister_owned(&SubscriptionId::from("s1"), &UserId::from("u2"))
            .is_none());
        assert_eq!(registry.len(), 1);

        assert!(registry
            .unregister_owned(&SubscriptionId::from("s1"), &UserId::from("u1"))
            .is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_secondary_lookups() {
        let registry = registry();
        registry.register(entry("s1", "u1", "meetings", "m1"));
        registry.register(entry("s2", "u1", "transcripts", "m1"));
        registry.register(entry("s3", "u2", "meetings", "m1"));
        registry.register(entry("s4", "u2", "meetings", "m2"));

        assert_eq!(
            ids(&registry.get_by_user(&UserId::from("u1"))),
            HashSet::from(["s1".to_string(), "s2".to_string()])
        );
        assert_eq!(
            ids(&registry.get_by_resource("meetings", "m1")),
            HashSet::from(["s1".to_string(), "s3".to_string()])
        );
        assert!(registry.get_by_user(&UserId::from("nobody")).is_empty());
        assert_eq!(registry.get_all_active().len(), 4);
    }

    #[test]
    fn test_update_permissions_replaces_set_and_advances_last_validated() {
        let registry = registry();
        let now = Utc::now();
        registry.register(validated_ago("s1", ChronoDuration::minutes(2), now));
        let before = registry.get(&SubscriptionId::from("s1")).unwrap();

        let new_permissions = BTreeSet::from(["transcript:read".to_string()]);
        assert!(registry.update_permissions_at(
            &SubscriptionId::from("s1"),
            &UserId::from("user-1"),
            new_permissions.clone(),
            now
        ));

        let after = registry.get(&SubscriptionId::from("s1")).unwrap();
        assert_eq!(after.permissions, new_permissions);
        assert_eq!(after.last_validated, now);
        assert!(after.last_validated > before.last_validated);
        assert_eq!(after.established_at, before.established_at);
    }

    #[test]
    fn test_update_permissions_absent_is_noop() {
        let registry = registry();
        assert!(!registry.update_permissions(
            &SubscriptionId::from("gone"),
            &UserId::from("user-1"),
            BTreeSet::new()
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_last_validated_never_regresses() {
        let registry = registry();
        let now = Utc::now();
        registry.register(validated_ago("s1", ChronoDuration::zero(), now));

        let earlier = now - ChronoDuration::minutes(5);
        let owner = UserId::from("user-1");
        assert!(registry.mark_validated_at(&SubscriptionId::from("s1"), &owner, None, earlier));
        assert!(registry.update_permissions_at(
            &SubscriptionId::from("s1"),
            &owner,
            BTreeSet::new(),
            earlier
        ));

        assert_eq!(
            registry.get(&SubscriptionId::from("s1")).unwrap().last_validated,
            now
        );
    }

    #[test]
    fn test_mark_validated_sets_valid_until() {
        let registry = registry();
        registry.register(entry("s1", "u1", "transcripts", "m1"));
        let ends = Utc::now() + ChronoDuration::hours(1);

        assert!(registry.mark_validated(&SubscriptionId::from("s1"), &UserId::from("u1"), Some(ends)));
        assert_eq!(
            registry.get(&SubscriptionId::from("s1")).unwrap().valid_until,
            Some(ends)
        );
    }

    #[test]
    fn test_refresh_by_other_user_is_rejected() {
        let registry = registry();
        registry.register(entry("s1", "u2", "meetings", "m1"));
        let before = registry.get(&SubscriptionId::from("s1")).unwrap();

        let intruder = UserId::from("u1");
        assert!(!registry.update_permissions(
            &SubscriptionId::from("s1"),
            &intruder,
            BTreeSet::from(["meeting:end".to_string()])
        ));
        assert!(!registry.mark_validated(
            &SubscriptionId::from("s1"),
            &intruder,
            Some(Utc::now())
        ));

        assert_eq!(registry.get(&SubscriptionId::from("s1")).unwrap(), before);
    }

    #[test]
    fn test_register_unless_foreign_keeps_other_owner() {
        let tracker = SubscriptionMetrics::new();
        let registry = SubscriptionRegistry::new(DEFAULT_STALENESS_THRESHOLD, Arc::clone(&tracker));
        assert!(registry.register_unless_foreign(entry("s1", "u1", "meetings", "m1")));

        assert!(!registry.register_unless_foreign(entry("s1", "u2", "meetings", "m2")));

        let kept = registry.get(&SubscriptionId::from("s1")).unwrap();
        assert_eq!(kept.user_id, UserId::from("u1"));
        assert_eq!(kept.resource_id, "m1");
        assert_eq!(tracker.snapshot().established_total, 1);
    }

    #[test]
    fn test_register_unless_foreign_overwrites_own_entry() {
        let registry = registry();
        assert!(registry.register_unless_foreign(entry("s1", "u1", "meetings", "m1")));
        assert!(registry.register_unless_foreign(entry("s1", "u1", "transcripts", "t1")));

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(&SubscriptionId::from("s1")).unwrap().resource_type,
            "transcripts"
        );
    }

    #[test]
    fn test_cleanup_evicts_only_stale_entries() {
        let registry = registry();
        let now = Utc::now();
        registry.register(validated_ago("fresh", ChronoDuration::minutes(9), now));
        registry.register(validated_ago("stale", ChronoDuration::minutes(11), now));

        let evicted = registry.cleanup_at(now);

        assert_eq!(ids(&evicted), HashSet::from(["stale".to_string()]));
        assert_eq!(ids(&registry.get_all_active()), HashSet::from(["fresh".to_string()]));
    }

    #[test]
    fn test_cleanup_on_empty_registry() {
        let registry = registry();
        assert!(registry.cleanup().is_empty());
    }

    #[test]
    fn test_concurrent_register_and_unregister() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("t{t}-s{i}");
                        registry.register(entry(&id, "u1", "meetings", "m1"));
                        if i % 2 == 0 {
                            registry.unregister(&SubscriptionId::from(id.as_str()));
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 8 * 25);
    }
}
