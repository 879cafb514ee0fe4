//! Priority-aware admission control.
//!
//! Answers "may one more update be sent for this subscription now?" without
//! blocking. Two token buckets are consulted on every check:
//!
//! | Priority | Per-subscription rate | Burst | Global headroom required |
//! |----------|-----------------------|-------|--------------------------|
//! | critical | 50/s                  | 100   | 0%                       |
//! | high     | 20/s                  | 40    | 10%                      |
//! | normal   | 10/s                  | 20    | 25%                      |
//! | low      | 2/s                   | 5     | 50%                      |
//!
//! The global bucket holds `global_budget` tokens and refills at
//! `global_budget` per second. A request is admitted only if its own bucket
//! has a token and the global bucket would still hold the tier's headroom
//! fraction afterwards, so under load the low tier is shed first and the
//! critical tier last.
//!
//! Admission is asked on establishment and on every revalidation. A denial
//! blocks establishment but never evicts a live subscription.

use crate::observability::metrics;
use crate::subscription::Priority;
use common::types::SubscriptionId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::debug;

/// Default global update budget (updates per second across all subscriptions).
pub const DEFAULT_GLOBAL_BUDGET: u32 = 1000;

/// Admission decision seam. Implementations must not block or suspend.
pub trait AdmissionControl: Send + Sync {
    /// Consume one unit of send budget for `subscription_id` if available.
    fn can_admit(&self, subscription_id: &SubscriptionId, priority: Priority) -> bool;

    /// Forget any per-subscription state (on termination or eviction).
    fn release(&self, subscription_id: &SubscriptionId);
}

/// Send budget of one priority tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierBudget {
    pub rate_per_second: f64,
    pub burst: f64,
    /// Fraction of the global bucket that must remain after admission.
    pub global_headroom: f64,
}

impl TierBudget {
    #[must_use]
    pub const fn for_priority(priority: Priority) -> Self {
        match priority {
            Priority::Critical => Self {
                rate_per_second: 50.0,
                burst: 100.0,
                global_headroom: 0.0,
            },
            Priority::High => Self {
                rate_per_second: 20.0,
                burst: 40.0,
                global_headroom: 0.10,
            },
            Priority::Normal => Self {
                rate_per_second: 10.0,
                burst: 20.0,
                global_headroom: 0.25,
            },
            Priority::Low => Self {
                rate_per_second: 2.0,
                burst: 5.0,
                global_headroom: 0.50,
            },
        }
    }
}

/// Admission controller configuration.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionConfig {
    /// Global bucket capacity and refill rate per second.
    pub global_budget: u32,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            global_budget: DEFAULT_GLOBAL_BUDGET,
        }
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_second: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: f64, refill_per_second: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_per_second,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        // Instants older than the last refill add nothing.
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
        self.last_refill = self.last_refill.max(now);
    }
}

#[derive(Debug)]
struct SubscriptionBucket {
    priority: Priority,
    bucket: TokenBucket,
}

#[derive(Debug)]
struct AdmissionState {
    global: TokenBucket,
    subscriptions: HashMap<SubscriptionId, SubscriptionBucket>,
}

/// Token-bucket admission controller.
#[derive(Debug)]
pub struct AdmissionController {
    state: Mutex<AdmissionState>,
}

impl AdmissionController {
    #[must_use]
    pub fn new(config: AdmissionConfig) -> Self {
        let budget = f64::from(config.global_budget);
        Self {
            state: Mutex::new(AdmissionState {
                global: TokenBucket::full(budget, budget, Instant::now()),
                subscriptions: HashMap::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, AdmissionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// [`AdmissionControl::can_admit`] against an explicit instant.
    pub fn can_admit_at(
        &self,
        subscription_id: &SubscriptionId,
        priority: Priority,
        now: Instant,
    ) -> bool {
        let tier = TierBudget::for_priority(priority);
        let mut state = self.state();
        let AdmissionState {
            global,
            subscriptions,
        } = &mut *state;

        global.refill(now);

        let entry = subscriptions
            .entry(subscription_id.clone())
            .or_insert_with(|| SubscriptionBucket {
                priority,
                bucket: TokenBucket::full(tier.burst, tier.rate_per_second, now),
            });
        if entry.priority != priority {
            // Same id re-established at another tier without a release.
            *entry = SubscriptionBucket {
                priority,
                bucket: TokenBucket::full(tier.burst, tier.rate_per_second, now),
            };
        }
        entry.bucket.refill(now);

        let own_budget = entry.bucket.tokens >= 1.0;
        let global_budget = global.tokens >= 1.0 + tier.global_headroom * global.capacity;

        if own_budget && global_budget {
            entry.bucket.tokens -= 1.0;
            global.tokens -= 1.0;
            return true;
        }

        metrics::record_admission_denied(priority.as_str());
        debug!(
            target: "sc.admission",
            subscription_id = %subscription_id,
            priority = priority.as_str(),
            subscription_budget_exhausted = !own_budget,
            global_budget_exhausted = !global_budget,
            "Admission denied"
        );
        false
    }

    /// Number of subscriptions with per-subscription budget state.
    #[must_use]
    pub fn tracked_subscriptions(&self) -> usize {
        self.state().subscriptions.len()
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(AdmissionConfig::default())
    }
}

impl AdmissionControl for AdmissionController {
    fn can_admit(&self, subscription_id: &SubscriptionId, priority: Priority) -> bool {
        self.can_admit_at(subscription_id, priority, Instant::now())
    }

    fn release(&self, subscription_id: &SubscriptionId) {
        self.state().subscriptions.remove(subscription_id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(value: &str) -> SubscriptionId {
        SubscriptionId::from(value)
    }

    fn admitted(
        controller: &AdmissionController,
        sub: &SubscriptionId,
        priority: Priority,
        now: Instant,
        attempts: usize,
    ) -> usize {
        (0..attempts)
            .filter(|_| controller.can_admit_at(sub, priority, now))
            .count()
    }

    #[test]
    fn test_subscription_burst_then_denied() {
        let controller = AdmissionController::default();
        let now = Instant::now();
        let sub = id("s1");

        assert_eq!(admitted(&controller, &sub, Priority::Normal, now, 25), 20);
        assert!(!controller.can_admit_at(&sub, Priority::Normal, now));
    }

    #[test]
    fn test_subscription_bucket_refills_over_time() {
        let controller = AdmissionController::default();
        let now = Instant::now();
        let sub = id("s1");

        assert_eq!(admitted(&controller, &sub, Priority::Low, now, 10), 5);

        let later = now + Duration::from_secs(1);
        assert_eq!(admitted(&controller, &sub, Priority::Low, later, 10), 2);

        // Refill is capped at the burst size.
        let much_later = later + Duration::from_secs(60);
        assert_eq!(admitted(&controller, &sub, Priority::Low, much_later, 10), 5);
    }

    #[test]
    fn test_subscriptions_have_independent_buckets() {
        let controller = AdmissionController::default();
        let now = Instant::now();

        assert_eq!(admitted(&controller, &id("a"), Priority::Low, now, 10), 5);
        assert!(controller.can_admit_at(&id("b"), Priority::Low, now));
    }

    #[test]
    fn test_low_priority_shed_first_under_global_pressure() {
        let controller = AdmissionController::new(AdmissionConfig { global_budget: 10 });
        let now = Instant::now();

        // Drain half of the global bucket with a critical subscription.
        assert_eq!(admitted(&controller, &id("critical"), Priority::Critical, now, 5), 5);

        // 5 of 10 global tokens remain.
        assert!(!controller.can_admit_at(&id("low"), Priority::Low, now));
        assert!(controller.can_admit_at(&id("normal"), Priority::Normal, now));
        assert!(controller.can_admit_at(&id("high"), Priority::High, now));
        assert!(controller.can_admit_at(&id("critical"), Priority::Critical, now));
    }

    #[test]
    fn test_critical_can_drain_global_bucket() {
        let controller = AdmissionController::new(AdmissionConfig { global_budget: 10 });
        let now = Instant::now();

        assert_eq!(admitted(&controller, &id("c"), Priority::Critical, now, 20), 10);
        assert!(!controller.can_admit_at(&id("other"), Priority::Critical, now));
    }

    #[test]
    fn test_release_forgets_subscription_state() {
        let controller = AdmissionController::default();
        let now = Instant::now();
        let sub = id("s1");

        assert_eq!(admitted(&controller, &sub, Priority::Low, now, 10), 5);
        assert_eq!(controller.tracked_subscriptions(), 1);

        controller.release(&sub);
        assert_eq!(controller.tracked_subscriptions(), 0);
        assert!(controller.can_admit_at(&sub, Priority::Low, now));
    }

    #[test]
    fn test_priority_change_resets_bucket() {
        let controller = AdmissionController::default();
        let now = Instant::now();
        let sub = id("s1");

        assert_eq!(admitted(&controller, &sub, Priority::Low, now, 10), 5);
        assert!(controller.can_admit_at(&sub, Priority::High, now));
    }

    #[test]
    fn test_tier_budgets_are_ordered() {
        let tiers: Vec<TierBudget> = Priority::ALL.iter().map(|p| TierBudget::for_priority(*p)).collect();
        for pair in tiers.windows(2) {
            let [more, less] = pair else { continue };
            assert!(more.rate_per_second > less.rate_per_second);
            assert!(more.global_headroom < less.global_headroom);
        }
    }
}
