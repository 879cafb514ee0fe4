//! Subscription entity and priority tiers.

use chrono::{DateTime, Utc};
use common::types::{SubscriptionId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Priority tier of a subscription, fixed at establishment.
///
/// Ordered from most to least important; admission control sheds the
/// lower tiers first when the shared budget runs low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// All tiers, most important first.
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Returns the tier as a string for metric labels and audit metadata.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live subscription as held by the registry.
///
/// The registry owns every entry; callers only ever see clones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSubscription {
    pub subscription_id: SubscriptionId,
    /// Owning identity. Caller-facing mutations require an exact match.
    pub user_id: UserId,
    /// Open resource tag ("meetings", "transcripts", ...).
    pub resource_type: String,
    pub resource_id: String,
    /// Capabilities currently granted; replaced wholesale on revalidation.
    pub permissions: BTreeSet<String>,
    pub priority: Priority,
    pub established_at: DateTime<Utc>,
    /// Refreshed on every successful revalidation; never moves backwards.
    pub last_validated: DateTime<Utc>,
    /// End of a time-bounded resource. Past this instant the subscription
    /// is unauthorized regardless of its permissions.
    pub valid_until: Option<DateTime<Utc>>,
}

impl ActiveSubscription {
    /// Build a freshly established subscription (`established_at == last_validated == now`).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn established(
        subscription_id: SubscriptionId,
        user_id: UserId,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        permissions: BTreeSet<String>,
        priority: Priority,
        valid_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            subscription_id,
            user_id,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            permissions,
            priority,
            established_at: now,
            last_validated: now,
            valid_until,
        }
    }

    /// Whether the time-bounded resource has already ended at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.is_some_and(|until| until <= now)
    }

    /// Whether `user_id` owns this subscription.
    #[must_use]
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }
}
