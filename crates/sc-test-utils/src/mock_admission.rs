//! Switchable admission control.
//!
//! Admits or denies every request according to a flag that can be flipped
//! mid-test, and records releases.

use common::types::SubscriptionId;
use sc_service::admission::AdmissionControl;
use sc_service::subscription::Priority;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Mock [`AdmissionControl`].
#[derive(Debug)]
pub struct MockAdmission {
    admit: AtomicBool,
    checks: AtomicUsize,
    released: Mutex<Vec<SubscriptionId>>,
}

impl Default for MockAdmission {
    fn default() -> Self {
        Self::admitting()
    }
}

impl MockAdmission {
    /// Admission that admits everything.
    #[must_use]
    pub fn admitting() -> Self {
        Self {
            admit: AtomicBool::new(true),
            checks: AtomicUsize::new(0),
            released: Mutex::new(Vec::new()),
        }
    }

    /// Admission that denies everything.
    #[must_use]
    pub fn denying() -> Self {
        let admission = Self::admitting();
        admission.set_admit(false);
        admission
    }

    pub fn set_admit(&self, admit: bool) {
        self.admit.store(admit, Ordering::SeqCst);
    }

    /// Number of `can_admit` calls so far.
    #[must_use]
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    /// Subscription ids released so far, in call order.
    #[must_use]
    pub fn released(&self) -> Vec<SubscriptionId> {
        self.released.lock().unwrap().clone()
    }
}

impl AdmissionControl for MockAdmission {
    fn can_admit(&self, _subscription_id: &SubscriptionId, _priority: Priority) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.admit.load(Ordering::SeqCst)
    }

    fn release(&self, subscription_id: &SubscriptionId) {
        self.released.lock().unwrap().push(subscription_id.clone());
    }
}
