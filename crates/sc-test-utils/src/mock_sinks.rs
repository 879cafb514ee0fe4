//! Recording audit sink and cache invalidator.

use async_trait::async_trait;
use sc_service::collaborators::{AuditAction, AuditEvent, AuditSink, CacheInvalidator};
use std::sync::Mutex;

/// [`AuditSink`] that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Recorded events with the given action.
    #[must_use]
    pub fn events_with(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.action == action)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// [`CacheInvalidator`] that records invalidated resource ids.
#[derive(Debug, Default)]
pub struct RecordingCacheInvalidator {
    invalidated: Mutex<Vec<String>>,
}

impl RecordingCacheInvalidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidated resource ids in call order.
    #[must_use]
    pub fn invalidated(&self) -> Vec<String> {
        self.invalidated.lock().unwrap().clone()
    }
}

#[async_trait]
impl CacheInvalidator for RecordingCacheInvalidator {
    async fn invalidate(&self, resource_id: &str) {
        self.invalidated
            .lock()
            .unwrap()
            .push(resource_id.to_string());
    }
}
