//! # SC Test Utilities
//!
//! Shared test utilities for the Subscription Controller (SC) service.
//!
//! Provides in-memory implementations of every external collaborator so the
//! lifecycle, revalidation and sweeper paths can be tested without a
//! resource service.
//!
//! ## Modules
//!
//! - `mock_resolver` - Scriptable permission resolver (roles, liveness, failures)
//! - `mock_sinks` - Recording audit sink and cache invalidator
//! - `mock_admission` - Switchable admission control
//! - `fixtures` - Service harness, requests and registry entries
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sc_test_utils::*;
//! use sc_service::policy::{ResourceKind, Role};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = TestHarness::new();
//!     harness
//!         .resolver
//!         .set_role(ResourceKind::Meetings, "m-1", "alice", Some(Role::Host));
//!
//!     let outcome = harness
//!         .service
//!         .establish_subscription(&caller("alice"), meeting_request("m-1", "sub-1"))
//!         .await
//!         .unwrap();
//!     assert!(outcome.success);
//! }
//! ```

pub mod fixtures;
pub mod mock_admission;
pub mod mock_resolver;
pub mod mock_sinks;

pub use fixtures::*;
pub use mock_admission::MockAdmission;
pub use mock_resolver::MockPermissionResolver;
pub use mock_sinks::{RecordingAuditSink, RecordingCacheInvalidator};
