//! Subscription Controller (SC) Service Library
//!
//! The Subscription Controller decides whether a client may keep receiving
//! live updates for a resource (a meeting, its transcript stream, its
//! participant list) and keeps re-checking that decision while the
//! subscription is live:
//!
//! - Establishment gated by role resolution, resource liveness and admission
//! - Revalidation that diffs permissions in place or evicts the subscription
//! - Priority-aware admission control over a shared update budget
//! - Explicit and bulk termination with audit and cache-invalidation signals
//! - A background staleness sweep for clients that vanish without terminating
//!
//! # Architecture
//!
//! ```text
//! SubscriptionService (constructed once by the host)
//! ├── LifecycleController   establish / terminate / bulk terminate
//! ├── RevalidationService   validate-and-update (read path, never raises)
//! ├── StalenessSweeper      start() / stop() background task
//! └── SubscriptionRegistry  single-mutex keyed store (shared by all three)
//!
//! Collaborators: PermissionResolver, AdmissionControl, AuditSink, CacheInvalidator
//! ```
//!
//! Subscription state is ephemeral: nothing here is persisted, and the
//! registry is the only shared mutable resource.
//!
//! # Modules
//!
//! - [`admission`] - Token-bucket admission control keyed by priority
//! - [`collaborators`] - Traits for the resolver, audit sink and cache invalidator
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with HTTP status mapping
//! - [`lifecycle`] - Establish / terminate / bulk terminate
//! - [`middleware`] - Caller identity extraction for the HTTP surface
//! - [`policy`] - Resource kinds, roles and capability tables
//! - [`registry`] - In-process subscription store
//! - [`resource_client`] - HTTP client for the resource service
//! - [`revalidation`] - Validate-and-update read path
//! - [`routes`] - Public and internal axum routers
//! - [`service`] - Facade exposed to the host process
//! - [`sweeper`] - Staleness eviction task

pub mod admission;
pub mod collaborators;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod lifecycle;
pub mod middleware;
pub mod observability;
pub mod policy;
pub mod registry;
pub mod resource_client;
pub mod revalidation;
pub mod routes;
pub mod service;
pub mod subscription;
pub mod sweeper;
