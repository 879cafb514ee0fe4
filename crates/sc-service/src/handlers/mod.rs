//! HTTP request handlers for the Subscription Controller.

pub mod internal;
pub mod metrics;
pub mod subscriptions;

pub use internal::bulk_terminate;
pub use metrics::metrics_handler;
pub use subscriptions::{establish, stats, terminate, validate};
