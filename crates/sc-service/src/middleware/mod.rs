//! HTTP middleware for the Subscription Controller.

pub mod caller;

pub use caller::{resolve_caller, CALLER_HEADER};
