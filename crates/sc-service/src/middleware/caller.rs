//! Caller identity middleware.
//!
//! The authenticating gateway in front of the public listener verifies the
//! client's credentials and forwards the resulting user id in
//! `x-authenticated-user-id`. This middleware turns that header into a
//! [`CallerContext`] request extension for the handlers.
//!
//! A missing or blank header yields an anonymous context rather than a
//! rejection: the revalidation read path reports `unauthenticated` in its
//! result, while the write paths raise `ScError::Unauthenticated` themselves.

use crate::service::CallerContext;
use axum::{extract::Request, middleware::Next, response::Response};
use common::types::UserId;
use tracing::instrument;

/// Header carrying the authenticated user id.
pub const CALLER_HEADER: &str = "x-authenticated-user-id";

#[instrument(skip_all, name = "sc.middleware.caller")]
pub async fn resolve_caller(mut req: Request, next: Next) -> Response {
    let ctx = req
        .headers()
        .get(CALLER_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|user_id| !user_id.is_empty())
        .map_or_else(CallerContext::anonymous, |user_id| {
            CallerContext::authenticated(UserId::from(user_id))
        });

    if ctx.user_id().is_none() {
        tracing::debug!(target: "sc.handlers", "Request without caller identity");
    }

    req.extensions_mut().insert(ctx);
    next.run(req).await
}
