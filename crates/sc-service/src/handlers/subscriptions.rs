//! Client-facing subscription handlers.
//!
//! - `POST /api/v1/subscriptions` - Establish
//! - `POST /api/v1/subscriptions/:id/validate` - Validate and update
//! - `DELETE /api/v1/subscriptions/:id?reason=` - Terminate
//! - `GET /api/v1/subscriptions/stats` - Caller-scoped statistics
//!
//! The caller identity comes from the [`CallerContext`] extension inserted
//! by [`crate::middleware::resolve_caller`]. Refusals (no relationship,
//! rate limited, revoked) are 200 responses with the refusal encoded in the
//! body; only a missing identity or a malformed request is an HTTP error.

use crate::errors::ScError;
use crate::lifecycle::{EstablishOutcome, EstablishRequest};
use crate::revalidation::ValidationOutcome;
use crate::routes::AppState;
use crate::service::{CallerContext, SubscriptionStats};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use common::types::SubscriptionId;
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;

/// Query parameters for DELETE /api/v1/subscriptions/:id
#[derive(Debug, Deserialize)]
pub struct TerminateQuery {
    pub reason: Option<String>,
}

/// Handler for POST /api/v1/subscriptions
#[instrument(skip_all, name = "sc.handlers.establish")]
pub async fn establish(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<CallerContext>,
    Json(request): Json<EstablishRequest>,
) -> Result<Json<EstablishOutcome>, ScError> {
    if request.subscription_id.as_str().trim().is_empty() {
        return Err(ScError::BadRequest("subscription_id is required".to_string()));
    }
    if request.resource_type.trim().is_empty() || request.resource_id.trim().is_empty() {
        return Err(ScError::BadRequest(
            "resource_type and resource_id are required".to_string(),
        ));
    }

    let outcome = state.service.establish_subscription(&ctx, request).await?;
    Ok(Json(outcome))
}

/// Handler for POST /api/v1/subscriptions/:id/validate
///
/// Always 200: every outcome, including a missing identity, is encoded in
/// the body.
#[instrument(skip_all, name = "sc.handlers.validate")]
pub async fn validate(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<CallerContext>,
    Path(subscription_id): Path<String>,
) -> Json<ValidationOutcome> {
    let outcome = state
        .service
        .validate_and_update_subscription(&ctx, &SubscriptionId::from(subscription_id))
        .await;
    Json(outcome)
}

/// Handler for DELETE /api/v1/subscriptions/:id
///
/// 204 whether or not anything was removed, so foreign subscription ids
/// cannot be probed.
#[instrument(skip_all, name = "sc.handlers.terminate")]
pub async fn terminate(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<CallerContext>,
    Path(subscription_id): Path<String>,
    Query(query): Query<TerminateQuery>,
) -> Result<StatusCode, ScError> {
    state
        .service
        .terminate_subscription(&ctx, &SubscriptionId::from(subscription_id), query.reason)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/v1/subscriptions/stats
#[instrument(skip_all, name = "sc.handlers.stats")]
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<CallerContext>,
) -> Result<Json<SubscriptionStats>, ScError> {
    Ok(Json(state.service.get_subscription_stats(&ctx)?))
}
