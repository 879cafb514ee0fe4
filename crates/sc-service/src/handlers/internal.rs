//! Internal (service-to-service) handlers.
//!
//! Served on the internal listener, which is not exposed through the
//! client-facing gateway.

use crate::errors::ScError;
use crate::lifecycle::BulkTerminateOutcome;
use crate::routes::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use common::types::UserId;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

fn default_reason() -> String {
    "bulk_terminated".to_string()
}

/// Body of POST /internal/v1/users/:user_id/subscriptions/terminate
#[derive(Debug, Default, Deserialize)]
pub struct BulkTerminateRequest {
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    #[serde(default = "default_reason")]
    pub reason: String,
}

/// Handler for POST /internal/v1/users/:user_id/subscriptions/terminate
///
/// Terminates every subscription of the user, optionally narrowed by
/// resource type and id.
#[instrument(skip_all, name = "sc.handlers.bulk_terminate")]
pub async fn bulk_terminate(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(request): Json<BulkTerminateRequest>,
) -> Result<Json<BulkTerminateOutcome>, ScError> {
    if user_id.trim().is_empty() {
        return Err(ScError::BadRequest("user_id is required".to_string()));
    }

    let user_id = UserId::from(user_id);
    let outcome = state
        .service
        .bulk_terminate_user_subscriptions(
            &user_id,
            request.resource_type.as_deref(),
            request.resource_id.as_deref(),
            &request.reason,
        )
        .await;

    info!(
        target: "sc.handlers",
        terminated_count = outcome.terminated_count,
        "Bulk termination requested"
    );
    Ok(Json(outcome))
}
