//! HTTP routes for the Subscription Controller.
//!
//! Two routers, served on separate listeners:
//!
//! - Public (`SC_HTTP_BIND_ADDRESS`): the client-facing subscription API,
//!   reached through the authenticating gateway.
//! - Internal (`SC_INTERNAL_BIND_ADDRESS`): probes, Prometheus scrape and
//!   system-invoked bulk termination.

use crate::handlers;
use crate::middleware::resolve_caller;
use crate::observability::{health_router, HealthState};
use crate::service::SubscriptionService;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Request timeout for both routers.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SubscriptionService>,
}

/// Build the public subscription API.
pub fn public_routes(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        .route("/api/v1/subscriptions", post(handlers::establish))
        .route("/api/v1/subscriptions/stats", get(handlers::stats))
        .route("/api/v1/subscriptions/:id", delete(handlers::terminate))
        .route("/api/v1/subscriptions/:id/validate", post(handlers::validate))
        .route_layer(middleware::from_fn(resolve_caller))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    routes
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
}

/// Build the internal router: `/health`, `/ready`, `/metrics` and bulk
/// termination.
pub fn internal_routes(
    state: Arc<AppState>,
    health: Arc<HealthState>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let internal_api = Router::new()
        .route(
            "/internal/v1/users/:user_id/subscriptions/terminate",
            post(handlers::bulk_terminate),
        )
        .with_state(state);

    health_router(health)
        .merge(metrics_routes)
        .merge(internal_api)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
}
