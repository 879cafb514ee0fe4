//! Subscription Controller (SC)
//!
//! Decides which clients may keep receiving live updates for meetings,
//! transcripts, participant lists and related resources.
//!
//! # Startup
//!
//! 1. Load configuration
//! 2. Initialize tracing
//! 3. Install the Prometheus metrics recorder
//! 4. Build collaborators (resource API client, admission controller, audit sink)
//! 5. Build the `SubscriptionService` and start the staleness sweeper
//! 6. Serve the public and internal routers
//!
//! # Shutdown
//!
//! On SIGINT/SIGTERM readiness is withdrawn, both listeners drain, and the
//! sweeper is stopped.

use common::config::ObservabilityConfig;
use sc_service::admission::AdmissionController;
use sc_service::collaborators::TracingAuditSink;
use sc_service::config::Config;
use sc_service::observability::{init_metrics_recorder, HealthState};
use sc_service::resource_client::HttpResourceClient;
use sc_service::routes::{self, AppState};
use sc_service::service::{Collaborators, SubscriptionService};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    let observability = ObservabilityConfig {
        json_logs: config.log_json,
        ..ObservabilityConfig::default()
    };
    init_tracing(&observability);

    info!("Starting Subscription Controller");
    info!(
        resource_api_url = %config.resource_api_url,
        http_bind_address = %config.http_bind_address,
        internal_bind_address = %config.internal_bind_address,
        staleness_threshold_seconds = config.staleness_threshold_seconds,
        sweep_interval_seconds = config.sweep_interval_seconds,
        admission_global_budget = config.admission_global_budget,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to initialize metrics recorder");
        e
    })?;

    let resource_client = Arc::new(
        HttpResourceClient::new(&config.resource_api_url, config.resource_api_token.clone())
            .map_err(|e| {
                error!(error = %e, "Failed to create resource API client");
                e
            })?,
    );

    let collaborators = Collaborators {
        resolver: resource_client.clone(),
        admission: Arc::new(AdmissionController::new(config.admission_config())),
        audit: Arc::new(TracingAuditSink),
        cache: resource_client,
    };
    let service = Arc::new(SubscriptionService::new(
        config.service_settings(),
        collaborators,
    ));
    service.start();

    let health = Arc::new(HealthState::new());
    let state = Arc::new(AppState {
        service: Arc::clone(&service),
    });

    let http_addr: SocketAddr = config.http_bind_address.parse().map_err(|e| {
        error!(error = %e, "Invalid HTTP bind address");
        e
    })?;
    let internal_addr: SocketAddr = config.internal_bind_address.parse().map_err(|e| {
        error!(error = %e, "Invalid internal bind address");
        e
    })?;

    // Bind both listeners before serving to fail fast on bind errors
    let http_listener = tokio::net::TcpListener::bind(http_addr).await.map_err(|e| {
        error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
        e
    })?;
    let internal_listener = tokio::net::TcpListener::bind(internal_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %internal_addr, "Failed to bind internal listener");
            e
        })?;

    let shutdown_token = CancellationToken::new();

    let internal_app =
        routes::internal_routes(Arc::clone(&state), Arc::clone(&health), metrics_handle);
    let internal_shutdown = shutdown_token.clone();
    let internal_server = tokio::spawn(async move {
        info!(addr = %internal_addr, "Internal server starting");
        let server = axum::serve(internal_listener, internal_app)
            .with_graceful_shutdown(async move { internal_shutdown.cancelled().await });
        if let Err(e) = server.await {
            error!(error = %e, "Internal server failed");
        }
    });

    let public_app = routes::public_routes(state);
    let public_shutdown = shutdown_token.clone();
    let public_server = tokio::spawn(async move {
        info!(addr = %http_addr, "HTTP server starting");
        let server = axum::serve(http_listener, public_app)
            .with_graceful_shutdown(async move { public_shutdown.cancelled().await });
        if let Err(e) = server.await {
            error!(error = %e, "HTTP server failed");
        }
    });

    health.set_ready();
    info!("Subscription Controller ready");

    shutdown_signal().await;

    health.set_not_ready();
    shutdown_token.cancel();

    for (name, handle) in [("HTTP", public_server), ("internal", internal_server)] {
        if let Err(e) = handle.await {
            error!(error = %e, server = name, "Server task panicked");
        }
    }

    service.stop().await;

    info!("Subscription Controller shutdown complete");
    Ok(())
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&observability.log_level));
    let json = observability.json_logs;

    tracing_subscriber::registry()
        .with(filter)
        .with((!json).then(tracing_subscriber::fmt::layer))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .init();
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
