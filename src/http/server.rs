//! HTTP server setup and configuration
//!
//! This module provides the main server startup logic, routing configuration,
//! and graceful shutdown handling for the deployment webhook.

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info, instrument};

use crate::{
    config::{parse_size_string, SystemConfig},
    dispatch::Dispatcher,
    http::{
        handlers::*,
        middleware::{bearer_auth_middleware, make_request_span, BearerGate},
    },
    types::Result,
};

const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Start the HTTP server with the given configuration
#[instrument(skip_all)]
pub async fn start_server(
    config: SystemConfig,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let gate = Arc::new(BearerGate::from_config(&config.auth)?);
    let dispatcher = Arc::new(Dispatcher::from_config(&config.deploy)?);

    let app_state = Arc::new(AppState { gate, dispatcher });

    let router = create_router(app_state, &config);

    let addr = config.server.listen_addr()?;

    info!(
        listen_addr = %addr,
        max_request_size = %config.server.max_request_size,
        request_timeout = config.server.request_timeout,
        metrics_enabled = config.monitoring.metrics_enabled,
        "Starting HTTP server"
    );

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!(
            error = %e,
            addr = %addr,
            "Failed to bind to address"
        );
        crate::types::Error::Io(e)
    })?;

    info!(
        local_addr = %listener.local_addr().unwrap_or(addr),
        "HTTP server listening"
    );

    let server = axum::serve(listener, router).with_graceful_shutdown(async {
        shutdown_signal.await;
        info!("Shutdown signal received, starting graceful shutdown");
    });

    if let Err(e) = server.await {
        error!(error = %e, "HTTP server error");
        return Err(crate::types::Error::Io(e));
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Create the Axum router with all endpoints and middleware
#[allow(deprecated)]
pub fn create_router(app_state: Arc<AppState>, config: &SystemConfig) -> Router {
    // Only the deploy route sits behind the bearer gate
    let deploy_routes = Router::new()
        .route("/deploy", post(handle_deploy))
        .route_layer(from_fn_with_state(app_state.clone(), bearer_auth_middleware));

    let public_routes = Router::new().route("/health", get(handle_health));

    let public_routes = if config.monitoring.metrics_enabled {
        public_routes.route(&config.monitoring.metrics_path, get(handle_metrics))
    } else {
        public_routes
    };

    let body_limit = parse_size_string(&config.server.max_request_size)
        .map(|bytes| bytes as usize)
        .unwrap_or(DEFAULT_BODY_LIMIT);

    Router::new()
        .merge(deploy_routes)
        .merge(public_routes)
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout,
        )))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(app_state)
}
