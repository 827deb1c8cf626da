//! HTTP host for the purchase saga orchestrator.
//!
//! Exposes `POST /purchase`, which runs one saga across the catalog,
//! purchases, payments and inventory services, plus health and Prometheus
//! endpoints. Requests are traced with `tower-http`.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    HttpCatalogService, HttpInventoryService, HttpPaymentService, HttpPurchaseService, SagaError,
    SagaOrchestrator, build_client,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::purchase::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/purchase", post(routes::purchase::create))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state backed by the HTTP services named in `config`.
///
/// Cancelling `shutdown` aborts the retry and pacing waits of in-flight
/// sagas, which then compensate what they committed.
pub fn create_http_state(
    config: &Config,
    shutdown: CancellationToken,
) -> Result<Arc<AppState>, SagaError> {
    let client = build_client(config.call_timeout)?;
    let orchestrator = SagaOrchestrator::new(
        HttpCatalogService::new(&config.catalog_url, client.clone())?,
        HttpPurchaseService::new(&config.purchases_url, client.clone())?,
        HttpPaymentService::new(&config.payments_url, client.clone())?,
        HttpInventoryService::new(&config.inventory_url, client)?,
        config.saga_settings(),
    )
    .with_shutdown(shutdown);

    Ok(Arc::new(AppState::new(orchestrator)))
}
