//! HTTP API server for the inventory reservation engine.
//!
//! Exposes cart pricing, checkout, payment intake and order administration
//! over REST, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod identity;
pub mod reaper;
pub mod routes;
pub mod seed;
pub mod signature;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use store::CommerceStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CommerceStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/cart/price", post(routes::cart::price::<S>))
        .route(
            "/catalog/resolve/{product_fp}/{variant_fp}",
            get(routes::catalog::resolve::<S>),
        )
        .route("/checkout", post(routes::checkout::place::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/payments/webhook", post(routes::payments::webhook::<S>))
        .route(
            "/payments/{reference}/verify",
            post(routes::payments::verify::<S>),
        )
        .route(
            "/admin/orders/{id}/status",
            put(routes::admin::update_status::<S>),
        )
        .route(
            "/admin/orders/{id}/retry-deduction",
            post(routes::admin::retry_deduction::<S>),
        )
        .route(
            "/admin/reservations/release-expired",
            post(routes::admin::release_expired::<S>),
        )
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

/// Creates the application state over `store` with the sandbox gateway.
pub fn create_default_state<S: CommerceStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> Arc<AppState<S>> {
    Arc::new(AppState::new(store, config))
}
