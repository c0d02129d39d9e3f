pub mod auth;
pub mod config;
pub mod routes;
pub mod sweeper;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use reviewgate_core::ReviewApi;

pub fn get_service_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct AppState {
    pub api: Arc<ReviewApi>,
    /// Bearer token required on /api routes, when configured.
    pub auth_token: Option<String>,
}

/// Full HTTP surface: `/health` is open, everything under `/api` passes the
/// bearer check first.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = routes::api_router().route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_bearer,
    ));

    Router::new()
        .route("/health", get(routes::health_check))
        .merge(api)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
