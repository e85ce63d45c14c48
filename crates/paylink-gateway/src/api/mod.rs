//! HTTP API of the gateway

pub mod error;
pub mod handlers;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use handlers::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Readiness check response
#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub name: String,
    pub realm: String,
    pub agent_id: String,
    pub member_count: usize,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Readiness check endpoint
///
/// GET /ready
pub async fn ready(State(state): State<Arc<AppState>>) -> Json<ReadyResponse> {
    let member_count = state.store.member_count().await;

    Json(ReadyResponse {
        ready: member_count.is_ok(),
        name: state.config.name.clone(),
        realm: state.config.realm.clone(),
        agent_id: state.registry.agent_id().to_string(),
        member_count: member_count.unwrap_or(0),
    })
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration for browser-based clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Signed calls
        .route("/v1/rpc", post(handlers::rpc));

    if state.config.enable_admin_api {
        router = router.route("/v1/admin/accounts", post(handlers::open_account));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
