//! Paylink Gateway Binary
//!
//! Runs the reference gateway HTTP server.

use std::env;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use paylink_gateway::{create_router, AppState, GatewayConfig};

#[tokio::main]
async fn main() {
    // Initialize logging
    let log_level = env::var("PAYLINK_GATEWAY_LOG_LEVEL")
        .unwrap_or_else(|_| "info".into())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    // Configuration
    let port: u16 = env::var("PAYLINK_GATEWAY_PORT")
        .unwrap_or_else(|_| "8080".into())
        .parse()
        .expect("PAYLINK_GATEWAY_PORT must be a valid port number");

    let config = GatewayConfig::from_env().expect("Invalid gateway configuration");

    // TODO: load the agent key from PAYLINK_GATEWAY_AGENT_KEY_PATH instead of generating one per start
    let state = AppState::new(config);

    info!(
        name = %state.config.name,
        realm = %state.config.realm,
        agent_id = %state.registry.agent_id(),
        agent_key_id = %state.registry.agent_key().id,
        min_client_version = %state.config.min_client_version,
        port = port,
        "Starting Paylink gateway"
    );

    // Build router
    let app = create_router(Arc::new(state));

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!(addr = %addr, "Paylink gateway listening");

    axum::serve(listener, app).await.expect("Server error");
}
