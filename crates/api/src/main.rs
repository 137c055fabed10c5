use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pulse_api::auth::JwtVerifier;
use pulse_api::config::ServerConfig;
use pulse_api::publisher::EventPublisher;
use pulse_api::router::build_app_router;
use pulse_api::snapshot::StateRecords;
use pulse_api::state::AppState;
use pulse_api::ws;
use pulse_cache::Cache;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulse_api=debug,pulse_cache=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Cache ---
    let store = config
        .cache
        .build_store()
        .expect("Failed to initialise cache backend");
    let cache = Cache::new(store, pulse_cache::CacheKeys::new(config.cache.prefix.clone()));
    tracing::info!(prefix = %config.cache.prefix, "Cache ready");

    // --- Push hub ---
    let verifier = Arc::new(JwtVerifier::new(config.jwt.clone()));
    let hub = Arc::new(ws::Hub::new(verifier, config.hub));
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&hub));

    // --- App state ---
    let records = StateRecords::new(cache.clone());
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    let state = AppState::new(
        config.clone(),
        Arc::clone(&hub),
        cache.clone(),
        Arc::new(records.clone()),
    );

    // Spawn the event publisher (invalidates caches, pushes changes).
    let publisher = EventPublisher::new(
        Arc::clone(&hub),
        cache,
        records,
        Arc::clone(&state.snapshots),
    );
    let publisher_handle = tokio::spawn(publisher.run(state.event_bus.subscribe()));
    tracing::info!("Event publisher started");

    let event_bus = Arc::clone(&state.event_bus);
    let app = build_app_router(state, &config);

    // --- Start server ---
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Drop the last bus handle outside the router so the publisher drains
    // and exits.
    drop(event_bus);
    let _ = tokio::time::timeout(shutdown_timeout, publisher_handle).await;
    tracing::info!("Event publisher shut down");

    let ws_count = hub.connection_count().await;
    tracing::info!(ws_count, "Closing remaining push connections");
    hub.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
