use clap::Parser;
use snake_duel_server::config::{init_tracing, ServerConfig};
use snake_duel_server::registry::RoomRegistry;
use snake_duel_server::server::{build_router, shared_state, shutdown_rooms};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = ServerConfig::parse();
    init_tracing(&config.log_filter);

    let state = shared_state(RoomRegistry::new(config.registry_options()));
    let app = build_router(state.clone());

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind server socket");

    info!(addr = %bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "failed to listen for shutdown signal");
            }
            let closed = shutdown_rooms(&state).await;
            info!(rooms = closed, "shutting down");
        })
        .await
        .expect("server runtime failed");
}
