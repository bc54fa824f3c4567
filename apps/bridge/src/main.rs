use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

mod app_state;
mod config;
mod conversation_store;
mod directory;
mod dispatch;
mod error;
mod forward;
mod metrics;
mod normalize;
mod poll_store;
mod probe;
mod reply_policy;
mod routes;
mod socket;

use app_state::AppState;
use config::BridgeConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry_cfg = gsm_telemetry::TelemetryConfig::from_env("messaging-bridge", env!("CARGO_PKG_VERSION"));
    gsm_telemetry::init_telemetry(telemetry_cfg)?;

    let config = BridgeConfig::from_env();
    let listen_addr = config.listen_addr.clone();
    let socket_mode_enabled = config.slack_app_token.is_some();
    let state = AppState::build(config);

    if socket_mode_enabled {
        let socket_state = state.clone();
        tokio::spawn(async move {
            socket::run(socket_state).await;
        });
    }

    let app = Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/status", get(routes::status))
        .route("/slack/events", post(routes::slack_events))
        .route("/slack/commands", post(routes::slack_commands))
        .route("/slack/interactions", post(routes::slack_interactions))
        .route("/slack/outbound", post(routes::slack_outbound))
        .route("/slack/resolve/users", post(routes::slack_resolve_users))
        .route("/slack/resolve/channels", post(routes::slack_resolve_channels))
        .route("/slack/probe", get(routes::slack_probe))
        .route(
            "/teams/messages",
            get(routes::teams_validate).post(routes::teams_messages),
        )
        .route("/teams/outbound", post(routes::teams_outbound))
        .route("/teams/resolve/users", post(routes::teams_resolve_users))
        .route("/teams/resolve/channels", post(routes::teams_resolve_channels))
        .route("/teams/probe", get(routes::teams_probe))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(addr = %listen_addr, "messaging-bridge listening");

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_state))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, persisting state");
    state.persist().await;
}
