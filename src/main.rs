use anyhow::{Context, Result};
use axum::{
    routing::{delete, get, post},
    Router,
};
use clap::Parser;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use wavetrend_signals::api::{self, AppState};
use wavetrend_signals::fetch::HistoryClient;
use wavetrend_signals::session::SessionRegistry;
use wavetrend_signals::types::SignalUpdate;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Port to run the web server on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    port: u16,

    /// Seconds between live session polls
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value = "2")]
    poll_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wavetrend_signals=info".parse()?),
        )
        .init();

    let args = Args::parse();

    info!("Starting WaveTrend signal server");
    info!("Port: {}", args.port);
    info!("Poll interval: {}s", args.poll_interval_secs);

    let (update_tx, _rx) = broadcast::channel::<SignalUpdate>(1000);

    let source = Arc::new(HistoryClient::new().context("Failed to create history client")?);
    let state = Arc::new(AppState {
        source,
        registry: SessionRegistry::new(),
        update_tx,
        poll_interval: Duration::from_secs(args.poll_interval_secs),
    });

    let app = Router::new()
        .route("/api/history", get(api::get_history))
        .route("/api/index-history", get(api::get_index_history))
        .route("/api/confirmed-history", get(api::get_confirmed_history))
        .route(
            "/api/sessions",
            get(api::list_sessions).post(api::create_session),
        )
        .route("/api/sessions/{symbol}/pause", post(api::pause_session))
        .route("/api/sessions/{symbol}/resume", post(api::resume_session))
        .route("/api/sessions/{symbol}", delete(api::delete_session))
        .route("/ws", get(api::ws_handler))
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Server running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
