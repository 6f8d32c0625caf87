mod client;
mod config;
mod desk;
mod dispatch;
mod errors;
mod grid;
mod pricing;
mod server;
mod state;
mod transport;

use crate::client::PricingClient;
use crate::dispatch::Dispatcher;
use crate::grid::throttler::{GridSettings, GridThrottler};
use crate::pricing::types::PricingParameters;
use crate::state::{AppState, DeskEvent};
use crate::transport::ws::WsConnector;
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    // Structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("pricing desk starting");

    // Load config
    let cfg = match config::AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        url = %cfg.pricing_server_url,
        mode = ?cfg.correlation_mode,
        grid_points = cfg.grid_points,
        "pricing server configured"
    );

    // Pricing client (connects lazily on the first request)
    let connector = WsConnector::new(&cfg.pricing_server_url, cfg.connect_timeout);
    let client = PricingClient::spawn(connector, &cfg);
    let pricer = Arc::new(client.clone());

    // Create bounded channels
    let (edits_tx, edits_rx) = mpsc::channel::<PricingParameters>(256);
    let (desk_tx, desk_rx) = mpsc::channel::<DeskEvent>(1024);

    // Create shared state
    let app_state = AppState::new(cfg.clone(), client.clone(), edits_tx);

    // ── Spawn tasks ──

    // 1. Connection state relay
    let conn_tx = desk_tx.clone();
    let conn_rx = client.watch_state();
    tokio::spawn(async move {
        desk::forward_connection_state(conn_rx, conn_tx).await;
    });

    // 2. Dispatcher (debounced edits -> call/put pairs)
    let dispatcher = Dispatcher::new(pricer.clone(), cfg.debounce);
    let dispatch_tx = desk_tx.clone();
    tokio::spawn(async move {
        dispatcher.run(edits_rx, dispatch_tx).await;
    });

    // 3. Desk task (owns the grid throttler)
    let throttler = GridThrottler::new(pricer, GridSettings::from_config(&cfg), desk_tx.clone());
    let desk_state = app_state.clone();
    let desk_handle = tokio::spawn(async move {
        desk::run_desk(desk_state, throttler, desk_rx).await;
    });

    // 4. Axum HTTP + WS server
    let server_state = app_state.clone();
    let port = cfg.server_port;

    let app = axum::Router::new()
        .route("/api/state", axum::routing::get(server::routes::get_state))
        .route("/api/grid", axum::routing::get(server::routes::get_grid))
        .route("/api/params", axum::routing::post(server::routes::post_params))
        .route("/api/counters", axum::routing::get(server::routes::get_counters))
        .route("/ws", axum::routing::get(server::ws::ws_handler))
        .fallback_service(
            tower_http::services::ServeDir::new("dashboard/dist")
                .fallback(tower_http::services::ServeFile::new("dashboard/dist/index.html")),
        )
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(server_state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("bind error: {e}");
            std::process::exit(1);
        });

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await;
    if let Err(e) = served {
        tracing::error!("server error: {e}");
    }

    let _ = desk_tx.send(DeskEvent::Shutdown).await;
    let _ = desk_handle.await;
    tracing::info!(requests_sent = client.total_sent(), "pricing desk stopped");
}
