use crate::grid::accumulator::GridAccumulator;
use crate::pricing::types::PricingParameters;
use crate::state::{AppState, DeskSnapshot};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use std::sync::Arc;

/// GET /api/state -- current desk snapshot (from watch channel, no lock)
pub async fn get_state(
    State(state): State<Arc<AppState>>,
) -> Json<DeskSnapshot> {
    let snapshot = state.snapshot_rx.borrow().clone();
    Json(snapshot)
}

/// GET /api/grid -- heatmap of the current generation
pub async fn get_grid(
    State(state): State<Arc<AppState>>,
) -> Json<GridAccumulator> {
    let grid = state.snapshot_rx.borrow().grid.clone();
    Json(grid)
}

/// POST /api/params -- one raw parameter edit, debounced by the dispatcher
pub async fn post_params(
    State(state): State<Arc<AppState>>,
    Json(params): Json<PricingParameters>,
) -> (StatusCode, Json<serde_json::Value>) {
    if state.submit_edit(params).await {
        (StatusCode::ACCEPTED, Json(serde_json::json!({ "accepted": true })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "accepted": false, "error": "dispatcher stopped" })),
        )
    }
}

/// GET /api/counters -- performance counters (lock-free reads)
pub async fn get_counters(
    State(state): State<Arc<AppState>>,
) -> Json<serde_json::Value> {
    use portable_atomic::Ordering::Relaxed;
    Json(serde_json::json!({
        "connection": state.client.connection_state(),
        "correlation_mode": state.config.correlation_mode,
        "edits_received": state.counters.edits_received.load(Relaxed),
        "settles_priced": state.counters.settles_priced.load(Relaxed),
        "settles_failed": state.counters.settles_failed.load(Relaxed),
        "grid_runs": state.counters.grid_runs.load(Relaxed),
        "grid_cells": state.counters.grid_cells.load(Relaxed),
        "stale_cells_dropped": state.counters.stale_cells_dropped.load(Relaxed),
        "ws_messages_sent": state.counters.ws_messages_sent.load(Relaxed),
        "client": state.client.counters().to_json(),
    }))
}
