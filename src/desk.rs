use crate::grid::throttler::{GridOutcome, GridThrottler};
use crate::pricing::types::{ConnectionState, DualPricing};
use crate::pricing::Pricer;
use crate::state::{AppState, DeskEvent, WsMessage};
use portable_atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Desk loop. Owns the grid throttler, folds every event into the shared
/// snapshot and fans it out to dashboard clients.
pub async fn run_desk<P: Pricer>(
    state: Arc<AppState>,
    throttler: GridThrottler<P>,
    mut rx: mpsc::Receiver<DeskEvent>,
) {
    tracing::info!("desk task started");

    while let Some(event) = rx.recv().await {
        match event {
            DeskEvent::Priced(pricing) => on_priced(&state, &throttler, *pricing),

            DeskEvent::PricingFailed { params, message } => {
                state.counters.settles_failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(spot = params.spot, strike = params.strike, %message, "settle failed");
                state.snapshot_tx.send_modify(|s| {
                    s.last_error = Some(message.clone());
                    touch(s);
                });
                state.broadcast(WsMessage::PricingError { message });
            }

            DeskEvent::GridCell { generation, side, cell } => {
                let mut accepted = false;
                state.snapshot_tx.send_if_modified(|s| {
                    accepted = s.grid.accept(generation, side, cell);
                    accepted
                });
                if accepted {
                    state.counters.grid_cells.fetch_add(1, Ordering::Relaxed);
                    state.broadcast(WsMessage::GridCell {
                        generation,
                        side,
                        spot: cell.spot,
                        volatility: cell.volatility,
                        price: cell.price,
                    });
                } else {
                    state.counters.stale_cells_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }

            DeskEvent::GridFinished { generation, side, outcome } => match outcome {
                GridOutcome::Completed { cells } => {
                    let unknown = {
                        let snapshot = state.snapshot_rx.borrow();
                        if snapshot.grid.generation != generation {
                            continue;
                        }
                        snapshot.grid.unknown(side)
                    };
                    tracing::info!(generation, %side, cells, unknown, "grid side complete");
                    state.broadcast(WsMessage::GridDone {
                        generation,
                        side,
                        cells,
                        unknown,
                    });
                }
                GridOutcome::Superseded { cells } => {
                    tracing::debug!(generation, %side, cells, "grid side superseded");
                }
            },

            DeskEvent::Connection(connection) => {
                tracing::info!(state = %connection, "pricing connection");
                state.snapshot_tx.send_modify(|s| {
                    s.connection = connection;
                    touch(s);
                });
                state.broadcast(WsMessage::Connection { state: connection });
            }

            DeskEvent::Shutdown => {
                throttler.cancel();
                break;
            }
        }
    }

    tracing::info!("desk task shutting down");
}

fn on_priced<P: Pricer>(state: &AppState, throttler: &GridThrottler<P>, pricing: DualPricing) {
    state.counters.settles_priced.fetch_add(1, Ordering::Relaxed);
    let params = pricing.params();
    let summary = pricing.summary();
    let server_time = pricing.call.server_time().map(|t| t.to_rfc3339());

    let (generation, _sweep) = throttler.start(params);
    let axes = throttler.axes_for(&params);
    state.counters.grid_runs.fetch_add(1, Ordering::Relaxed);

    state.snapshot_tx.send_modify(|s| {
        s.pricing = Some(pricing.clone());
        s.last_error = None;
        s.grid.begin(generation, params, axes.clone());
        touch(s);
    });

    state.broadcast(WsMessage::Pricing {
        pricing,
        summary,
        server_time,
    });
    state.broadcast(WsMessage::GridStarted {
        generation,
        spots: axes.spots.to_vec(),
        vols: axes.vols.to_vec(),
    });
}

fn touch(snapshot: &mut crate::state::DeskSnapshot) {
    snapshot.updated_at = chrono::Utc::now().to_rfc3339();
}

/// Relays connection state transitions into the desk loop.
pub async fn forward_connection_state(
    mut state_rx: watch::Receiver<ConnectionState>,
    tx: mpsc::Sender<DeskEvent>,
) {
    let initial = *state_rx.borrow_and_update();
    if tx.send(DeskEvent::Connection(initial)).await.is_err() {
        return;
    }
    while state_rx.changed().await.is_ok() {
        let current = *state_rx.borrow_and_update();
        if tx.send(DeskEvent::Connection(current)).await.is_err() {
            break;
        }
    }
}
