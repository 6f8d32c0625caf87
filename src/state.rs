use crate::client::PricingClient;
use crate::config::AppConfig;
use crate::grid::accumulator::GridAccumulator;
use crate::grid::throttler::GridOutcome;
use crate::pricing::types::{ConnectionState, ContractSide, DualPricing, GridCell, PricingParameters};
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

// ── Messages INTO the desk loop (bounded channel) ──

#[derive(Debug, Clone)]
pub enum DeskEvent {
    /// A settle produced call and put results.
    Priced(Box<DualPricing>),
    /// A settle failed; one notification per logical operation.
    PricingFailed {
        params: PricingParameters,
        message: String,
    },
    GridCell {
        generation: u64,
        side: ContractSide,
        cell: GridCell,
    },
    GridFinished {
        generation: u64,
        side: ContractSide,
        outcome: GridOutcome,
    },
    Connection(ConnectionState),
    Shutdown,
}

// ── Messages OUT to dashboard clients ──

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "pricing")]
    Pricing {
        pricing: DualPricing,
        summary: String,
        server_time: Option<String>,
    },

    #[serde(rename = "pricing_error")]
    PricingError { message: String },

    #[serde(rename = "grid_started")]
    GridStarted {
        generation: u64,
        spots: Vec<f64>,
        vols: Vec<f64>,
    },

    #[serde(rename = "grid_cell")]
    GridCell {
        generation: u64,
        side: ContractSide,
        spot: f64,
        volatility: f64,
        price: Option<f64>,
    },

    #[serde(rename = "grid_done")]
    GridDone {
        generation: u64,
        side: ContractSide,
        cells: usize,
        unknown: usize,
    },

    #[serde(rename = "connection")]
    Connection { state: ConnectionState },
}

/// Inbound dashboard messages over the WebSocket.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "params")]
    Params(PricingParameters),
}

// ── Desk snapshot for dashboard (sent via watch channel) ──

#[derive(Debug, Clone, serde::Serialize)]
pub struct DeskSnapshot {
    pub connection: ConnectionState,
    pub pricing: Option<DualPricing>,
    pub last_error: Option<String>,
    pub grid: GridAccumulator,
    pub updated_at: String,
}

impl Default for DeskSnapshot {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Closed,
            pricing: None,
            last_error: None,
            grid: GridAccumulator::new(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// ── Performance Counters (lock-free) ──

pub struct DeskCounters {
    pub edits_received: AtomicU64,
    pub settles_priced: AtomicU64,
    pub settles_failed: AtomicU64,
    pub grid_runs: AtomicU64,
    pub grid_cells: AtomicU64,
    pub stale_cells_dropped: AtomicU64,
    pub ws_messages_sent: AtomicU64,
}

impl DeskCounters {
    pub fn new() -> Self {
        Self {
            edits_received: AtomicU64::new(0),
            settles_priced: AtomicU64::new(0),
            settles_failed: AtomicU64::new(0),
            grid_runs: AtomicU64::new(0),
            grid_cells: AtomicU64::new(0),
            stale_cells_dropped: AtomicU64::new(0),
            ws_messages_sent: AtomicU64::new(0),
        }
    }
}

// ── Application shared state (channels, not locks) ──

pub struct AppState {
    pub config: AppConfig,
    pub client: PricingClient,

    // Desk -> Dashboard: latest snapshot (watch = single producer, multi consumer)
    pub snapshot_tx: watch::Sender<DeskSnapshot>,
    pub snapshot_rx: watch::Receiver<DeskSnapshot>,

    // Desk -> Dashboard: event stream (broadcast for WS clients)
    pub ws_tx: broadcast::Sender<WsMessage>,

    // Dashboard -> Dispatcher: raw parameter edits
    pub edits_tx: mpsc::Sender<PricingParameters>,

    pub counters: DeskCounters,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        client: PricingClient,
        edits_tx: mpsc::Sender<PricingParameters>,
    ) -> Arc<Self> {
        let (ws_tx, _) = broadcast::channel(2048);
        let (snapshot_tx, snapshot_rx) = watch::channel(DeskSnapshot::default());

        Arc::new(Self {
            config,
            client,
            snapshot_tx,
            snapshot_rx,
            ws_tx,
            edits_tx,
            counters: DeskCounters::new(),
        })
    }

    #[inline]
    pub fn broadcast(&self, msg: WsMessage) {
        self.counters.ws_messages_sent.fetch_add(1, Ordering::Relaxed);
        let _ = self.ws_tx.send(msg);
    }

    /// Forwards one raw edit from the rendering layer to the dispatcher.
    pub async fn submit_edit(&self, params: PricingParameters) -> bool {
        self.counters.edits_received.fetch_add(1, Ordering::Relaxed);
        self.edits_tx.send(params).await.is_ok()
    }
}
