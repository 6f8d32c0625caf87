use super::axes::GridAxes;
use crate::config::AppConfig;
use crate::pricing::types::{ContractSide, GridCell, PricingParameters, PricingRequest};
use crate::pricing::Pricer;
use crate::state::DeskEvent;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy)]
pub struct GridSettings {
    pub points: usize,
    /// Minimum spacing between two dispatches on the same side.
    pub interval: Duration,
    /// Cells of one side allowed in flight at once.
    pub concurrency: usize,
}

impl GridSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            points: config.grid_points,
            interval: config.grid_interval,
            concurrency: config.grid_concurrency.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum GridOutcome {
    Completed { cells: usize },
    Superseded { cells: usize },
}

/// Sweeps the (spot, volatility) heatmap for a settled parameter set.
///
/// Each side drains its cells through a rate-limited work queue: at most
/// `concurrency` requests outstanding, at least `interval` between two
/// dispatches. Starting a new sweep bumps the generation, which cancels any
/// older sweep between cells and drops its in-flight request.
pub struct GridThrottler<P: Pricer> {
    pricer: Arc<P>,
    settings: GridSettings,
    generation: watch::Sender<u64>,
    events: mpsc::Sender<DeskEvent>,
}

impl<P: Pricer> GridThrottler<P> {
    pub fn new(pricer: Arc<P>, settings: GridSettings, events: mpsc::Sender<DeskEvent>) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            pricer,
            settings,
            generation,
            events,
        }
    }

    #[inline]
    pub fn current_generation(&self) -> u64 {
        *self.generation.borrow()
    }

    #[inline]
    pub fn axes_for(&self, params: &PricingParameters) -> GridAxes {
        GridAxes::for_params(params, self.settings.points)
    }

    /// Supersedes any running sweep and starts one for `params`.
    pub fn start(&self, params: PricingParameters) -> (u64, JoinHandle<()>) {
        let mut generation = 0;
        self.generation.send_modify(|g| {
            *g += 1;
            generation = *g;
        });

        let sweep = Sweep {
            pricer: self.pricer.clone(),
            settings: self.settings,
            params,
            axes: self.axes_for(&params),
            generation,
            events: self.events.clone(),
        };
        let cancel = self.generation.subscribe();
        tracing::info!(generation, spot = params.spot, volatility = params.volatility, "grid sweep started");
        (generation, tokio::spawn(sweep.run(cancel)))
    }

    /// Cancels the running sweep without starting another.
    pub fn cancel(&self) {
        self.generation.send_modify(|g| *g += 1);
    }
}

struct Sweep<P: Pricer> {
    pricer: Arc<P>,
    settings: GridSettings,
    params: PricingParameters,
    axes: GridAxes,
    generation: u64,
    events: mpsc::Sender<DeskEvent>,
}

impl<P: Pricer> Sweep<P> {
    async fn run(self, cancel: watch::Receiver<u64>) {
        let (call, put) = tokio::join!(
            self.run_side(ContractSide::Call, cancel.clone()),
            self.run_side(ContractSide::Put, cancel),
        );
        tracing::debug!(generation = self.generation, ?call, ?put, "grid sweep finished");
    }

    async fn run_side(&self, side: ContractSide, cancel: watch::Receiver<u64>) -> GridOutcome {
        let superseded = superseded(cancel, self.generation);
        tokio::pin!(superseded);

        let mut ticker = (!self.settings.interval.is_zero()).then(|| {
            let mut t = tokio::time::interval(self.settings.interval);
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            t
        });

        let mut cells = self.axes.cells();
        let mut in_flight = FuturesUnordered::new();
        let mut done = 0usize;

        let outcome = 'sweep: loop {
            while in_flight.len() < self.settings.concurrency {
                let Some((spot, vol)) = cells.next() else { break };
                if let Some(t) = ticker.as_mut() {
                    tokio::select! {
                        biased;
                        () = &mut superseded => break 'sweep GridOutcome::Superseded { cells: done },
                        _ = t.tick() => {}
                    }
                }
                let request = PricingRequest::new(self.params.with_spot_vol(spot, vol), side);
                in_flight.push(price_cell(self.pricer.as_ref(), request));
            }

            if in_flight.is_empty() {
                break GridOutcome::Completed { cells: done };
            }

            tokio::select! {
                biased;
                () = &mut superseded => break GridOutcome::Superseded { cells: done },
                Some(cell) = in_flight.next() => {
                    done += 1;
                    let event = DeskEvent::GridCell { generation: self.generation, side, cell };
                    if self.events.send(event).await.is_err() {
                        break GridOutcome::Superseded { cells: done };
                    }
                }
            }
        };

        if let GridOutcome::Superseded { cells } = outcome {
            tracing::debug!(generation = self.generation, %side, cells, "grid sweep superseded");
        }
        let _ = self
            .events
            .send(DeskEvent::GridFinished {
                generation: self.generation,
                side,
                outcome,
            })
            .await;
        outcome
    }
}

/// Resolves once the generation moves past `generation` or the throttler is gone.
async fn superseded(mut cancel: watch::Receiver<u64>, generation: u64) {
    let _ = cancel.wait_for(|current| *current != generation).await;
}

/// Prices one cell. A failure degrades the cell to an unknown price.
async fn price_cell<P: Pricer>(pricer: &P, request: PricingRequest) -> GridCell {
    let price = match pricer.price(request).await {
        Ok(result) => result.price,
        Err(e) => {
            tracing::debug!(
                side = %request.side,
                spot = request.params.spot,
                volatility = request.params.volatility,
                error = %e,
                "grid cell failed"
            );
            None
        }
    };
    GridCell {
        spot: request.params.spot,
        volatility: request.params.volatility,
        price,
    }
}
