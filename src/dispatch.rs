use crate::errors::ClientResult;
use crate::pricing::types::{ContractSide, DualPricing, PricingParameters, PricingRequest};
use crate::pricing::Pricer;
use crate::state::DeskEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Turns a stream of raw parameter edits into priced call/put pairs.
///
/// Edits are debounced on the trailing edge: every edit restarts a single
/// timer, and only the vector present when it fires is considered. A settled
/// vector equal to the last successfully dispatched one is ignored.
pub struct Dispatcher<P: Pricer> {
    pricer: Arc<P>,
    debounce: Duration,
    last_dispatched: Option<PricingParameters>,
}

impl<P: Pricer> Dispatcher<P> {
    pub fn new(pricer: Arc<P>, debounce: Duration) -> Self {
        Self {
            pricer,
            debounce,
            last_dispatched: None,
        }
    }

    #[inline]
    pub fn last_dispatched(&self) -> Option<PricingParameters> {
        self.last_dispatched
    }

    /// Runs until the edit stream closes. An edit still waiting on the timer
    /// at that point is discarded.
    pub async fn run(
        mut self,
        mut edits: mpsc::Receiver<PricingParameters>,
        events: mpsc::Sender<DeskEvent>,
    ) {
        tracing::info!(debounce_ms = self.debounce.as_millis() as u64, "dispatcher started");

        let timer = tokio::time::sleep(self.debounce);
        tokio::pin!(timer);
        let mut pending: Option<PricingParameters> = None;

        loop {
            tokio::select! {
                edit = edits.recv() => match edit {
                    Some(params) => {
                        pending = Some(params);
                        timer.as_mut().reset(Instant::now() + self.debounce);
                    }
                    None => {
                        if pending.is_some() {
                            tracing::debug!("edit stream closed, discarding unsettled edit");
                        }
                        break;
                    }
                },
                () = &mut timer, if pending.is_some() => {
                    let Some(params) = pending.take() else { continue };
                    let Some(outcome) = self.settle(params).await else { continue };
                    let event = match outcome {
                        Ok(pricing) => DeskEvent::Priced(Box::new(pricing)),
                        Err(e) => DeskEvent::PricingFailed {
                            params,
                            message: e.to_string(),
                        },
                    };
                    if events.send(event).await.is_err() {
                        tracing::error!("desk channel closed, dispatcher shutting down");
                        break;
                    }
                }
            }
        }

        tracing::info!("dispatcher stopped");
    }

    /// Prices a settled vector. Returns `None` when it matches the last
    /// dispatched vector and nothing was sent.
    pub async fn settle(&mut self, params: PricingParameters) -> Option<ClientResult<DualPricing>> {
        if self.last_dispatched == Some(params) {
            tracing::debug!(spot = params.spot, "settled parameters unchanged, skipping");
            return None;
        }

        if let Err(e) = params.validate() {
            self.last_dispatched = None;
            tracing::warn!(error = %e, "rejected parameter edit");
            return Some(Err(e));
        }

        let (call, put) = tokio::join!(
            self.pricer.price(PricingRequest::new(params, ContractSide::Call)),
            self.pricer.price(PricingRequest::new(params, ContractSide::Put)),
        );

        match (call, put) {
            (Ok(call), Ok(put)) => {
                self.last_dispatched = Some(params);
                let pricing = DualPricing { call, put };
                tracing::info!(
                    spot = params.spot,
                    strike = params.strike,
                    volatility = params.volatility,
                    "{}",
                    pricing.summary()
                );
                Some(Ok(pricing))
            }
            (Err(e), _) | (_, Err(e)) => {
                self.last_dispatched = None;
                if e.is_connection() {
                    tracing::warn!(error = %e, "pricing failed");
                } else {
                    tracing::error!(error = %e, "pricing failed");
                }
                Some(Err(e))
            }
        }
    }
}
