//! Scriptable `Pricer` for dispatcher and grid tests.

use super::types::{ContractSide, PricingRequest, PricingResult};
use super::Pricer;
use crate::errors::{ClientError, ClientResult};
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

type FailWhen = Box<dyn Fn(&PricingRequest) -> bool + Send + Sync>;

pub struct FakePricer {
    delay: Duration,
    fail_all: AtomicBool,
    fail_when: Option<FailWhen>,
    log: Mutex<Vec<(Instant, PricingRequest)>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakePricer {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            fail_all: AtomicBool::new(false),
            fail_when: None,
            log: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_when(mut self, f: impl Fn(&PricingRequest) -> bool + Send + Sync + 'static) -> Self {
        self.fail_when = Some(Box::new(f));
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<PricingRequest> {
        self.log.lock().unwrap().iter().map(|(_, r)| *r).collect()
    }

    pub fn dispatch_times(&self) -> Vec<Instant> {
        self.log.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn count(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn price_of(request: &PricingRequest) -> f64 {
        let side = match request.side {
            ContractSide::Call => 1.0,
            ContractSide::Put => -1.0,
        };
        side * (request.params.spot + request.params.volatility * 1000.0)
    }
}

impl Pricer for FakePricer {
    fn price(&self, request: PricingRequest) -> BoxFuture<'_, ClientResult<PricingResult>> {
        Box::pin(async move {
            self.log.lock().unwrap().push((Instant::now(), request));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let fail = self.fail_all.load(Ordering::SeqCst)
                || self.fail_when.as_ref().is_some_and(|f| f(&request));
            if fail {
                return Err(ClientError::Connection("fake pricer down".into()));
            }
            Ok(PricingResult {
                price: Some(Self::price_of(&request)),
                delta: Some(0.5),
                vega: Some(0.4),
                server_ts: 1_700_000_000_000.0,
                request,
            })
        })
    }
}
