pub mod connection;
pub mod correlator;
pub mod driver;

use crate::config::AppConfig;
use crate::errors::{ClientError, ClientResult};
use crate::pricing::types::{ConnectionState, PricingRequest, PricingResult};
use crate::pricing::Pricer;
use crate::transport::Connector;
use connection::ConnectionManager;
use correlator::{Correlator, Reply};
use futures_util::future::BoxFuture;
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// Bounded queue between callers and the driver task.
const COMMAND_CAPACITY: usize = 512;

#[derive(Debug)]
pub enum ClientCommand {
    Price { request: PricingRequest, reply: Reply },
}

// ── Lock-free counters ──

pub struct ClientCounters {
    pub requests_sent: AtomicU64,
    pub responses_received: AtomicU64,
    pub protocol_errors: AtomicU64,
    pub connection_errors: AtomicU64,
    pub connects: Arc<AtomicU64>,
}

impl ClientCounters {
    pub fn new() -> Self {
        Self {
            requests_sent: AtomicU64::new(0),
            responses_received: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            connects: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use portable_atomic::Ordering::Relaxed;
        serde_json::json!({
            "requests_sent": self.requests_sent.load(Relaxed),
            "responses_received": self.responses_received.load(Relaxed),
            "protocol_errors": self.protocol_errors.load(Relaxed),
            "connection_errors": self.connection_errors.load(Relaxed),
            "connects": self.connects.load(Relaxed),
        })
    }
}

/// Cheap, cloneable handle to the pricing connection.
/// All methods return Result, never panic.
#[derive(Clone)]
pub struct PricingClient {
    tx: mpsc::Sender<ClientCommand>,
    state_rx: watch::Receiver<ConnectionState>,
    counters: Arc<ClientCounters>,
}

impl PricingClient {
    /// Spawns the driver task that owns the connection and returns a handle.
    pub fn spawn<C: Connector>(connector: C, config: &AppConfig) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Closed);
        let counters = Arc::new(ClientCounters::new());

        let conn = ConnectionManager::new(connector, state_tx, counters.connects.clone());
        let correlator = Correlator::new(
            config.correlation_mode,
            config.max_in_flight,
            config.request_timeout,
        );
        tokio::spawn(driver::run_client(conn, correlator, rx, counters.clone()));

        Self {
            tx,
            state_rx,
            counters,
        }
    }

    /// Prices one request. Resolves with the server's answer or rejects with
    /// a validation, connection, or protocol error.
    pub async fn request(&self, request: PricingRequest) -> ClientResult<PricingResult> {
        request.params.validate()?;

        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ClientCommand::Price { request, reply })
            .await
            .map_err(|_| ClientError::ChannelClosed("pricing client".into()))?;

        rx.await
            .map_err(|_| ClientError::ChannelClosed("pricing reply dropped".into()))?
    }

    #[inline]
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    #[inline]
    pub fn counters(&self) -> &ClientCounters {
        &self.counters
    }

    pub fn total_sent(&self) -> u64 {
        self.counters.requests_sent.load(Ordering::Relaxed)
    }
}

impl Pricer for PricingClient {
    fn price(&self, request: PricingRequest) -> BoxFuture<'_, ClientResult<PricingResult>> {
        Box::pin(self.request(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorrelationMode;
    use crate::pricing::types::{ContractSide, PricingParameters};
    use crate::transport::mock::{MockConnector, MockServer};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn config(mode: CorrelationMode) -> AppConfig {
        AppConfig {
            correlation_mode: mode,
            request_timeout: Duration::from_secs(2),
            ..AppConfig::default()
        }
    }

    fn setup(mode: CorrelationMode) -> (PricingClient, MockConnector, UnboundedReceiver<MockServer>) {
        let (connector, accepted) = MockConnector::new();
        let client = PricingClient::spawn(connector.clone(), &config(mode));
        (client, connector, accepted)
    }

    fn request(spot: f64, side: ContractSide) -> PricingRequest {
        PricingRequest::new(PricingParameters { spot, ..Default::default() }, side)
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let (client, _connector, mut accepted) = setup(CorrelationMode::Positional);
        let handle = {
            let client = client.clone();
            tokio::spawn(async move { client.request(request(100.0, ContractSide::Call)).await })
        };

        let mut server = accepted.recv().await.unwrap();
        let req = server.next_request().await.unwrap();
        assert_eq!(req["type"], "call");
        server.reply_price(&req, Some(10.45)).await;

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.price, Some(10.45));
        assert_eq!(result.request.side, ContractSide::Call);
        assert_eq!(client.connection_state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_validation_error_never_reaches_socket() {
        let (client, connector, _accepted) = setup(CorrelationMode::Positional);
        let err = client.request(request(-1.0, ContractSide::Call)).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(connector.connect_count(), 0);
        assert_eq!(client.total_sent(), 0);
    }

    #[tokio::test]
    async fn test_positional_serialises_concurrent_sends() {
        let (client, _connector, mut accepted) = setup(CorrelationMode::Positional);
        let call = {
            let client = client.clone();
            tokio::spawn(async move { client.request(request(100.0, ContractSide::Call)).await })
        };
        let put = {
            let client = client.clone();
            tokio::spawn(async move { client.request(request(100.0, ContractSide::Put)).await })
        };

        let mut server = accepted.recv().await.unwrap();
        let first = server.next_request().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(
            server.try_next_request().is_none(),
            "second request must not be on the wire before the first is answered"
        );

        server.reply_price(&first, Some(1.0)).await;
        let second = server.next_request().await.unwrap();
        assert_ne!(first["type"], second["type"]);
        server.reply_price(&second, Some(2.0)).await;

        let call = call.await.unwrap().unwrap();
        let put = put.await.unwrap().unwrap();
        // Each answer lands on the request that was on the wire when it arrived
        let first_side = if first["type"] == "call" { ContractSide::Call } else { ContractSide::Put };
        let (first_res, second_res) = if first_side == ContractSide::Call { (call, put) } else { (put, call) };
        assert_eq!(first_res.price, Some(1.0));
        assert_eq!(second_res.price, Some(2.0));
    }

    #[tokio::test]
    async fn test_tagged_attributes_reordered_responses() {
        let (client, _connector, mut accepted) = setup(CorrelationMode::Tagged);
        let call = {
            let client = client.clone();
            tokio::spawn(async move { client.request(request(100.0, ContractSide::Call)).await })
        };
        let put = {
            let client = client.clone();
            tokio::spawn(async move { client.request(request(100.0, ContractSide::Put)).await })
        };

        let mut server = accepted.recv().await.unwrap();
        let a = server.next_request().await.unwrap();
        let b = server.next_request().await.unwrap();
        assert!(a.get("id").is_some() && b.get("id").is_some());

        // Answer in reverse order, pricing each by its own side
        for req in [&b, &a] {
            let price = if req["type"] == "call" { 10.45 } else { 5.57 };
            server.reply_price(req, Some(price)).await;
        }

        let call = call.await.unwrap().unwrap();
        let put = put.await.unwrap().unwrap();
        assert_eq!(call.request.side, ContractSide::Call);
        assert_eq!(call.price, Some(10.45));
        assert_eq!(put.request.side, ContractSide::Put);
        assert_eq!(put.price, Some(5.57));
    }

    #[tokio::test]
    async fn test_reconnect_after_transport_error() {
        let (client, connector, mut accepted) = setup(CorrelationMode::Positional);
        let doomed = {
            let client = client.clone();
            tokio::spawn(async move { client.request(request(100.0, ContractSide::Call)).await })
        };

        let mut server = accepted.recv().await.unwrap();
        server.next_request().await.unwrap();
        server.fail("connection reset").await;

        let err = doomed.await.unwrap().unwrap_err();
        assert!(err.is_connection(), "pending request must reject, got {err:?}");

        let retry = {
            let client = client.clone();
            tokio::spawn(async move { client.request(request(100.0, ContractSide::Call)).await })
        };
        let mut server = accepted.recv().await.unwrap();
        let req = server.next_request().await.unwrap();
        server.reply_price(&req, Some(10.45)).await;

        assert_eq!(retry.await.unwrap().unwrap().price, Some(10.45));
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_server_close_rejects_pending_then_reconnects() {
        let (client, _connector, mut accepted) = setup(CorrelationMode::Positional);
        let pending = {
            let client = client.clone();
            tokio::spawn(async move { client.request(request(100.0, ContractSide::Put)).await })
        };

        let mut server = accepted.recv().await.unwrap();
        server.next_request().await.unwrap();
        server.close().await;
        assert!(pending.await.unwrap().unwrap_err().is_connection());

        let mut state = client.watch_state();
        state.wait_for(|s| *s == ConnectionState::Closed).await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_connect_then_lazy_retry() {
        let (client, connector, accepted) = setup(CorrelationMode::Positional);
        crate::transport::mock::spawn_echo_server(accepted);
        connector.refuse_next(1);

        let err = client.request(request(100.0, ContractSide::Call)).await.unwrap_err();
        assert!(err.is_connection());
        assert_eq!(client.connection_state(), ConnectionState::Failed);

        let ok = client.request(request(100.0, ContractSide::Call)).await.unwrap();
        assert_eq!(ok.price, Some(100.0 + 0.2 * 1000.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_positional_timeout_resets_connection() {
        let (client, connector, mut accepted) = setup(CorrelationMode::Positional);
        let slow = {
            let client = client.clone();
            tokio::spawn(async move { client.request(request(100.0, ContractSide::Call)).await })
        };

        let mut server = accepted.recv().await.unwrap();
        let req = server.next_request().await.unwrap();
        let err = slow.await.unwrap().unwrap_err();
        assert!(err.is_connection());

        // A late answer on the old socket cannot reach the next request
        server.reply_price(&req, Some(999.0)).await;
        let next = {
            let client = client.clone();
            tokio::spawn(async move { client.request(request(100.0, ContractSide::Put)).await })
        };
        let mut fresh = accepted.recv().await.unwrap();
        let req = fresh.next_request().await.unwrap();
        fresh.reply_price(&req, Some(5.57)).await;

        assert_eq!(next.await.unwrap().unwrap().price, Some(5.57));
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_vanished_socket_task_rejects_pending() {
        let (connector, mut accepted) = MockConnector::new();
        let client = PricingClient::spawn(connector, &config(CorrelationMode::Positional));
        let pending = {
            let client = client.clone();
            tokio::spawn(async move { client.request(request(100.0, ContractSide::Call)).await })
        };
        let mut server = accepted.recv().await.unwrap();
        server.next_request().await.unwrap();

        // Losing the socket task entirely reads as a close
        drop(server);
        assert!(pending.await.unwrap().unwrap_err().is_connection());
    }
}
