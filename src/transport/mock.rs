//! In-memory transport for tests. Every `connect` hands the test a
//! `MockServer` that sees the raw request frames and scripts the replies.

use super::{link_pair, Connector, Link, LinkEvent, LinkPeer, LINK_CAPACITY};
use crate::errors::{ClientError, ClientResult};
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct MockConnector {
    accepted: mpsc::UnboundedSender<MockServer>,
    refuse: Arc<AtomicUsize>,
    connects: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockServer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                accepted: tx,
                refuse: Arc::new(AtomicUsize::new(0)),
                connects: Arc::new(AtomicUsize::new(0)),
            },
            rx,
        )
    }

    /// Make the next `n` connection attempts fail.
    pub fn refuse_next(&self, n: usize) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn connect(&self) -> BoxFuture<'_, ClientResult<Link>> {
        Box::pin(async move {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let refused = self
                .refuse
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(ClientError::Connection("connection refused".into()));
            }
            let (link, peer) = link_pair(LINK_CAPACITY);
            self.accepted
                .send(MockServer { peer })
                .map_err(|_| ClientError::Connection("mock server gone".into()))?;
            Ok(link)
        })
    }
}

pub struct MockServer {
    peer: LinkPeer,
}

impl MockServer {
    /// Next request frame sent by the client, parsed as JSON.
    pub async fn next_request(&mut self) -> Option<Value> {
        let text = self.peer.outbound.recv().await?;
        serde_json::from_str(&text).ok()
    }

    /// Non-blocking peek used to assert nothing else is on the wire.
    pub fn try_next_request(&mut self) -> Option<Value> {
        let text = self.peer.outbound.try_recv().ok()?;
        serde_json::from_str(&text).ok()
    }

    pub async fn reply_raw(&self, text: impl Into<String>) {
        let _ = self.peer.inbound.send(LinkEvent::Frame(text.into())).await;
    }

    pub async fn reply_price(&self, request: &Value, price: Option<f64>) {
        self.reply_raw(price_frame(request, price)).await;
    }

    pub async fn close(&self) {
        let _ = self.peer.inbound.send(LinkEvent::Closed).await;
    }

    pub async fn fail(&self, reason: &str) {
        let _ = self.peer.inbound.send(LinkEvent::Failed(reason.into())).await;
    }
}

/// A `price_result` frame for `request`, echoing its id when it has one.
pub fn price_frame(request: &Value, price: Option<f64>) -> String {
    let mut frame = serde_json::json!({
        "type": "price_result",
        "data": {
            "price": price,
            "delta": if request["type"] == "call" { 0.6 } else { -0.4 },
            "vega": 0.38,
            "ts_server": 1_700_000_000_000_i64,
        }
    });
    if let Some(id) = request.get("id") {
        frame["id"] = id.clone();
    }
    frame.to_string()
}

/// Deterministic fake price so tests can tell which request an answer belongs to.
pub fn fake_price(request: &Value) -> f64 {
    let spot = request["spot"].as_f64().unwrap_or(0.0);
    let vol = request["volatility"].as_f64().unwrap_or(0.0);
    let side = if request["type"] == "call" { 1.0 } else { -1.0 };
    side * (spot + vol * 1000.0)
}

/// Answers every request on every accepted connection with `fake_price`.
pub fn spawn_echo_server(mut accepted: mpsc::UnboundedReceiver<MockServer>) {
    tokio::spawn(async move {
        while let Some(mut server) = accepted.recv().await {
            tokio::spawn(async move {
                while let Some(request) = server.next_request().await {
                    let price = fake_price(&request);
                    server.reply_price(&request, Some(price)).await;
                }
            });
        }
    });
}
