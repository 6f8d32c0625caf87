pub mod ws;

#[cfg(test)]
pub mod mock;

use crate::errors::{ClientError, ClientResult};
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

/// Frames buffered between the client driver and the socket task.
pub const LINK_CAPACITY: usize = 256;

/// Something that can open a fresh physical channel to the pricing server.
/// The client never reaches for a global socket; it is handed one of these.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'_, ClientResult<Link>>;
}

/// Events flowing from the socket to the client driver.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Frame(String),
    /// Orderly close initiated by the server.
    Closed,
    /// Transport error. The link is dead.
    Failed(String),
}

/// Client half of one open connection. Dropping it tears the socket down.
pub struct Link {
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<LinkEvent>,
}

/// Socket half of a link, driven by the transport task.
pub struct LinkPeer {
    pub outbound: mpsc::Receiver<String>,
    pub inbound: mpsc::Sender<LinkEvent>,
}

pub fn link_pair(capacity: usize) -> (Link, LinkPeer) {
    let (out_tx, out_rx) = mpsc::channel(capacity);
    let (in_tx, in_rx) = mpsc::channel(capacity);
    (
        Link {
            outbound: out_tx,
            inbound: in_rx,
        },
        LinkPeer {
            outbound: out_rx,
            inbound: in_tx,
        },
    )
}

impl Link {
    pub async fn send(&self, frame: String) -> ClientResult<()> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| ClientError::Connection("socket writer has shut down".into()))
    }

    /// Next inbound event. A vanished socket task reads as a close.
    pub async fn recv(&mut self) -> LinkEvent {
        self.inbound.recv().await.unwrap_or(LinkEvent::Closed)
    }
}
