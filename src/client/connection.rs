use crate::errors::{ClientError, ClientResult};
use crate::pricing::types::ConnectionState;
use crate::transport::{Connector, Link, LinkEvent};
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Owns the single physical link to the pricing server.
///
/// State machine:
///   Closed/Failed --ensure_connection--> Connecting --ok--> Open
///   Connecting --err--> Failed
///   Open --server close--> Closed
///   Open --transport error--> Failed
///
/// The link is established lazily and reused until it dies; the next
/// `ensure_connection` after a close or failure opens a fresh one.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    link: Option<Link>,
    state_tx: watch::Sender<ConnectionState>,
    connects: Arc<AtomicU64>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, state_tx: watch::Sender<ConnectionState>, connects: Arc<AtomicU64>) -> Self {
        state_tx.send_replace(ConnectionState::Closed);
        Self {
            connector,
            link: None,
            state_tx,
            connects,
        }
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state_tx.send_replace(next);
        if prev != next {
            tracing::debug!(from = %prev, to = %next, "connection state");
        }
    }

    /// Returns the open link, connecting first if needed.
    pub async fn ensure_connection(&mut self) -> ClientResult<&mut Link> {
        if self.link.is_none() {
            self.set_state(ConnectionState::Connecting);
            match self.connector.connect().await {
                Ok(link) => {
                    let n = self.connects.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::info!(connects = n, "pricing connection open");
                    self.link = Some(link);
                    self.set_state(ConnectionState::Open);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "pricing connection failed");
                    self.set_state(ConnectionState::Failed);
                    return Err(match e {
                        ClientError::Connection(_) => e,
                        other => ClientError::Connection(other.to_string()),
                    });
                }
            }
        }
        self.link
            .as_mut()
            .ok_or_else(|| ClientError::Connection("link missing after connect".into()))
    }

    /// Next event from the open link. Never resolves while disconnected.
    pub async fn next_event(&mut self) -> LinkEvent {
        match self.link.as_mut() {
            Some(link) => link.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Applies a terminal link event. Returns the error every in-flight
    /// request must be rejected with, or `None` for a data frame.
    pub fn on_terminal(&mut self, event: &LinkEvent) -> Option<ClientError> {
        match event {
            LinkEvent::Frame(_) => None,
            LinkEvent::Closed => {
                self.link = None;
                self.set_state(ConnectionState::Closed);
                Some(ClientError::Connection("connection closed before response".into()))
            }
            LinkEvent::Failed(reason) => {
                self.link = None;
                self.set_state(ConnectionState::Failed);
                Some(ClientError::Connection(reason.clone()))
            }
        }
    }

    /// Marks the current link dead after a send failure.
    pub fn invalidate(&mut self, error: &ClientError) {
        if self.link.take().is_some() {
            tracing::warn!(error = %error, "pricing connection invalidated");
        }
        self.set_state(ConnectionState::Failed);
    }

    /// Drops the link on purpose; the next request reconnects.
    pub fn reset(&mut self, reason: &str) {
        if self.link.take().is_some() {
            tracing::info!(reason, "resetting pricing connection");
            self.set_state(ConnectionState::Closed);
        }
    }
}
