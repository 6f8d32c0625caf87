use super::{link_pair, Connector, Link, LinkEvent, LinkPeer, LINK_CAPACITY};
use crate::errors::{ClientError, ClientResult};
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};

/// Opens WebSocket connections to the pricing server.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(url: &str, connect_timeout: Duration) -> Self {
        Self {
            url: url.to_string(),
            connect_timeout,
        }
    }
}

impl Connector for WsConnector {
    fn connect(&self) -> BoxFuture<'_, ClientResult<Link>> {
        Box::pin(async move {
            tracing::debug!(url = %self.url, "opening pricing socket");
            let (ws, _) = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
                .await
                .map_err(|_| {
                    ClientError::Connection(format!(
                        "connect to {} timed out after {}ms",
                        self.url,
                        self.connect_timeout.as_millis()
                    ))
                })??;

            let (link, peer) = link_pair(LINK_CAPACITY);
            tokio::spawn(pump_socket(ws, peer));
            Ok(link)
        })
    }
}

/// Shuttles frames between the socket and the link channels until either
/// side goes away. Exactly one terminal event is reported per socket.
async fn pump_socket<S>(ws: WebSocketStream<S>, mut peer: LinkPeer)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            frame = peer.outbound.recv() => {
                match frame {
                    Some(text) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            tracing::warn!(error = %e, "pricing socket write failed");
                            let _ = peer.inbound.send(LinkEvent::Failed(e.to_string())).await;
                            return;
                        }
                    }
                    None => {
                        // Link dropped by the client (reset or shutdown)
                        let _ = write.send(Message::Close(None)).await;
                        return;
                    }
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if peer.inbound.send(LinkEvent::Frame(text.as_str().to_owned())).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        if peer.inbound.send(LinkEvent::Frame(text)).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("pricing socket closed by server");
                        let _ = peer.inbound.send(LinkEvent::Closed).await;
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "pricing socket read failed");
                        let _ = peer.inbound.send(LinkEvent::Failed(e.to_string())).await;
                        return;
                    }
                }
            }
        }
    }
}
