use super::connection::ConnectionManager;
use super::correlator::{Correlator, FrameOutcome};
use super::{ClientCommand, ClientCounters};
use crate::config::CorrelationMode;
use crate::errors::ClientError;
use crate::transport::{Connector, LinkEvent};
use portable_atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Client driver loop. Sole owner of the connection and the correlation
/// state; callers talk to it only through the bounded command channel.
pub async fn run_client<C: Connector>(
    mut conn: ConnectionManager<C>,
    mut correlator: Correlator,
    mut rx: mpsc::Receiver<ClientCommand>,
    counters: Arc<ClientCounters>,
) {
    tracing::info!(mode = ?correlator.mode(), "pricing client started");

    loop {
        flush(&mut conn, &mut correlator, &counters).await;

        let wake = correlator
            .next_deadline()
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
        let has_deadline = correlator.in_flight() > 0;

        tokio::select! {
            cmd = rx.recv() => {
                match cmd {
                    Some(ClientCommand::Price { request, reply }) => {
                        correlator.enqueue(request, reply);
                    }
                    None => break,
                }
            }
            event = conn.next_event(), if conn.is_open() => {
                match &event {
                    LinkEvent::Frame(text) => match correlator.on_frame(text) {
                        FrameOutcome::Resolved => {
                            counters.responses_received.fetch_add(1, Ordering::Relaxed);
                        }
                        FrameOutcome::Rejected(e) => {
                            counters.protocol_errors.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(error = %e, "pricing response rejected");
                        }
                        FrameOutcome::Unmatched => {
                            counters.protocol_errors.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    terminal => {
                        if let Some(err) = conn.on_terminal(terminal) {
                            let failed = correlator.fail_in_flight(&err);
                            if failed > 0 {
                                counters.connection_errors.fetch_add(failed as u64, Ordering::Relaxed);
                                tracing::warn!(failed, error = %err, "in-flight requests lost with connection");
                            }
                        }
                    }
                }
            }
            _ = tokio::time::sleep_until(wake), if has_deadline => {
                let expired = correlator.expire(Instant::now());
                if expired > 0 {
                    counters.connection_errors.fetch_add(expired as u64, Ordering::Relaxed);
                    tracing::warn!(expired, "pricing requests timed out");
                    // A late positional answer would bind to the next request
                    if correlator.mode() == CorrelationMode::Positional {
                        conn.reset("positional request timed out");
                    }
                }
            }
        }
    }

    let dropped = correlator.fail_all(&ClientError::ChannelClosed("pricing client shut down".into()));
    tracing::info!(dropped, "pricing client stopped");
}

/// Writes every request the correlator allows right now, connecting lazily.
async fn flush<C: Connector>(
    conn: &mut ConnectionManager<C>,
    correlator: &mut Correlator,
    counters: &ClientCounters,
) {
    while let Some((ticket, frame)) = correlator.next_ready() {
        let link = match conn.ensure_connection().await {
            Ok(link) => link,
            Err(e) => {
                counters.connection_errors.fetch_add(1, Ordering::Relaxed);
                ticket.reject(e);
                continue;
            }
        };

        match link.send(frame).await {
            Ok(()) => {
                counters.requests_sent.fetch_add(1, Ordering::Relaxed);
                correlator.mark_sent(ticket, Instant::now());
            }
            Err(e) => {
                counters.connection_errors.fetch_add(1, Ordering::Relaxed);
                conn.invalidate(&e);
                correlator.fail_in_flight(&e);
                ticket.reject(e);
            }
        }
    }
}
