use crate::config::CorrelationMode;
use crate::errors::{ClientError, ClientResult};
use crate::pricing::protocol;
use crate::pricing::types::{PricingRequest, PricingResult};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

pub type Reply = oneshot::Sender<ClientResult<PricingResult>>;

/// A request accepted from a caller but not yet written to the socket.
struct Queued {
    request: PricingRequest,
    reply: Reply,
}

/// The continuation for a request that is on the wire.
struct Pending {
    id: Uuid,
    request: PricingRequest,
    reply: Reply,
    deadline: Instant,
}

/// A request popped for sending. Either `mark_sent` or `reject` it.
pub struct Ticket {
    pub id: Uuid,
    request: PricingRequest,
    reply: Reply,
}

impl Ticket {
    pub fn reject(self, error: ClientError) {
        let _ = self.reply.send(Err(error));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Resolved,
    Rejected(ClientError),
    /// No in-flight request claims this frame; it was dropped.
    Unmatched,
}

/// Matches inbound frames to outstanding requests.
///
/// Positional mode allows exactly one request on the wire: the protocol has
/// no request id, so the next frame can only be the answer to the last send.
/// Further requests wait in the FIFO queue until it resolves. Tagged mode
/// stamps each request with a UUID and matches on the echoed id, allowing up
/// to `max_in_flight` concurrent requests answered in any order.
///
/// Every accepted request is resolved or rejected exactly once.
pub struct Correlator {
    mode: CorrelationMode,
    max_in_flight: usize,
    timeout: Duration,
    queue: VecDeque<Queued>,
    in_flight: VecDeque<Pending>,
}

impl Correlator {
    pub fn new(mode: CorrelationMode, max_in_flight: usize, timeout: Duration) -> Self {
        let max_in_flight = match mode {
            CorrelationMode::Positional => 1,
            CorrelationMode::Tagged => max_in_flight.max(1),
        };
        Self {
            mode,
            max_in_flight,
            timeout,
            queue: VecDeque::new(),
            in_flight: VecDeque::new(),
        }
    }

    #[inline]
    pub fn mode(&self) -> CorrelationMode {
        self.mode
    }

    #[inline]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn enqueue(&mut self, request: PricingRequest, reply: Reply) {
        self.queue.push_back(Queued { request, reply });
    }

    /// Pops the next request that may be written now, with its encoded frame.
    /// Requests whose caller already gave up are dropped here.
    pub fn next_ready(&mut self) -> Option<(Ticket, String)> {
        while self.in_flight.len() < self.max_in_flight {
            let queued = self.queue.pop_front()?;
            if queued.reply.is_closed() {
                tracing::debug!(side = %queued.request.side, "skipping request abandoned by caller");
                continue;
            }

            let id = Uuid::new_v4();
            let wire_id = (self.mode == CorrelationMode::Tagged).then_some(id);
            match protocol::encode_request(&queued.request, wire_id) {
                Ok(frame) => {
                    let ticket = Ticket {
                        id,
                        request: queued.request,
                        reply: queued.reply,
                    };
                    return Some((ticket, frame));
                }
                Err(e) => {
                    let _ = queued.reply.send(Err(e));
                }
            }
        }
        None
    }

    pub fn mark_sent(&mut self, ticket: Ticket, now: Instant) {
        self.in_flight.push_back(Pending {
            id: ticket.id,
            request: ticket.request,
            reply: ticket.reply,
            deadline: now + self.timeout,
        });
    }

    /// Binds one inbound frame to the request it answers.
    pub fn on_frame(&mut self, text: &str) -> FrameOutcome {
        let decoded = protocol::decode_response(text);

        let slot = match (self.mode, decoded.id) {
            (CorrelationMode::Tagged, Some(id)) => self.in_flight.iter().position(|p| p.id == id),
            // Untagged frame: the oldest outstanding request is the only candidate
            _ => (!self.in_flight.is_empty()).then_some(0),
        };

        let Some(pending) = slot.and_then(|i| self.in_flight.remove(i)) else {
            tracing::warn!(id = ?decoded.id, "dropping frame with no matching request");
            return FrameOutcome::Unmatched;
        };

        let result = decoded.body.map(|data| data.into_result(pending.request));
        let outcome = match &result {
            Ok(_) => FrameOutcome::Resolved,
            Err(e) => FrameOutcome::Rejected(e.clone()),
        };
        let _ = pending.reply.send(result);
        outcome
    }

    /// Rejects every request on the wire. Queued requests are kept and will
    /// go out on the next connection.
    pub fn fail_in_flight(&mut self, error: &ClientError) -> usize {
        let n = self.in_flight.len();
        for pending in self.in_flight.drain(..) {
            let _ = pending.reply.send(Err(error.clone()));
        }
        n
    }

    /// Rejects everything, queued or in flight.
    pub fn fail_all(&mut self, error: &ClientError) -> usize {
        let mut n = self.fail_in_flight(error);
        for queued in self.queue.drain(..) {
            let _ = queued.reply.send(Err(error.clone()));
            n += 1;
        }
        n
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.in_flight.iter().map(|p| p.deadline).min()
    }

    /// Rejects requests whose deadline has passed. Returns how many expired.
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut expired = 0;
        let mut i = 0;
        while i < self.in_flight.len() {
            if self.in_flight[i].deadline <= now {
                if let Some(pending) = self.in_flight.remove(i) {
                    let _ = pending.reply.send(Err(ClientError::Connection(format!(
                        "no response within {}ms",
                        self.timeout.as_millis()
                    ))));
                    expired += 1;
                }
            } else {
                i += 1;
            }
        }
        expired
    }
}
