//! Fixed-membership round-robin ring and its producer task.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::endpoint::Endpoint;
use crate::error::{CoreError, Result};
use crate::load_balancer::selector::Handoff;

/// An ordered, non-empty endpoint cycle with a cursor.
///
/// The cursor always indexes a valid endpoint and advances by one, wrapping, after each
/// endpoint handed out. An empty ring cannot be constructed: "no endpoints" is modelled by
/// having no ring at all.
#[derive(Debug, Clone)]
pub struct Ring {
    endpoints: Vec<Endpoint>,
    next: usize,
}

impl Ring {
    /// Create a ring starting at the first endpoint.
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(CoreError::EmptyRing);
        }
        Ok(Self { endpoints, next: 0 })
    }

    /// The endpoint the cursor points at.
    pub fn peek(&self) -> &Endpoint {
        &self.endpoints[self.next]
    }

    /// Move the cursor to the following endpoint.
    pub fn advance(&mut self) {
        self.next = (self.next + 1) % self.endpoints.len();
    }

    /// Start handing endpoints out through `handoff` until `stop` is cancelled.
    ///
    /// Stop is checked before every handoff and wins when a request is ready at the same
    /// time. The cursor only advances once a selector actually received the endpoint.
    pub(crate) fn spawn(mut self, handoff: Handoff, stop: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut requests = tokio::select! {
                biased;
                _ = stop.cancelled() => return,
                requests = handoff.acquire() => requests,
            };

            loop {
                let reply = tokio::select! {
                    biased;
                    _ = stop.cancelled() => return,
                    request = requests.recv() => match request {
                        Some(reply) => reply,
                        None => return,
                    },
                };

                if reply.send(self.peek().clone()).is_ok() {
                    self.advance();
                }
            }
        })
    }
}

impl Iterator for Ring {
    type Item = Endpoint;

    fn next(&mut self) -> Option<Endpoint> {
        let endpoint = self.peek().clone();
        self.advance();
        Some(endpoint)
    }
}
