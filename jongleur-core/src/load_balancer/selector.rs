//! Handoff channel between the ring producer and connection handlers.
//!
//! Every selection is a request carrying a one-shot reply slot. The single live producer
//! answers requests in arrival order, so concurrent selectors observe one strict round-robin
//! sequence. A request whose selector already gave up is dropped without consuming an endpoint.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex, OwnedMutexGuard};
use tokio::time::{timeout_at, Instant};

use crate::domain::endpoint::Endpoint;

/// Maximum number of selection requests waiting for a producer.
///
/// While no producer runs, every timed-out selection leaves its closed request queued. Once
/// the queue is full, selections spend their whole wait in `send`, so the unavailable path
/// still ends after one wait.
const REQUEST_QUEUE_CAPACITY: usize = 1024;

/// A pending selection: the producer answers it with the next endpoint.
pub(crate) type Request = oneshot::Sender<Endpoint>;

/// The consumer side of the handoff, cloned into every connection handler.
#[derive(Debug, Clone)]
pub struct Selector {
    requests: mpsc::Sender<Request>,
}

/// The producer side of the handoff.
///
/// Shared by successive producers; only the one holding the lock serves requests.
#[derive(Debug, Clone)]
pub(crate) struct Handoff {
    requests: Arc<Mutex<mpsc::Receiver<Request>>>,
}

/// Create a connected selector / handoff pair.
pub(crate) fn channel() -> (Selector, Handoff) {
    let (tx, rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
    (
        Selector { requests: tx },
        Handoff {
            requests: Arc::new(Mutex::new(rx)),
        },
    )
}

impl Selector {
    /// Wait up to `wait` for the next endpoint in the rotation.
    ///
    /// Returns `None` when no producer answered in time, which is what happens for as long
    /// as the ring has no endpoints.
    pub async fn next(&self, wait: Duration) -> Option<Endpoint> {
        let deadline = Instant::now() + wait;
        let (reply, mut response) = oneshot::channel();

        // An unsent request is dropped with its reply slot, which the producer skips.
        timeout_at(deadline, self.requests.send(reply)).await.ok()?.ok()?;

        match timeout_at(deadline, &mut response).await {
            Ok(endpoint) => endpoint.ok(),
            Err(_) => {
                // Closing settles the race with the producer: either it sees the slot
                // closed and keeps its cursor, or the endpoint is already here.
                response.close();
                response.try_recv().ok()
            }
        }
    }
}

impl Handoff {
    /// Take exclusive ownership of the request queue.
    pub(crate) async fn acquire(&self) -> OwnedMutexGuard<mpsc::Receiver<Request>> {
        Arc::clone(&self.requests).lock_owned().await
    }
}
