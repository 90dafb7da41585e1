//! Hot-swappable round-robin ring driven by membership updates.

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::endpoint::Endpoint;
use crate::domain::membership::{dedup_endpoints, Membership};
use crate::load_balancer::ring::Ring;
use crate::load_balancer::selector::{self, Handoff, Selector};

/// Owns at most one active [`Ring`] and replaces it when membership changes.
///
/// Membership comparison and swap happen under the exclusive lock, and the previous producer
/// is always stopped and joined before a new one starts, so two producers never interleave
/// their handoffs. A shared-lock comparison runs first to skip the exclusive lock when
/// nothing changed.
#[derive(Debug)]
pub struct MutableRing {
    selector: Selector,
    handoff: Handoff,
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    active: Option<ActiveRing>,
    membership: Membership,
}

#[derive(Debug)]
struct ActiveRing {
    endpoints: Vec<Endpoint>,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl ActiveRing {
    async fn shutdown(self) {
        self.stop.cancel();
        if let Err(err) = self.task.await {
            warn!(error = %err, "Ring producer terminated abnormally");
        }
    }
}

impl State {
    async fn stop_active(&mut self) {
        // Cleared first so an interrupted stop never leaves members without a producer.
        self.membership = Membership::default();
        if let Some(active) = self.active.take() {
            active.shutdown().await;
        }
    }
}

impl MutableRing {
    /// Create a ring with no endpoints.
    pub fn new() -> Self {
        let (selector, handoff) = selector::channel();
        Self {
            selector,
            handoff,
            state: RwLock::new(State::default()),
        }
    }

    /// A handle for pulling endpoints out of the rotation.
    pub fn selector(&self) -> Selector {
        self.selector.clone()
    }

    /// Replace the membership if `endpoints`, taken as a set, differs from the current one.
    ///
    /// A changed set restarts the rotation at its first element; an empty set leaves the
    /// ring without a producer. Returns whether anything changed.
    pub async fn sync(&self, endpoints: Vec<Endpoint>) -> bool {
        if !self.state.read().await.membership.differs(&endpoints) {
            return false;
        }

        let mut state = self.state.write().await;
        if !state.membership.differs(&endpoints) {
            return false;
        }

        let endpoints = dedup_endpoints(endpoints);
        info!(endpoints = %display_list(&endpoints), "Updating endpoints");

        state.stop_active().await;

        if let Ok(ring) = Ring::new(endpoints.clone()) {
            let stop = CancellationToken::new();
            let task = ring.spawn(self.handoff.clone(), stop.clone());
            state.membership = Membership::from_endpoints(&endpoints);
            state.active = Some(ActiveRing {
                endpoints,
                stop,
                task,
            });
        }

        info!("Endpoints are updated");
        true
    }

    /// Stop the active producer, if any. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.state.write().await.stop_active().await;
    }

    /// The current endpoints in rotation order.
    pub async fn members(&self) -> Vec<Endpoint> {
        self.state
            .read()
            .await
            .active
            .as_ref()
            .map(|active| active.endpoints.clone())
            .unwrap_or_default()
    }
}

impl Default for MutableRing {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MutableRing {
    fn drop(&mut self) {
        if let Some(active) = self.state.get_mut().active.as_ref() {
            active.stop.cancel();
        }
    }
}

fn display_list(endpoints: &[Endpoint]) -> String {
    endpoints
        .iter()
        .map(Endpoint::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
