//! Periodic membership synchronization.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use jongleur_core::{Endpoint, MutableRing};

use super::loader::MembershipLoader;

/// Spawns a background task that loads the membership every `period` and syncs the ring.
///
/// The first load happens immediately. The task exits once `shutdown` is cancelled, also
/// abandoning a load that is still in flight.
pub fn spawn_synchronizer(
    ring: Arc<MutableRing>,
    loader: Arc<dyn MembershipLoader>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = sync_once(&ring, loader.as_ref()) => {}
            }
        }

        debug!("Membership synchronizer stopped");
    })
}

/// Load the membership once and sync the ring with it. Returns whether the ring changed.
///
/// A failed load is logged and leaves the ring untouched until the next tick.
pub async fn sync_once(ring: &MutableRing, loader: &dyn MembershipLoader) -> bool {
    let entries = match loader.load().await {
        Ok(Some(entries)) => entries,
        Ok(None) => {
            debug!("Loader returned no data, keeping endpoints");
            return false;
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "Failed to load endpoints");
            return false;
        }
    };

    let endpoints = entries
        .into_iter()
        .filter_map(|entry| match Endpoint::new(&entry) {
            Ok(endpoint) => Some(endpoint),
            Err(err) => {
                warn!(entry = %entry, error = %err, "Ignoring invalid endpoint");
                None
            }
        })
        .collect();

    ring.sync(endpoints).await
}
