//! Long-running background task that re-polls the ledger and publishes a
//! fresh snapshot on every tick.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::aggregator;
use crate::ledger::LedgerGateway;
use crate::snapshot::SnapshotStore;

pub struct RefresherState<G> {
    pub gateway: Arc<G>,
    pub store: Arc<SnapshotStore>,
    pub interval: Duration,
    pub read_timeout: Duration,
    pub shutdown: CancellationToken,
}

/// Run the refresh loop until cancelled.
///
/// Background refreshes are caller-less; caller-scoped snapshots are built
/// on demand by the API layer.  Each tick builds a complete new snapshot
/// and swaps it into the store whole.
pub async fn run<G>(state: RefresherState<G>)
where
    G: LedgerGateway + 'static,
{
    info!("refresher starting (interval {:?})", state.interval);

    loop {
        let snapshot = aggregator::refresh(&state.gateway, None, state.read_timeout).await;
        if snapshot.partial {
            debug!("published partial snapshot");
        } else {
            debug!(
                requests = snapshot.requests.known().map_or(0, Vec::len),
                "published snapshot"
            );
        }
        state.store.publish(snapshot).await;

        tokio::select! {
            _ = state.shutdown.cancelled() => {
                info!("refresher stopping");
                return;
            }
            _ = tokio::time::sleep(state.interval) => {}
        }
    }
}
