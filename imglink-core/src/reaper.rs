//! Periodic eviction of stalled frames.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::transport::{Shared, report_evictions};

/// Spawn the sweep loop for one adapter.
///
/// Every `period` the loop evicts frames idle for longer than
/// `stale_after` and reports each one as a
/// [`LinkEvent::FrameEvicted`](crate::transport::LinkEvent::FrameEvicted).
/// It exits when the adapter is cancelled or the event receiver is gone.
pub(crate) fn spawn(shared: Shared, period: Duration, stale_after: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shared.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = shared.manager.lock().sweep(Instant::now(), stale_after);
                    if !report_evictions(&shared, evicted).await {
                        break;
                    }
                }
            }
        }
        debug!("{} reaper stopped", shared.kind);
    })
}
