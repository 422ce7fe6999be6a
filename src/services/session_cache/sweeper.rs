use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::SessionCache;

/// Run `SessionCache::run_maintenance` every `interval` until `cancel` fires.
///
/// The first pass happens one full interval after start.
pub fn spawn_sweeper(
    cache: Arc<SessionCache>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs_f64(), "Session sweeper started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = cache.run_maintenance().await;
                    debug!(
                        expired = report.expired,
                        flushed = report.flushed,
                        evicted = report.evicted,
                        resident = cache.resident_count(),
                        "Session maintenance pass"
                    );
                }
            }
        }

        info!("Session sweeper stopped");
    })
}
