use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::error::ResolveError;

use super::Shared;

/// Periodically fails queries whose response never arrived.
pub(crate) async fn sweep(shared: Arc<Shared>) {
    let interval = shared.config.sweep_interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => return,
            _ = ticker.tick() => {
                expire(&shared, Instant::now());
            }
        }
    }
}

pub(crate) fn expire(shared: &Shared, now: Instant) -> usize {
    let expired = shared
        .inflight
        .expire(now, shared.config.transaction_timeout());
    let count = expired.len();

    for request in expired {
        shared.health.record_error();
        debug!(name = request.name(), record_type = %request.kind(), "query timed out");
        let error = ResolveError::Timeout {
            name: request.name().to_owned(),
            record_type: request.kind().record_type(),
        };
        request.fail(error);
    }
    count
}
