//! Windowed health tracking for a single resolver.
//!
//! Every exchange and every error is timestamped. Once per window the
//! timestamps recorded so far are drained and counted, and the resolver's
//! availability is recomputed from that window alone. Low-traffic windows
//! never mark a resolver unavailable, so a handful of unlucky timeouts on an
//! idle resolver cannot take it out of rotation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, trace, warn};

use crate::config::ResolverConfig;
use crate::queue::Queue;

use super::Shared;

#[derive(Debug)]
pub(crate) struct HealthMonitor {
    available: AtomicBool,
    exchanges: Queue<Instant>,
    errors: Queue<Instant>,
    sample_threshold: usize,
    failure_ratio: f64,
}

impl HealthMonitor {
    pub(crate) fn new(config: &ResolverConfig) -> Self {
        Self {
            available: AtomicBool::new(true),
            exchanges: Queue::new(),
            errors: Queue::new(),
            sample_threshold: config.sample_threshold(),
            failure_ratio: config.failure_ratio(),
        }
    }

    pub(crate) fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub(crate) fn record_exchange(&self) {
        self.exchanges.append(Instant::now());
    }

    pub(crate) fn record_error(&self) {
        self.errors.append(Instant::now());
    }

    /// Count the samples recorded up to `now` and update availability.
    pub(crate) fn recompute(&self, now: Instant) -> bool {
        let total = self.exchanges.drain_while(|t| *t <= now).len();
        let failures = self.errors.drain_while(|t| *t <= now).len();
        let available = availability(total, failures, self.sample_threshold, self.failure_ratio);

        let previous = self.available.swap(available, Ordering::AcqRel);
        trace!(total, failures, available, "health window");
        if previous != available {
            if available {
                info!(total, failures, "resolver available again");
            } else {
                warn!(total, failures, "resolver marked unavailable");
            }
        }
        available
    }
}

/// A resolver is unavailable only when the window saw more than
/// `sample_threshold` exchanges and more than `failure_ratio` of them failed.
pub(crate) fn availability(
    total: usize,
    failures: usize,
    sample_threshold: usize,
    failure_ratio: f64,
) -> bool {
    if total <= sample_threshold || failures == 0 {
        return true;
    }
    (failures as f64 / total as f64) <= failure_ratio
}

pub(crate) async fn monitor(shared: Arc<Shared>) {
    let window = shared.config.window();
    let mut ticker = tokio::time::interval_at(Instant::now() + window, window);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => return,
            _ = ticker.tick() => {
                shared.health.recompute(Instant::now());
            }
        }
    }
}
