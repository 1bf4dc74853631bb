use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::ResolveError;

use super::{Request, Shared};

const DELAYS_MS: [u64; 8] = [10, 25, 50, 75, 100, 150, 250, 500];

/// Increasing sleep schedule for an idle or unavailable resolver.
#[derive(Debug, Default, Clone)]
pub(crate) struct Backoff {
    step: usize,
}

impl Backoff {
    /// The delay to sleep now; the following call returns the next step,
    /// saturating at the longest delay.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = Duration::from_millis(DELAYS_MS[self.step]);
        if self.step < DELAYS_MS.len() - 1 {
            self.step += 1;
        }
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.step = 0;
    }

    #[cfg(test)]
    pub(crate) fn current(&self) -> Duration {
        Duration::from_millis(DELAYS_MS[self.step])
    }
}

/// Moves queued requests onto the dispatch channel while the resolver is
/// available.
pub(crate) async fn pace(shared: Arc<Shared>, dispatch: mpsc::Sender<Request>) {
    let mut backoff = Backoff::default();

    loop {
        if shared.shutdown.is_cancelled() {
            return;
        }

        let request = if shared.health.is_available() {
            shared.queue.next()
        } else {
            None
        };

        let Some(request) = request else {
            let delay = backoff.next_delay();
            tokio::select! {
                _ = shared.shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            continue;
        };

        backoff.reset();
        let permit = tokio::select! {
            _ = shared.shutdown.cancelled() => {
                request.fail(ResolveError::Stopped(shared.address));
                return;
            }
            permit = dispatch.reserve() => permit,
        };

        match permit {
            Ok(permit) => {
                trace!(name = request.name(), "dispatching");
                permit.send(request);
            }
            Err(_) => {
                request.fail(ResolveError::Stopped(shared.address));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_saturates() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> = (0..10)
            .map(|_| backoff.next_delay().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![10, 25, 50, 75, 100, 150, 250, 500, 500, 500]);
        assert_eq!(backoff.current(), Duration::from_millis(500));
    }

    #[test]
    fn backoff_resets_to_shortest() {
        let mut backoff = Backoff::default();
        for _ in 0..20 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_millis(10));
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
        assert_eq!(backoff.next_delay(), Duration::from_millis(25));
    }
}
