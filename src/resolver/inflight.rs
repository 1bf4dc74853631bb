use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use hickory_proto::op::Message;
use rand::Rng as _;
use tokio::time::Instant;

use super::Request;

/// Random picks before falling back to a linear scan for a free ID.
const RANDOM_ID_ATTEMPTS: usize = 16;

/// Queries sent on a resolver's socket that are still waiting for a response,
/// keyed by transaction ID.
///
/// IDs are only allocated and inserted by the exchange loop; the timeout
/// sweeper only removes. An ID returned by [`InFlight::allocate_id`] therefore
/// stays free until the exchange loop inserts it.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    table: Mutex<HashMap<u16, Request>>,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Pick a transaction ID not used by any outstanding query.
    pub(crate) fn allocate_id(&self) -> Option<u16> {
        let table = self.table.lock().expect("poisoned");
        let mut rng = rand::rng();
        for _ in 0..RANDOM_ID_ATTEMPTS {
            let id: u16 = rng.random();
            if !table.contains_key(&id) {
                return Some(id);
            }
        }

        if table.len() > usize::from(u16::MAX) {
            return None;
        }
        (0..=u16::MAX).find(|id| !table.contains_key(id))
    }

    pub(crate) fn insert(&self, id: u16, request: Request) {
        let previous = self.table.lock().expect("poisoned").insert(id, request);
        debug_assert!(previous.is_none(), "transaction id {id} reused while in flight");
    }

    #[cfg(test)]
    pub(crate) fn take(&self, id: u16) -> Option<Request> {
        self.table.lock().expect("poisoned").remove(&id)
    }

    /// Remove the query waiting under `id`, but only if `response` answers
    /// it. A response for another question leaves the entry in place.
    pub(crate) fn take_matching(&self, id: u16, response: &Message) -> Option<Request> {
        let mut table = self.table.lock().expect("poisoned");
        if !table.get(&id)?.is_answered_by(response) {
            return None;
        }
        table.remove(&id)
    }

    /// Remove every query sent more than `timeout` before `now`.
    pub(crate) fn expire(&self, now: Instant, timeout: Duration) -> Vec<Request> {
        let mut table = self.table.lock().expect("poisoned");
        let expired: Vec<u16> = table
            .iter()
            .filter(|(_, request)| request.is_expired(now, timeout))
            .map(|(id, _)| *id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| table.remove(&id))
            .collect()
    }

    pub(crate) fn drain(&self) -> Vec<Request> {
        self.table
            .lock()
            .expect("poisoned")
            .drain()
            .map(|(_, request)| request)
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.table.lock().expect("poisoned").len()
    }
}
