//! Registry of in-flight GET requests.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared, WeakShared};
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use crate::{Fingerprint, Result};

/// A GET execution that every caller with the same fingerprint awaits.
pub(crate) type SharedResponse = Shared<BoxFuture<'static, Result<JsonValue>>>;

struct Flight {
    id: u64,
    handle: WeakShared<BoxFuture<'static, Result<JsonValue>>>,
}

/// Only callers keep a flight alive. The registry holds a weak handle, so a
/// flight abandoned by every caller is dropped and deregistered.
#[derive(Default)]
pub(crate) struct PendingRequests {
    inflight: Mutex<HashMap<Fingerprint, Flight>>,
    next_id: Mutex<u64>,
}

impl PendingRequests {
    /// Returns the in-flight execution for `key`, or registers the one built
    /// by `start`. The flag is true when an existing execution was joined.
    ///
    /// `start` must move the [`FlightGuard`] into the future it returns.
    /// Dropping the guard inside `start` deadlocks.
    pub(crate) fn join_or_start<F>(
        self: &Arc<Self>,
        key: Fingerprint,
        start: F,
    ) -> (SharedResponse, bool)
    where
        F: FnOnce(FlightGuard) -> BoxFuture<'static, Result<JsonValue>>,
    {
        let mut inflight = self.inflight.lock();
        if let Some(existing) = inflight.get(&key).and_then(|flight| flight.handle.upgrade()) {
            return (existing, true);
        }

        let id = {
            let mut next_id = self.next_id.lock();
            *next_id += 1;
            *next_id
        };
        let guard = FlightGuard {
            pending: Arc::clone(self),
            key: key.clone(),
            id,
        };
        let flight = start(guard).shared();
        match flight.downgrade() {
            Some(handle) => {
                inflight.insert(key, Flight { id, handle });
            }
            None => {
                inflight.remove(&key);
            }
        }
        (flight, false)
    }

    /// Removes `key` if it still belongs to flight `id`.
    fn release(&self, key: &Fingerprint, id: u64) {
        let mut inflight = self.inflight.lock();
        if inflight.get(key).is_some_and(|flight| flight.id == id) {
            inflight.remove(key);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inflight.lock().len()
    }
}

/// Deregisters its flight when dropped, which happens when the flight
/// settles, panics, or loses its last caller.
pub(crate) struct FlightGuard {
    pending: Arc<PendingRequests>,
    key: Fingerprint,
    id: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.pending.release(&self.key, self.id);
    }
}
