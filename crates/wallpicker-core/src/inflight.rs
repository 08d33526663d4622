//! Single-flight registry
//!
//! Maps a cache key to the one pending transfer for it. The registry only holds
//! a weak handle: waiters own the shared future, so when the last waiter gives
//! up the transfer future is dropped and cancelled. Each transfer carries a
//! [`Registration`] that removes its own slot when the transfer finishes or is
//! dropped, whichever comes first.

use crate::error::FetchError;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub(crate) type TransferFuture = BoxFuture<'static, Result<Bytes, FetchError>>;
pub(crate) type SharedTransfer = Shared<TransferFuture>;

struct Slot {
    id: u64,
    transfer: WeakShared<TransferFuture>,
}

#[derive(Default)]
pub struct InFlightRegistry {
    slots: Mutex<HashMap<String, Slot>>,
    next_id: AtomicU64,
}

/// Removes the owning transfer's slot on drop
pub(crate) struct Registration {
    registry: Weak<InFlightRegistry>,
    key: String,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut slots = registry.slots.lock();
            // a newer transfer may already own the key
            if slots.get(&self.key).is_some_and(|slot| slot.id == self.id) {
                slots.remove(&self.key);
            }
        }
    }
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the live transfer for `key`, or start one with `start`
    ///
    /// Returns the shared transfer and whether it was joined. `start` runs
    /// under the registry lock, so it must only build the future, not poll it.
    pub(crate) fn join_or_start<F>(self: &Arc<Self>, key: &str, start: F) -> (SharedTransfer, bool)
    where
        F: FnOnce(Registration) -> TransferFuture,
    {
        let mut slots = self.slots.lock();

        if let Some(live) = slots.get(key).and_then(|slot| slot.transfer.upgrade()) {
            return (live, true);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registration = Registration {
            registry: Arc::downgrade(self),
            key: key.to_string(),
            id,
        };
        let transfer = start(registration).shared();

        // never polled yet, so a weak handle is always available
        if let Some(weak) = transfer.downgrade() {
            slots.insert(key.to_string(), Slot { id, transfer: weak });
        }

        (transfer, false)
    }

    pub fn contains(&self, key: &str) -> bool {
        // the upgraded handle must outlive the lock: if it turns out to be the
        // last one, dropping it runs Registration::drop
        let live = self
            .slots
            .lock()
            .get(key)
            .and_then(|slot| slot.transfer.upgrade());
        live.is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every pending transfer
    ///
    /// Waiters keep their handles; new callers start fresh transfers.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}
