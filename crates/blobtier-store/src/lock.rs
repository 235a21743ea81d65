use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use blobtier_types::ContentHash;
use tokio::sync::OwnedMutexGuard;

#[derive(Debug)]
struct Slot {
    mutex: Arc<tokio::sync::Mutex<()>>,
    /// Holders plus waiters currently registered for this hash.
    users: usize,
}

/// Per-hash async mutual exclusion.
///
/// Holders of different hashes never block each other. Slots are created on
/// first use and dropped when the last holder or waiter goes away, so the
/// map only grows with the number of hashes currently in flight. A waiter
/// whose future is dropped before it acquires the lock still unregisters.
#[derive(Debug, Default)]
pub struct KeyedLock {
    slots: Mutex<HashMap<ContentHash, Slot>>,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `hash`.
    pub async fn lock(&self, hash: &ContentHash) -> KeyedGuard<'_> {
        let (mutex, registration) = {
            let mut slots = self.slots();
            let slot = slots.entry(hash.clone()).or_insert_with(|| Slot {
                mutex: Arc::default(),
                users: 0,
            });
            slot.users += 1;
            let registration = Registration {
                owner: self,
                hash: hash.clone(),
            };
            (Arc::clone(&slot.mutex), registration)
        };
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            _guard: guard,
            registration,
        }
    }

    /// Number of hashes that currently have a holder or waiter.
    pub fn active(&self) -> usize {
        self.slots().len()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ContentHash, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One holder's or waiter's claim on a slot. Dropping it, whether after
/// release or while still waiting, removes the slot once unused.
struct Registration<'a> {
    owner: &'a KeyedLock,
    hash: ContentHash,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut slots = self.owner.slots();
        if let Some(slot) = slots.get_mut(&self.hash) {
            slot.users -= 1;
            if slot.users == 0 {
                slots.remove(&self.hash);
            }
        }
    }
}

/// Exclusive access to one hash; released on drop.
pub struct KeyedGuard<'a> {
    // Declared first so the mutex is released before the slot is unregistered.
    _guard: OwnedMutexGuard<()>,
    registration: Registration<'a>,
}

impl KeyedGuard<'_> {
    pub fn hash(&self) -> &ContentHash {
        &self.registration.hash
    }
}

impl std::fmt::Debug for KeyedGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedGuard").field("hash", self.hash()).finish()
    }
}
