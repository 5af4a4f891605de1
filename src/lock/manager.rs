//! The lock manager (§4.2): registers lock owners, arbitrates the
//! irrevocability token, and relays wake-ups between the RW-lock primitive
//! and waiting owners. Mirrors the teacher's process-wide singleton
//! pattern (`SERIALS: LazyLock<Arc<RwLock<Vec<Weak<FileSerial>>>>>`) but for
//! owner registration and irrevocability instead of per-file locks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, LazyLock, Mutex};

use tracing::{event, Level};

use crate::error::Error;
use crate::lock::owner::{LockOwner, OwnerIndex};
use crate::lock::rwlock::OwnerRwLock;

struct Slots {
    /// `None` for free slots, `Some` for registered owners.
    owners: Vec<Option<LockOwner>>,
}

/// Rendezvous state for irrevocability (§4.2): either the token is free
/// and any number of revocable transactions run, or it is held and all
/// others are quiesced.
struct Irrevocability {
    holder: Option<OwnerIndex>,
    /// Count of revocable owners currently believed to be mid-transaction.
    /// `make_irrevocable` waits until this drops to zero before admitting
    /// the exclusive holder.
    active_revocable: usize,
}

pub struct LockManager {
    slots: Mutex<Slots>,
    irrevocable: Mutex<Irrevocability>,
    cv: Condvar,
    max_owners: usize,
    next_hint: AtomicUsize,
}

impl LockManager {
    pub fn new(max_owners: usize) -> Self {
        let mut owners = Vec::with_capacity(max_owners);
        owners.resize_with(max_owners, || None);
        LockManager {
            slots: Mutex::new(Slots { owners }),
            irrevocable: Mutex::new(Irrevocability {
                holder: None,
                active_revocable: 0,
            }),
            cv: Condvar::new(),
            max_owners,
            next_hint: AtomicUsize::new(0),
        }
    }

    /// Registers a new owner, returning its dense index. Errors with
    /// `Irrecoverable` if the manager is at capacity; callers should treat
    /// this as a deterministic, non-deadlocking rejection (§8 boundary
    /// behaviour).
    pub fn register(&self) -> Result<OwnerIndex, Error> {
        let mut slots = self.slots.lock().unwrap();
        let start = self.next_hint.load(Ordering::Relaxed) % self.max_owners.max(1);
        for offset in 0..self.max_owners {
            let i = (start + offset) % self.max_owners;
            if slots.owners[i].is_none() {
                let idx = OwnerIndex(i as u32);
                slots.owners[i] = Some(LockOwner::new(idx));
                self.next_hint.store(i + 1, Ordering::Relaxed);
                event!(Level::TRACE, owner = i, "registered lock owner");
                return Ok(idx);
            }
        }
        Err(Error::irrecoverable("lock manager has no free owner slots"))
    }

    pub fn unregister(&self, owner: OwnerIndex) {
        let mut slots = self.slots.lock().unwrap();
        slots.owners[owner.get() as usize] = None;
        event!(Level::TRACE, owner = owner.get(), "unregistered lock owner");
    }

    /// Marks `active_revocable` counters; called by the driver on
    /// entering/leaving the revocable portion of a transaction so
    /// `make_irrevocable` knows when it is safe to admit the exclusive
    /// holder.
    pub fn enter_revocable(&self) {
        let mut state = self.irrevocable.lock().unwrap();
        state.active_revocable += 1;
    }

    pub fn leave_revocable(&self) {
        let mut state = self.irrevocable.lock().unwrap();
        state.active_revocable = state.active_revocable.saturating_sub(1);
        if state.active_revocable == 0 {
            self.cv.notify_all();
        }
    }

    /// Acquires the exclusive irrevocability token for `owner`, blocking
    /// until every other revocable transaction has quiesced. This is one
    /// of the few places the engine genuinely blocks (§5).
    pub fn make_irrevocable(&self, owner: OwnerIndex) -> Result<(), Error> {
        let mut state = self.irrevocable.lock().unwrap();
        while state.holder.is_some() {
            state = self.cv.wait(state).unwrap();
        }
        while state.active_revocable > 0 {
            state = self.cv.wait(state).unwrap();
        }
        state.holder = Some(owner);
        event!(Level::TRACE, owner = owner.get(), "acquired irrevocability token");
        Ok(())
    }

    pub fn release_irrevocability(&self, owner: OwnerIndex) {
        let mut state = self.irrevocable.lock().unwrap();
        if state.holder == Some(owner) {
            state.holder = None;
            self.cv.notify_all();
            event!(Level::TRACE, owner = owner.get(), "released irrevocability token");
        }
    }

    pub fn is_irrevocable_held(&self) -> bool {
        self.irrevocable.lock().unwrap().holder.is_some()
    }

    /// Registers `owner` as waiting on `lock`. Returns immediately;
    /// the engine never blocks here (try-only discipline, §5) — this is
    /// bookkeeping so a future `unlock` wakes the right owner first.
    pub fn wait(&self, owner: OwnerIndex, is_writer: bool, lock: &OwnerRwLock) {
        lock.register_waiter(owner, is_writer);
    }

    /// Relays `lock`'s wake-up set. `concurrent_readers_ok` is accepted for
    /// interface symmetry with the spec's `wake_up` signature; the
    /// underlying [`OwnerRwLock`] already decides reader/writer batching.
    pub fn wake_up(&self, _concurrent_readers_ok: bool, lock: &OwnerRwLock, owner: OwnerIndex) -> Vec<OwnerIndex> {
        lock.unlock(owner)
    }
}

static GLOBAL_LOCK_MANAGER: LazyLock<LockManager> =
    LazyLock::new(|| LockManager::new(crate::config::active().max_owners));

pub fn global() -> &'static LockManager {
    &GLOBAL_LOCK_MANAGER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unregister_recycles_index() {
        let mgr = LockManager::new(2);
        let a = mgr.register().unwrap();
        let b = mgr.register().unwrap();
        assert!(mgr.register().is_err());
        mgr.unregister(a);
        let c = mgr.register().unwrap();
        assert_eq!(c, a);
        let _ = b;
    }

    #[test]
    fn irrevocability_is_exclusive() {
        let mgr = LockManager::new(4);
        let a = mgr.register().unwrap();
        mgr.make_irrevocable(a).unwrap();
        assert!(mgr.is_irrevocable_held());
        mgr.release_irrevocability(a);
        assert!(!mgr.is_irrevocable_held());
    }
}
