//! The field-level RW-lock primitive (§4.1): `{Unlocked | Rd(n) | Wr}`,
//! with a fairness-ordered waiter list keyed by owner index. All
//! acquisition is try-only — a lock that cannot be granted immediately
//! returns [`Error::Conflicting`] rather than blocking; the only blocking
//! here is the short internal `Mutex` guarding the state word.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{Error, LockId};
use crate::lock::owner::OwnerIndex;

#[derive(Default)]
struct RwLockState {
    readers: Vec<OwnerIndex>,
    writer: Option<OwnerIndex>,
    /// Owners that failed to acquire and are waiting for a future unlock.
    /// Kept sorted ascending by owner index so the lowest-indexed waiter
    /// is always served first (no starvation).
    waiters: VecDeque<(OwnerIndex, bool)>,
}

/// A single field-level reader/writer lock, identified by `field_id` for
/// error reporting (`LockId`) and diagnostics.
pub struct OwnerRwLock {
    field_id: u32,
    state: Mutex<RwLockState>,
}

impl OwnerRwLock {
    pub fn new(field_id: u32) -> Self {
        OwnerRwLock {
            field_id,
            state: Mutex::new(RwLockState::default()),
        }
    }

    fn lock_id(&self, owner: OwnerIndex) -> LockId {
        LockId::new(owner, self.field_id)
    }

    /// Attempts to take a read lock for `owner`. Returns `Ok(())` both when
    /// the lock is freshly acquired and when `owner` already held it
    /// (silent, per spec).
    pub fn try_rdlock(&self, owner: OwnerIndex) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if state.writer == Some(owner) {
            return Ok(());
        }
        if state.readers.contains(&owner) {
            return Ok(());
        }
        match state.writer {
            None => {
                state.readers.push(owner);
                Ok(())
            }
            Some(_) => Err(Error::Conflicting(Some(self.lock_id(owner)))),
        }
    }

    /// Attempts to take a write lock for `owner`, upgrading a held read
    /// lock if `owner` is the sole reader.
    pub fn try_wrlock(&self, owner: OwnerIndex) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if state.writer == Some(owner) {
            return Ok(());
        }
        if state.writer.is_none() {
            if state.readers.is_empty() {
                state.writer = Some(owner);
                return Ok(());
            }
            if state.readers.len() == 1 && state.readers[0] == owner {
                state.readers.clear();
                state.writer = Some(owner);
                return Ok(());
            }
        }
        Err(Error::Conflicting(Some(self.lock_id(owner))))
    }

    /// Releases whatever hold `owner` has on this lock (no-op if none).
    /// Returns the set of waiters that should now be retried, in wake-up
    /// order: either a single writer, or every consecutive reader queued
    /// at the head.
    pub fn unlock(&self, owner: OwnerIndex) -> Vec<OwnerIndex> {
        let mut state = self.state.lock().unwrap();
        let became_free = if state.writer == Some(owner) {
            state.writer = None;
            true
        } else if let Some(pos) = state.readers.iter().position(|o| *o == owner) {
            state.readers.remove(pos);
            state.readers.is_empty()
        } else {
            false
        };

        if !became_free || state.waiters.is_empty() {
            return Vec::new();
        }
        self.drain_wakeable(&mut state)
    }

    fn drain_wakeable(&self, state: &mut RwLockState) -> Vec<OwnerIndex> {
        let mut woken = Vec::new();
        match state.waiters.front().copied() {
            Some((_, true)) => {
                // Head wants a writer: wake that one owner only.
                if let Some((idx, _)) = state.waiters.pop_front() {
                    woken.push(idx);
                }
            }
            Some((_, false)) => {
                // Wake every consecutive reader from the head.
                while let Some((_, false)) = state.waiters.front() {
                    let (idx, _) = state.waiters.pop_front().unwrap();
                    woken.push(idx);
                }
            }
            None => {}
        }
        woken
    }

    /// Registers `owner` at the tail of the waiter list, ordered by owner
    /// index among equally-queued entries so the lowest index always
    /// drains first.
    pub fn register_waiter(&self, owner: OwnerIndex, is_writer: bool) {
        let mut state = self.state.lock().unwrap();
        if state.waiters.iter().any(|(o, _)| *o == owner) {
            return;
        }
        let pos = state
            .waiters
            .iter()
            .position(|(o, _)| o.get() > owner.get())
            .unwrap_or(state.waiters.len());
        state.waiters.insert(pos, (owner, is_writer));
    }

    pub fn is_writer(&self, owner: OwnerIndex) -> bool {
        self.state.lock().unwrap().writer == Some(owner)
    }

    pub fn is_reader(&self, owner: OwnerIndex) -> bool {
        self.state.lock().unwrap().readers.contains(&owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(i: u32) -> OwnerIndex {
        OwnerIndex(i)
    }

    #[test]
    fn two_readers_then_blocked_writer() {
        let lock = OwnerRwLock::new(0);
        assert!(lock.try_rdlock(owner(0)).is_ok());
        assert!(lock.try_rdlock(owner(1)).is_ok());
        assert!(matches!(
            lock.try_wrlock(owner(2)),
            Err(Error::Conflicting(_))
        ));
    }

    #[test]
    fn writer_excludes_everyone_else() {
        let lock = OwnerRwLock::new(0);
        assert!(lock.try_wrlock(owner(0)).is_ok());
        assert!(matches!(
            lock.try_rdlock(owner(1)),
            Err(Error::Conflicting(_))
        ));
        assert!(matches!(
            lock.try_wrlock(owner(1)),
            Err(Error::Conflicting(_))
        ));
    }

    #[test]
    fn sole_reader_upgrades_to_writer() {
        let lock = OwnerRwLock::new(0);
        assert!(lock.try_rdlock(owner(0)).is_ok());
        assert!(lock.try_wrlock(owner(0)).is_ok());
        assert!(lock.is_writer(owner(0)));
    }

    #[test]
    fn unlock_wakes_lowest_indexed_waiter_first() {
        let lock = OwnerRwLock::new(0);
        assert!(lock.try_wrlock(owner(0)).is_ok());
        lock.register_waiter(owner(5), true);
        lock.register_waiter(owner(2), true);
        let woken = lock.unlock(owner(0));
        assert_eq!(woken, vec![owner(2)]);
    }

    #[test]
    fn already_held_reads_are_silent() {
        let lock = OwnerRwLock::new(0);
        assert!(lock.try_rdlock(owner(0)).is_ok());
        assert!(lock.try_rdlock(owner(0)).is_ok());
    }
}
