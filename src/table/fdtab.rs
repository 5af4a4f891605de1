//! The process-wide file-descriptor table (§3, §4.4 "FD table"): a vector
//! indexed by small integers `0..fd_capacity`. Unlike the identity-scanned
//! tables in [`crate::table::slot`], this one is indexed directly by the
//! kernel-assigned fd number.

use std::os::unix::io::RawFd;
use std::sync::{Mutex, RwLock};

use crate::error::Error;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum FdState {
    Unused,
    Open,
    /// Close has been recorded but not yet applied; still-referencing
    /// transactions must see a version mismatch and restart (§4.4).
    Closing,
}

#[derive(Clone, Debug)]
pub struct FdEntry {
    pub state: FdState,
    pub refcount: u32,
    /// Index into the global OFD table.
    pub ofd_index: Option<usize>,
    pub fd_flags: i32,
    /// Incremented on every close to invalidate stale transactional
    /// handles that still reference this slot (§4.4).
    pub version: u64,
}

impl Default for FdEntry {
    fn default() -> Self {
        FdEntry {
            state: FdState::Unused,
            refcount: 0,
            ofd_index: None,
            fd_flags: 0,
            version: 0,
        }
    }
}

pub struct FdTable {
    /// Guards growth of `entries`; per-entry mutation goes through each
    /// entry's own `Mutex` once the table is large enough to cover the fd.
    entries: RwLock<Vec<Mutex<FdEntry>>>,
    capacity: usize,
}

impl FdTable {
    pub fn new(initial_capacity: usize, capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(initial_capacity);
        entries.resize_with(initial_capacity, || Mutex::new(FdEntry::default()));
        FdTable {
            entries: RwLock::new(entries),
            capacity,
        }
    }

    fn ensure_capacity(&self, fildes: RawFd) -> Result<(), Error> {
        let needed = fildes as usize + 1;
        {
            let entries = self.entries.read().unwrap();
            if entries.len() >= needed {
                return Ok(());
            }
        }
        if needed > self.capacity {
            return Err(Error::recoverable_errno(nix::libc::EMFILE));
        }
        let mut entries = self.entries.write().unwrap();
        if entries.len() < needed {
            entries.resize_with(needed, || Mutex::new(FdEntry::default()));
        }
        Ok(())
    }

    /// Registers a freshly kernel-opened fd as `Open`, bumping its version
    /// so any stale shadow referencing a prior occupant is invalidated.
    pub fn open(&self, fildes: RawFd, ofd_index: usize, fd_flags: i32) -> Result<u64, Error> {
        self.ensure_capacity(fildes)?;
        let entries = self.entries.read().unwrap();
        let mut entry = entries[fildes as usize].lock().unwrap();
        entry.state = FdState::Open;
        entry.refcount = 0;
        entry.ofd_index = Some(ofd_index);
        entry.fd_flags = fd_flags;
        entry.version += 1;
        Ok(entry.version)
    }

    pub fn with_entry<R>(&self, fildes: RawFd, f: impl FnOnce(&FdEntry) -> R) -> Result<R, Error> {
        let entries = self.entries.read().unwrap();
        let entry = entries
            .get(fildes as usize)
            .ok_or_else(|| Error::recoverable_errno(nix::libc::EBADF))?
            .lock()
            .unwrap();
        if entry.state == FdState::Unused {
            return Err(Error::recoverable_errno(nix::libc::EBADF));
        }
        Ok(f(&entry))
    }

    pub fn ref_entry(&self, fildes: RawFd) -> Result<(), Error> {
        let entries = self.entries.read().unwrap();
        let mut entry = entries
            .get(fildes as usize)
            .ok_or_else(|| Error::recoverable_errno(nix::libc::EBADF))?
            .lock()
            .unwrap();
        if entry.state != FdState::Open {
            return Err(Error::recoverable_errno(nix::libc::EBADF));
        }
        entry.refcount += 1;
        Ok(())
    }

    pub fn unref_entry(&self, fildes: RawFd) {
        let entries = self.entries.read().unwrap();
        if let Some(slot) = entries.get(fildes as usize) {
            let mut entry = slot.lock().unwrap();
            entry.refcount = entry.refcount.saturating_sub(1);
        }
    }

    /// Marks an entry `Closing`; a transaction whose shadow still holds
    /// the prior version observes the bump at validation and restarts.
    pub fn mark_closing(&self, fildes: RawFd) -> Result<u64, Error> {
        let entries = self.entries.read().unwrap();
        let mut entry = entries
            .get(fildes as usize)
            .ok_or_else(|| Error::recoverable_errno(nix::libc::EBADF))?
            .lock()
            .unwrap();
        entry.state = FdState::Closing;
        entry.version += 1;
        Ok(entry.version)
    }

    /// Completes a close, returning the slot to `Unused`.
    pub fn finish_close(&self, fildes: RawFd) {
        let entries = self.entries.read().unwrap();
        if let Some(slot) = entries.get(fildes as usize) {
            let mut entry = slot.lock().unwrap();
            *entry = FdEntry::default();
        }
    }

    pub fn version_matches(&self, fildes: RawFd, expected: u64) -> Result<bool, Error> {
        self.with_entry(fildes, |entry| entry.version == expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_then_close_round_trips_version() {
        let table = FdTable::new(8, 64);
        let v1 = table.open(3, 0, 0).unwrap();
        assert!(table.version_matches(3, v1).unwrap());
        let v2 = table.mark_closing(3).unwrap();
        assert_ne!(v1, v2);
        table.finish_close(3);
        assert!(table.with_entry(3, |e| e.state).is_err());
    }

    #[test]
    fn grows_up_to_capacity_then_emfile() {
        let table = FdTable::new(1, 2);
        assert!(table.open(1, 0, 0).is_ok());
        assert!(table.open(5, 0, 0).is_err());
    }
}
