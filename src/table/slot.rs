//! Generic identity-scanned table (§4.4): a fixed-capacity vector of
//! [`Shared`] slots, looked up by linear scan under a table-wide insert
//! lock. This is the shape common to the regfile/dir/fifo/chrdev/socket
//! and OFD tables (component D); the FD table (component E) is indexed
//! directly by fd number instead and lives in [`crate::table::fdtab`].

use std::sync::Mutex;

use crate::error::Error;
use crate::refcount::Shared;

pub struct Entry<Id, Res> {
    pub id: Id,
    pub resource: Res,
}

/// A fixed-capacity, identity-scanned resource table.
pub struct ScanTable<Id, Res> {
    slots: Vec<Shared<Entry<Id, Res>>>,
    /// Serialises the claim-a-free-slot step of `ref_by_id`. Concurrent
    /// scans still proceed lock-free against each slot's own mutex; only
    /// insertion needs table-wide exclusion (§4.4 step 3).
    insert_lock: Mutex<()>,
}

impl<Id: Copy + Eq, Res> ScanTable<Id, Res> {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Shared::new);
        ScanTable {
            slots,
            insert_lock: Mutex::new(()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Implements §4.4's `ref_fildes` algorithm generically: scan under
    /// read-only conditions first; on miss, serialise, rescan, then claim
    /// a free slot. Returns the claimed slot's index.
    pub fn ref_by_id(
        &self,
        id: Id,
        init: impl FnOnce() -> Result<Res, Error>,
    ) -> Result<usize, Error> {
        if let Some(index) = self.scan(id) {
            return Ok(index);
        }

        let _guard = self.insert_lock.lock().unwrap();

        if let Some(index) = self.scan(id) {
            return Ok(index);
        }

        let free_index = self.slots.iter().position(|slot| slot.is_empty());
        let Some(index) = free_index else {
            return Err(Error::Conflicting(None));
        };

        let matched = self.slots[index].ref_or_set_up(
            |existing| existing.is_none(),
            move || {
                let resource = init()?;
                Ok(Entry { id, resource })
            },
        )?;
        if matched {
            Ok(index)
        } else {
            // Lost a race for this slot to another inserter despite holding
            // `insert_lock`; this should not happen in practice but the
            // caller's retry loop handles it uniformly either way.
            Err(Error::Conflicting(None))
        }
    }

    fn scan(&self, id: Id) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.cmp_and_ref(|entry| entry.id == id))
    }

    pub fn slot(&self, index: usize) -> &Shared<Entry<Id, Res>> {
        &self.slots[index]
    }

    pub fn unref(&self, index: usize, finalise: impl FnOnce(&mut Entry<Id, Res>)) {
        self.slots[index].unref(finalise);
    }

    pub fn with_resource<R>(&self, index: usize, f: impl FnOnce(&Res) -> R) -> R {
        self.slots[index].with_value(|entry| f(&entry.expect("slot index must be referenced").resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_by_id_reuses_existing_slot() {
        let table: ScanTable<u64, u32> = ScanTable::new(4);
        let mut inits = 0;
        let a = table.ref_by_id(7, || {
            inits += 1;
            Ok(100)
        }).unwrap();
        let b = table.ref_by_id(7, || {
            inits += 1;
            Ok(100)
        }).unwrap();
        assert_eq!(a, b);
        assert_eq!(inits, 1);
    }

    #[test]
    fn ref_by_id_fails_when_table_full() {
        let table: ScanTable<u64, u32> = ScanTable::new(1);
        table.ref_by_id(1, || Ok(1)).unwrap();
        let result = table.ref_by_id(2, || Ok(2));
        assert!(matches!(result, Err(Error::Conflicting(None))));
    }

    #[test]
    fn slot_reused_after_last_unref() {
        let table: ScanTable<u64, u32> = ScanTable::new(1);
        let a = table.ref_by_id(1, || Ok(1)).unwrap();
        table.unref(a, |_| {});
        let b = table.ref_by_id(2, || Ok(2)).unwrap();
        assert_eq!(a, b);
    }
}
