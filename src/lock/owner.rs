//! A lock owner is the identity a transaction uses to acquire and release
//! locks. It carries a dense, recyclable index assigned by the
//! [`crate::lock::manager::LockManager`] on registration.

use std::sync::atomic::{AtomicU64, Ordering};

/// The stable index of a registered lock owner, in `[0, max_owners)`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct OwnerIndex(pub(crate) u32);

impl OwnerIndex {
    pub fn get(self) -> u32 {
        self.0
    }
}

/// Per-owner record of whether *this* owner currently holds a given lock as
/// reader, writer, or neither. One instance exists per lock-field the owner
/// may touch; unlocking during `finish` is a flat sweep, not a traversal.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum RwState {
    #[default]
    Unlocked,
    Reader,
    Writer,
}

/// One lock owner per active transaction, registered with the global
/// [`crate::lock::manager::LockManager`] on first use of a thread.
pub struct LockOwner {
    index: OwnerIndex,
    /// Monotonic generation counter, bumped each time this slot is reused
    /// by a new transaction after a prior one unregistered.
    generation: AtomicU64,
}

impl LockOwner {
    pub(crate) fn new(index: OwnerIndex) -> Self {
        LockOwner {
            index,
            generation: AtomicU64::new(0),
        }
    }

    pub fn index(&self) -> OwnerIndex {
        self.index
    }

    pub(crate) fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
