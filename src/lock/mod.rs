//! Lock primitives and coordination (§4.1, §4.2, §4.6): the field-level
//! RW-lock, lock owners, the process-wide lock manager, and the per-file
//! range-lock map.

pub mod manager;
pub mod owner;
pub mod rangemap;
pub mod rwlock;
