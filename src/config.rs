//! Tunables for the transaction engine. There are no environment variables
//! consumed by the core (spec §6); embedders override [`TxConfig::default`]
//! explicitly.

use std::sync::OnceLock;

use crate::error::Error;

/// Default number of simultaneously registered lock owners (i.e. concurrent
/// in-flight transactions across all threads).
pub const DEFAULT_MAX_OWNERS: usize = 128;

/// Default capacity of each global file-identity table (regfile, dir,
/// fifo, chrdev, socket) and of the OFD table.
pub const DEFAULT_TABLE_CAPACITY: usize = 1024;

/// Default capacity of the process-wide file-descriptor table.
pub const DEFAULT_FD_CAPACITY: usize = 1024;

/// `RECBITS` from the original record-locking scheme: records are
/// `1 << RECBITS` bytes wide.
pub const DEFAULT_RECBITS: u32 = 16;

/// Fan-out of each radix-tree leaf in the range-lock map.
pub const RANGEMAP_LEAF_FANOUT: usize = 64;

#[derive(Clone, Debug)]
pub struct TxConfig {
    pub max_owners: usize,
    pub table_capacity: usize,
    pub fd_capacity: usize,
    pub recbits: u32,
    /// Bound on automatic conflict-driven restarts before a transaction is
    /// forced into irrevocable mode. The spec requires progress, not a
    /// specific bound; this is the policy this crate chooses.
    pub max_conflict_restarts: u32,
}

impl Default for TxConfig {
    fn default() -> Self {
        TxConfig {
            max_owners: DEFAULT_MAX_OWNERS,
            table_capacity: DEFAULT_TABLE_CAPACITY,
            fd_capacity: DEFAULT_FD_CAPACITY,
            recbits: DEFAULT_RECBITS,
            max_conflict_restarts: 16,
        }
    }
}

impl TxConfig {
    pub fn record_size(&self) -> u64 {
        1u64 << self.recbits
    }
}

/// The `TxConfig` the process's global tables and lock manager were
/// actually sized with: the first config passed to `begin`, set once and
/// never changed (those tables are constructed lazily on first touch and
/// never resized).
static ACTIVE: OnceLock<TxConfig> = OnceLock::new();

/// Records `config` as the active configuration on the first call. Every
/// later call must agree on the fields that size process-wide state, or
/// `begin` would silently ignore a caller's larger `max_owners`/
/// `table_capacity`/`fd_capacity`/`recbits` after the first transaction.
pub fn ensure_active(config: &TxConfig) -> Result<(), Error> {
    let active = ACTIVE.get_or_init(|| config.clone());
    if active.max_owners != config.max_owners
        || active.table_capacity != config.table_capacity
        || active.fd_capacity != config.fd_capacity
        || active.recbits != config.recbits
    {
        return Err(Error::irrecoverable(format!(
            "TxConfig changed after the first `begin` call (active: max_owners={}, table_capacity={}, fd_capacity={}, recbits={}; requested: max_owners={}, table_capacity={}, fd_capacity={}, recbits={}) — global tables are sized once per process",
            active.max_owners,
            active.table_capacity,
            active.fd_capacity,
            active.recbits,
            config.max_owners,
            config.table_capacity,
            config.fd_capacity,
            config.recbits,
        )));
    }
    Ok(())
}

/// The configuration the process's global tables were sized with, or
/// `TxConfig::default()` if no transaction has run `begin` yet (e.g. a
/// test that touches a global table directly).
pub fn active() -> TxConfig {
    ACTIVE.get_or_init(TxConfig::default).clone()
}
