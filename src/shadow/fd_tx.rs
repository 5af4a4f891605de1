//! `FdTx` (§3 component F): the per-transaction shadow of one file
//! descriptor. Holds a reference to the global FD-table entry, the
//! version captured at first access (to detect a concurrent close), and
//! a record of whether this transaction wants to close the fd at commit.

use std::os::unix::io::RawFd;

use tracing::{event, Level};

use crate::error::Error;
use crate::event::Event;
use crate::lock::owner::OwnerIndex;
use crate::module::Module;
use crate::table::fdtab::FdTable;

pub const MODULE_CLOSE: u16 = 1;

pub struct FdTx {
    pub fildes: RawFd,
    pub ofd_index: usize,
    version: u64,
    owner: OwnerIndex,
    close_requested: bool,
    referenced: bool,
}

impl FdTx {
    pub fn new(fildes: RawFd, ofd_index: usize, version: u64, owner: OwnerIndex) -> Self {
        FdTx {
            fildes,
            ofd_index,
            version,
            owner,
            close_requested: false,
            referenced: true,
        }
    }

    /// Records that this transaction wants `fildes` closed at commit.
    /// Returns the event to append to the transaction's log.
    pub fn request_close(&mut self, module_id: u8) -> Event {
        self.close_requested = true;
        Event {
            module_id,
            head: MODULE_CLOSE,
            tail: 0,
        }
    }

    fn validate_version(&self, fds: &FdTable) -> Result<(), Error> {
        // A concurrent close that has already run `finish_close` leaves
        // the entry `Unused`, which `version_matches` reports as an
        // error rather than `false` — that's still just this shadow's
        // fd having gone stale underneath it, so it must restart the
        // transaction the same as an ordinary version mismatch, not
        // surface as a bare `Recoverable` errno.
        match fds.version_matches(self.fildes, self.version) {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => Err(Error::Conflicting(None)),
        }
    }
}

/// Adapter registering an `FdTx` (shared with the owning [`crate::tx::Transaction`])
/// as a module in the commit/rollback pipeline.
pub struct FdTxModule {
    pub shared: std::rc::Rc<std::cell::RefCell<FdTx>>,
}

impl Module for FdTxModule {
    fn validate(&mut self, _is_retry: bool) -> Result<(), Error> {
        self.shared.borrow().validate_version(&crate::file::global().fds)
    }

    fn apply_event(&mut self, event: &Event) -> Result<(), Error> {
        if event.head == MODULE_CLOSE {
            let shadow = self.shared.borrow();
            let fds = &crate::file::global().fds;
            fds.mark_closing(shadow.fildes)?;
            nix::unistd::close(shadow.fildes).map_err(Error::from)?;
            fds.finish_close(shadow.fildes);
            event!(Level::TRACE, fildes = shadow.fildes, "applied close");
        }
        Ok(())
    }

    fn undo_event(&mut self, event: &Event) -> Result<(), Error> {
        // `close` is deferred to apply (§4.5 open question, preserved
        // conservatively): there is nothing to undo since the kernel
        // close never ran during `exec`.
        debug_assert_eq!(event.head, MODULE_CLOSE);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        let mut shadow = self.shared.borrow_mut();
        if shadow.referenced {
            crate::file::global().fds.unref_entry(shadow.fildes);
            shadow.referenced = false;
        }
        let _ = shadow.owner;
        let _ = shadow.close_requested;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::fdtab::FdTable;

    #[test]
    fn version_mismatch_after_concurrent_close_is_conflicting() {
        let table = FdTable::new(4, 16);
        let v1 = table.open(3, 0, 0).unwrap();
        let fdtx = FdTx::new(3, 0, v1, OwnerIndex(0));
        table.mark_closing(3).unwrap();
        table.finish_close(3);
        table.open(3, 1, 0).unwrap();
        assert!(matches!(
            fdtx.validate_version(&table),
            Err(Error::Conflicting(None))
        ));
    }

    #[test]
    fn validate_after_close_with_no_reopen_is_conflicting_not_recoverable() {
        let table = FdTable::new(4, 16);
        let v1 = table.open(3, 0, 0).unwrap();
        let fdtx = FdTx::new(3, 0, v1, OwnerIndex(0));
        table.mark_closing(3).unwrap();
        table.finish_close(3);
        // Entry is now `Unused`; `version_matches` errors internally, but
        // the shadow must still see this as a restart-worthy conflict.
        assert!(matches!(
            fdtx.validate_version(&table),
            Err(Error::Conflicting(None))
        ));
    }
}
