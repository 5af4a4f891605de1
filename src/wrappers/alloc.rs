//! Transactional heap allocation. `malloc_tx` allocates eagerly and logs
//! an undo that frees the block if the transaction rolls back; `free_tx`
//! mirrors `pwrite_tx`'s write-log discipline by buffering the free until
//! commit, since a rolled-back transaction must still be able to read
//! through a block it asked to free.
//!
//! One [`AllocTx`] module is registered per transaction, not per block —
//! allocations have no shared global identity the way files do, so there
//! is nothing to scan or reference-count here (§4.3 does not apply).

use std::alloc::Layout;

use crate::error::{Error, RecoverableKind};
use crate::event::Event;
use crate::module::Module;
use crate::tx::Transaction;

const MODULE_MALLOC: u16 = 1;
const MODULE_FREE: u16 = 2;

struct Block {
    ptr: *mut u8,
    layout: Layout,
}

#[derive(Default)]
pub struct AllocTx {
    blocks: Vec<Block>,
}

impl AllocTx {
    fn index_of(&self, ptr: *mut u8) -> Option<usize> {
        self.blocks.iter().position(|b| b.ptr == ptr)
    }
}

impl Module for AllocTx {
    fn apply_event(&mut self, event: &Event) -> Result<(), Error> {
        if event.head == MODULE_FREE {
            if let Some(block) = self.blocks.get(event.tail) {
                unsafe { std::alloc::dealloc(block.ptr, block.layout) };
            }
        }
        Ok(())
    }

    fn undo_event(&mut self, event: &Event) -> Result<(), Error> {
        // A rollback never runs `apply_event`, so a buffered free never
        // actually happened to this block — it must be deallocated here
        // regardless of whether `free_tx` was also called, or it leaks.
        if event.head == MODULE_MALLOC {
            if let Some(block) = self.blocks.get(event.tail) {
                unsafe { std::alloc::dealloc(block.ptr, block.layout) };
            }
        }
        Ok(())
    }
}

/// Allocates `layout` eagerly and logs an undo that frees it if this
/// transaction rolls back. Callers bear the same safety obligations as
/// `std::alloc::alloc`/`dealloc`: `layout` must later be passed unchanged
/// to `free_tx`, and the pointer must not be used after `free_tx` commits.
pub fn malloc_tx(tx: &mut Transaction, layout: Layout) -> Result<*mut u8, Error> {
    let ptr = unsafe { std::alloc::alloc(layout) };
    if ptr.is_null() {
        return Err(Error::Recoverable {
            kind: RecoverableKind::AllocationFailure,
            source: None,
        });
    }
    let (shadow, module_id) = tx.alloc_shadow();
    let tail = {
        let mut shadow = shadow.borrow_mut();
        shadow.blocks.push(Block { ptr, layout });
        shadow.blocks.len() - 1
    };
    tx.events_mut().append(module_id, MODULE_MALLOC, tail);
    Ok(ptr)
}

/// Buffers a free of `ptr`/`layout`; the real deallocation happens only
/// at commit, so a transaction that frees then rolls back still sees the
/// block as live.
pub fn free_tx(tx: &mut Transaction, ptr: *mut u8, layout: Layout) -> Result<(), Error> {
    let (shadow, module_id) = tx.alloc_shadow();
    let tail = {
        let mut shadow = shadow.borrow_mut();
        match shadow.index_of(ptr) {
            Some(index) => index,
            None => {
                shadow.blocks.push(Block { ptr, layout });
                shadow.blocks.len() - 1
            }
        }
    };
    tx.events_mut().append(module_id, MODULE_FREE, tail);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TxConfig;
    use crate::shadow::file_tx::CcMode;

    #[test]
    fn committed_malloc_leaves_memory_writable() {
        let layout = Layout::new::<[u8; 8]>();
        let config = TxConfig::default();

        let ptr = crate::tx::begin(CcMode::Twopl, &config, |tx| malloc_tx(tx, layout)).expect("commit");

        unsafe {
            std::ptr::write_bytes(ptr, 0xAB, 8);
            assert_eq!(*ptr, 0xAB);
            // Never freed by the transaction (no `free_tx` call), so this
            // is the caller's own block to release.
            std::alloc::dealloc(ptr, layout);
        }
    }

    #[test]
    fn malloc_then_free_in_the_same_transaction_commits_cleanly() {
        let layout = Layout::new::<u64>();
        let config = TxConfig::default();

        let result = crate::tx::begin(CcMode::Twopl, &config, |tx| {
            let ptr = malloc_tx(tx, layout)?;
            free_tx(tx, ptr, layout)
        });

        assert!(result.is_ok());
    }

    #[test]
    fn rolled_back_malloc_does_not_escape_the_transaction() {
        let layout = Layout::new::<u64>();
        let config = TxConfig::default();

        let result: Result<(), Error> = crate::tx::begin(CcMode::Twopl, &config, |tx| {
            let _ptr = malloc_tx(tx, layout)?;
            Err(Error::irrecoverable("deliberate rollback"))
        });

        assert!(result.is_err());
    }

    #[test]
    fn malloc_then_free_then_rollback_still_deallocates() {
        // The free was only ever buffered, never applied, so undo must
        // free the block itself rather than deferring to the (never run)
        // MODULE_FREE apply path.
        let layout = Layout::new::<u64>();
        let config = TxConfig::default();

        let result: Result<(), Error> = crate::tx::begin(CcMode::Twopl, &config, |tx| {
            let ptr = malloc_tx(tx, layout)?;
            free_tx(tx, ptr, layout)?;
            Err(Error::irrecoverable("deliberate rollback"))
        });

        assert!(result.is_err());
    }
}
