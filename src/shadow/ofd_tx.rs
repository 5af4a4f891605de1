//! `OfdTx` (§3 component F): the per-transaction shadow of one open file
//! description — primarily its shadow file offset, which every `read`,
//! `write` and `lseek` in the transaction observes and advances locally
//! until commit.

use crate::error::Error;
use crate::file::FileKind;
use crate::lock::owner::OwnerIndex;
use crate::module::Module;

pub struct OfdTx {
    pub ofd_index: usize,
    pub file_kind: FileKind,
    pub file_index: usize,
    owner: OwnerIndex,
    /// Local, transaction-private copy of the file offset. Only written
    /// back to the global OFD on commit.
    local_offset: u64,
    offset_locked_writer: bool,
    offset_locked_reader: bool,
}

impl OfdTx {
    pub fn new(
        ofd_index: usize,
        file_kind: FileKind,
        file_index: usize,
        owner: OwnerIndex,
        current_offset: u64,
    ) -> Self {
        OfdTx {
            ofd_index,
            file_kind,
            file_index,
            owner,
            local_offset: current_offset,
            offset_locked_writer: false,
            offset_locked_reader: false,
        }
    }

    pub fn offset(&self) -> u64 {
        self.local_offset
    }

    pub fn set_offset(&mut self, value: u64) {
        self.local_offset = value;
    }

    pub fn advance_offset(&mut self, delta: u64) {
        self.local_offset += delta;
    }

    /// Fast path for `lseek(fd, 0, SEEK_CUR)`: returns the local offset
    /// without taking any lock or marking transaction-local state, per
    /// §4.5 and the boundary case in §8.
    pub fn peek_offset(&self) -> u64 {
        self.local_offset
    }

    pub fn lock_offset_read(&mut self) -> Result<(), Error> {
        if self.offset_locked_reader || self.offset_locked_writer {
            return Ok(());
        }
        crate::file::global()
            .ofds
            .with_resource(self.ofd_index, |ofd| ofd.fields.file_offset.try_rdlock(self.owner))?;
        self.offset_locked_reader = true;
        Ok(())
    }

    pub fn lock_offset_write(&mut self) -> Result<(), Error> {
        if self.offset_locked_writer {
            return Ok(());
        }
        crate::file::global()
            .ofds
            .with_resource(self.ofd_index, |ofd| ofd.fields.file_offset.try_wrlock(self.owner))?;
        self.offset_locked_writer = true;
        self.offset_locked_reader = false;
        Ok(())
    }

    fn unlock_offset(&mut self) {
        if self.offset_locked_reader || self.offset_locked_writer {
            crate::file::global()
                .ofds
                .with_resource(self.ofd_index, |ofd| ofd.fields.file_offset.unlock(self.owner));
            self.offset_locked_reader = false;
            self.offset_locked_writer = false;
        }
    }
}

pub struct OfdTxModule {
    pub shared: std::rc::Rc<std::cell::RefCell<OfdTx>>,
}

impl Module for OfdTxModule {
    fn finish(&mut self) -> Result<(), Error> {
        let mut shadow = self.shared.borrow_mut();
        shadow.unlock_offset();
        crate::file::global().ofds.unref(shadow.ofd_index, |_| {});
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::Ofd;
    use crate::ident::OfdId;
    use crate::lock::owner::OwnerIndex;

    fn ofd_index(fildes: i32) -> usize {
        let id = OfdId::new(crate::ident::FileId { dev: 0, ino: fildes as u64 }, fildes);
        crate::file::global()
            .ofds
            .ref_by_id(id, || {
                Ok(Ofd {
                    fields: Default::default(),
                    kind: FileKind::Regfile,
                    file_index: 0,
                })
            })
            .unwrap()
    }

    #[test]
    fn advancing_the_offset_is_purely_local_until_written_back() {
        let index = ofd_index(9001);
        let mut ofd = OfdTx::new(index, FileKind::Regfile, 0, OwnerIndex(0), 10);
        assert_eq!(ofd.offset(), 10);
        ofd.advance_offset(5);
        assert_eq!(ofd.offset(), 15);
        ofd.set_offset(0);
        assert_eq!(ofd.peek_offset(), 0);
    }

    #[test]
    fn write_lock_is_idempotent_for_the_same_owner() {
        let index = ofd_index(9002);
        let mut ofd = OfdTx::new(index, FileKind::Regfile, 0, OwnerIndex(1), 0);
        ofd.lock_offset_write().unwrap();
        ofd.lock_offset_write().unwrap();
        ofd.unlock_offset();
    }

    #[test]
    fn a_second_owner_conflicts_on_the_same_offset_lock() {
        let index = ofd_index(9003);
        let mut first = OfdTx::new(index, FileKind::Regfile, 0, OwnerIndex(2), 0);
        first.lock_offset_write().unwrap();

        let mut second = OfdTx::new(index, FileKind::Regfile, 0, OwnerIndex(3), 0);
        assert!(second.lock_offset_write().is_err());

        first.unlock_offset();
        second.lock_offset_write().unwrap();
    }
}
