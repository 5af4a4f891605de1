//! Directory shadow. Directories participate in the file tables for
//! identity and locking (e.g. a concurrent `rename`) but support neither
//! `read` nor `write`; both fail `EISDIR` per POSIX.

use std::os::unix::io::RawFd;

use crate::error::Error;
use crate::module::Module;

pub struct DirTx {
    pub fildes: RawFd,
    pub file_index: usize,
}

impl DirTx {
    pub fn new(fildes: RawFd, file_index: usize) -> Self {
        DirTx { fildes, file_index }
    }
}

pub struct DirTxModule {
    pub shared: std::rc::Rc<std::cell::RefCell<DirTx>>,
}

impl Module for DirTxModule {
    fn finish(&mut self) -> Result<(), Error> {
        let shadow = self.shared.borrow();
        crate::file::global().dirs.unref(shadow.file_index, |_| {});
        Ok(())
    }
}
