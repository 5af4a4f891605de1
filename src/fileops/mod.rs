//! File-op dispatch (§4.5 component G): per-file-kind handling of the
//! positional and stream read/write calls. Regular files carry the
//! richest shadow (write-log, range locks, concurrency-control mode) and
//! live in [`crate::shadow::file_tx`]; the other four kinds are thin
//! enough to keep here, one module each, per Design Notes §9's
//! preference for a flat match over a vtable of function pointers.

pub mod chrdev;
pub mod dir;
pub mod fifo;
pub mod socket;

use std::rc::Rc;
use std::cell::RefCell;

use crate::error::Error;
use crate::shadow::file_tx::RegfileTx;

/// The per-kind transaction-local file shadow, dispatched by
/// [`crate::file::FileKind`]. Holding the enum (rather than a `dyn` trait
/// object) keeps dispatch a flat match, matching how `OfdTx::file_kind`
/// is already tagged.
pub enum FileTxHandle {
    Regfile(Rc<RefCell<RegfileTx>>),
    Dir(Rc<RefCell<dir::DirTx>>),
    Fifo(Rc<RefCell<fifo::FifoTx>>),
    Chrdev(Rc<RefCell<chrdev::ChrdevTx>>),
    Socket(Rc<RefCell<socket::SocketTx>>),
}

impl FileTxHandle {
    /// Positional read. Only regular files support this; every other kind
    /// returns `ESPIPE`, matching the kernel's own behaviour for
    /// `pread` on pipes, character devices and sockets.
    pub fn pread(&self, buf: &mut [u8], off: u64) -> Result<usize, Error> {
        match self {
            FileTxHandle::Regfile(tx) => tx.borrow_mut().pread(buf, off),
            _ => Err(Error::recoverable_errno(nix::errno::Errno::ESPIPE as i32)),
        }
    }

    pub fn pwrite(&self, buf: &[u8], off: u64) -> Result<usize, Error> {
        match self {
            FileTxHandle::Regfile(tx) => tx.borrow_mut().pwrite(buf, off),
            _ => Err(Error::recoverable_errno(nix::errno::Errno::ESPIPE as i32)),
        }
    }

    /// Non-positional read, for kinds with no meaningful offset.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, Error> {
        match self {
            FileTxHandle::Fifo(tx) => tx.borrow_mut().read(buf),
            FileTxHandle::Chrdev(tx) => tx.borrow_mut().read(buf),
            FileTxHandle::Socket(tx) => tx.borrow_mut().read(buf),
            FileTxHandle::Dir(_) => Err(Error::recoverable_errno(nix::errno::Errno::EISDIR as i32)),
            FileTxHandle::Regfile(_) => {
                Err(Error::irrecoverable("regular files read via pread, not read"))
            }
        }
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize, Error> {
        match self {
            FileTxHandle::Fifo(tx) => tx.borrow_mut().write(buf),
            FileTxHandle::Chrdev(tx) => tx.borrow_mut().write(buf),
            FileTxHandle::Socket(tx) => tx.borrow_mut().write(buf),
            FileTxHandle::Dir(_) => Err(Error::recoverable_errno(nix::errno::Errno::EISDIR as i32)),
            FileTxHandle::Regfile(_) => {
                Err(Error::irrecoverable("regular files write via pwrite, not write"))
            }
        }
    }

    /// Whether `lseek` is meaningful for this kind; pipes, sockets and
    /// most character devices answer `ESPIPE`.
    pub fn supports_seek(&self) -> bool {
        matches!(self, FileTxHandle::Regfile(_) | FileTxHandle::Dir(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;

    fn dir_handle() -> FileTxHandle {
        let fildes = nix::fcntl::open(
            ".",
            nix::fcntl::OFlag::O_RDONLY | nix::fcntl::OFlag::O_DIRECTORY,
            nix::sys::stat::Mode::empty(),
        )
        .expect("open .");
        FileTxHandle::Dir(Rc::new(RefCell::new(dir::DirTx::new(fildes, 0))))
    }

    #[test]
    fn directories_reject_read_and_write_with_eisdir() {
        let handle = dir_handle();
        let mut buf = [0u8; 4];
        let err = handle.read(&mut buf).unwrap_err();
        assert_eq!(
            crate::wrappers::errno::errno_of(&err),
            Some(Errno::EISDIR as i32)
        );
        let err = handle.write(&buf).unwrap_err();
        assert_eq!(
            crate::wrappers::errno::errno_of(&err),
            Some(Errno::EISDIR as i32)
        );
    }

    #[test]
    fn directories_support_seek_but_fifos_do_not() {
        assert!(dir_handle().supports_seek());

        let (read_end, write_end) = nix::unistd::pipe().expect("pipe");
        let handle = FileTxHandle::Fifo(Rc::new(RefCell::new(fifo::FifoTx::new(write_end, 0))));
        assert!(!handle.supports_seek());
        let _ = nix::unistd::close(read_end);
        let _ = nix::unistd::close(write_end);
    }

    #[test]
    fn non_regular_kinds_reject_positional_io_with_espipe() {
        let (read_end, write_end) = nix::unistd::pipe().expect("pipe");
        let handle = FileTxHandle::Fifo(Rc::new(RefCell::new(fifo::FifoTx::new(write_end, 0))));
        let mut buf = [0u8; 4];
        let err = handle.pread(&mut buf, 0).unwrap_err();
        assert_eq!(
            crate::wrappers::errno::errno_of(&err),
            Some(Errno::ESPIPE as i32)
        );
        let _ = nix::unistd::close(read_end);
        let _ = nix::unistd::close(write_end);
    }
}
