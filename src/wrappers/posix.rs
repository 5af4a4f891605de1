//! Transactional wrappers over `open`, `close`, `read`/`write`, `lseek`,
//! `dup`, `pipe`, `socket` and `fcntl` (§4.5 "per-operation semantics").
//! Every wrapper materialises the shadows for the fd/ofd/file it touches
//! (reusing ones the transaction already holds), performs or buffers the
//! syscall, and logs whatever event rollback needs to reverse it.

use std::os::unix::io::RawFd;
use std::path::Path;
use std::rc::Rc;

use nix::fcntl::{FcntlArg, OFlag};
use nix::sys::socket::{AddressFamily, SockFlag, SockType};
use nix::sys::stat::{Mode, SFlag};

use crate::error::Error;
use crate::file::{Chrdev, Dir, FileKind, Fifo, Ofd, Regfile, Socket};
use crate::fileops::chrdev::{ChrdevTx, ChrdevTxModule};
use crate::fileops::dir::{DirTx, DirTxModule};
use crate::fileops::fifo::{FifoTx, FifoTxModule};
use crate::fileops::socket::{SocketTx, SocketTxModule};
use crate::fileops::FileTxHandle;
use crate::ident::{FileId, OfdId};
use crate::module::Module;
use crate::shadow::fd_tx::FdTx;
use crate::shadow::file_tx::{CcMode, RegfileTx, RegfileTxModule, MODULE_WRITE};
use crate::shadow::ofd_tx::OfdTx;
use crate::tx::Transaction;

/// Event head used by the per-open rollback guard (`OpenGuardModule`):
/// reverses a kernel `open`/`dup`/`pipe`/`socket`/`mkstemp` by closing the
/// fd(s) it created and, if requested, unlinking the path.
const MODULE_OPEN_UNDO: u16 = 1;

/// Registered once per fd-creating call. `apply_event` is a no-op (the
/// open already happened eagerly, per §4.5); `undo_event` closes the fd
/// and optionally removes the path it created.
struct OpenGuardModule {
    fildes: RawFd,
    unlink_path: Option<std::path::PathBuf>,
    reverted: bool,
}

impl Module for OpenGuardModule {
    fn undo_event(&mut self, event: &crate::event::Event) -> Result<(), Error> {
        if event.head != MODULE_OPEN_UNDO || self.reverted {
            return Ok(());
        }
        self.reverted = true;
        let _ = nix::unistd::close(self.fildes);
        if let Some(path) = &self.unlink_path {
            let _ = std::fs::remove_file(path);
        }
        Ok(())
    }
}

/// The fd's real current offset, via `lseek(fd, 0, SEEK_CUR)`. Every
/// `OfdTx` shadow must start from this, not a hardcoded `0` — a freshly
/// opened fd happens to be at `0`, but one this transaction is attaching
/// to (or re-adopting) may already be positioned elsewhere.
fn current_offset(fildes: RawFd) -> Result<u64, Error> {
    let off = nix::unistd::lseek(fildes, 0, nix::unistd::Whence::SeekCur)?;
    Ok(off as u64)
}

fn kind_of(mode: nix::sys::stat::mode_t) -> FileKind {
    let sflag = SFlag::from_bits_truncate(mode);
    if sflag.contains(SFlag::S_IFDIR) {
        FileKind::Dir
    } else if sflag.contains(SFlag::S_IFIFO) {
        FileKind::Fifo
    } else if sflag.contains(SFlag::S_IFCHR) {
        FileKind::Chrdev
    } else if sflag.contains(SFlag::S_IFSOCK) {
        FileKind::Socket
    } else {
        FileKind::Regfile
    }
}

/// Refs the global per-kind file table entry for `file_id`/`kind`,
/// returning its index. Each kind is a distinct [`crate::table::slot::ScanTable`],
/// so dispatch is a flat match rather than a trait object (Design Notes §9).
fn ref_file_table(kind: FileKind, file_id: FileId, recbits: u32) -> Result<usize, Error> {
    let tables = crate::file::global();
    match kind {
        FileKind::Regfile => tables.regfiles.ref_by_id(file_id, || Ok(Regfile::new(recbits))),
        FileKind::Dir => tables.dirs.ref_by_id(file_id, || Ok(Dir::default())),
        FileKind::Fifo => tables.fifos.ref_by_id(file_id, || Ok(Fifo::default())),
        FileKind::Chrdev => tables.chrdevs.ref_by_id(file_id, || Ok(Chrdev::default())),
        FileKind::Socket => tables.sockets.ref_by_id(file_id, || Ok(Socket::default())),
    }
}

fn unref_file_table(kind: FileKind, file_index: usize) {
    let tables = crate::file::global();
    match kind {
        FileKind::Regfile => tables.regfiles.unref(file_index, |_| {}),
        FileKind::Dir => tables.dirs.unref(file_index, |_| {}),
        FileKind::Fifo => tables.fifos.unref(file_index, |_| {}),
        FileKind::Chrdev => tables.chrdevs.unref(file_index, |_| {}),
        FileKind::Socket => tables.sockets.unref(file_index, |_| {}),
    }
}

fn make_file_handle(
    kind: FileKind,
    fildes: RawFd,
    file_index: usize,
    owner: crate::lock::owner::OwnerIndex,
    cc_mode: CcMode,
) -> (FileTxHandle, Box<dyn Module>) {
    match kind {
        FileKind::Regfile => {
            let shared = Rc::new(std::cell::RefCell::new(RegfileTx::new(
                fildes, file_index, owner, cc_mode,
            )));
            (
                FileTxHandle::Regfile(Rc::clone(&shared)),
                Box::new(RegfileTxModule { shared }),
            )
        }
        FileKind::Dir => {
            let shared = Rc::new(std::cell::RefCell::new(DirTx::new(fildes, file_index)));
            (
                FileTxHandle::Dir(Rc::clone(&shared)),
                Box::new(DirTxModule { shared }),
            )
        }
        FileKind::Fifo => {
            let shared = Rc::new(std::cell::RefCell::new(FifoTx::new(fildes, file_index)));
            (
                FileTxHandle::Fifo(Rc::clone(&shared)),
                Box::new(FifoTxModule { shared }),
            )
        }
        FileKind::Chrdev => {
            let shared = Rc::new(std::cell::RefCell::new(ChrdevTx::new(fildes, file_index)));
            (
                FileTxHandle::Chrdev(Rc::clone(&shared)),
                Box::new(ChrdevTxModule { shared }),
            )
        }
        FileKind::Socket => {
            let shared = Rc::new(std::cell::RefCell::new(SocketTx::new(fildes, file_index)));
            (
                FileTxHandle::Socket(Rc::clone(&shared)),
                Box::new(SocketTxModule { shared }),
            )
        }
    }
}

/// Shared setup for every fd-creating wrapper: identifies the file,
/// refs the file/OFD/FD tables, and materialises all three shadows plus
/// an `OpenGuardModule` that undoes the kernel side effect on rollback.
fn adopt_fildes(
    tx: &mut Transaction,
    fildes: RawFd,
    fd_flags: i32,
    unlink_path: Option<std::path::PathBuf>,
) -> Result<(), Error> {
    let owner = tx.owner();
    let file_id = FileId::of_fd(fildes)?;
    let stat = nix::sys::stat::fstat(fildes)?;
    let kind = kind_of(stat.st_mode as nix::sys::stat::mode_t);
    let recbits = tx.recbits();

    let file_index = ref_file_table(kind, file_id, recbits)?;
    let ofd_id = OfdId::new(file_id, fildes);
    let ofd_index = match crate::file::global().ofds.ref_by_id(ofd_id, || {
        Ok(Ofd {
            fields: Default::default(),
            kind,
            file_index,
        })
    }) {
        Ok(idx) => idx,
        Err(e) => {
            unref_file_table(kind, file_index);
            return Err(e);
        }
    };

    let version = crate::file::global().fds.open(fildes, ofd_index, fd_flags)?;
    let offset = current_offset(fildes)?;

    tx.fd_shadow(fildes, || Ok(FdTx::new(fildes, ofd_index, version, owner)))?;
    tx.ofd_shadow(ofd_index, || Ok(OfdTx::new(ofd_index, kind, file_index, owner, offset)))?;
    let cc_mode = tx.cc_mode();
    tx.file_shadow(file_index, || {
        Ok(make_file_handle(kind, fildes, file_index, owner, cc_mode))
    })?;

    let guard_id = tx.register_module(Box::new(OpenGuardModule {
        fildes,
        unlink_path,
        reverted: false,
    }));
    tx.events_mut().append(guard_id, MODULE_OPEN_UNDO, 0);
    Ok(())
}

/// Builds shadows for an fd this transaction did not itself create,
/// whether left open by an earlier call of its own or by another,
/// already-committed transaction. Looks up the live fd-table entry
/// instead of calling `fds.open()`, so it neither bumps the fd's version
/// nor registers a close-on-rollback guard: this transaction has nothing
/// of its own to undo if it restarts or rolls back.
fn attach_fildes(tx: &mut Transaction, fildes: RawFd) -> Result<(), Error> {
    let owner = tx.owner();
    let file_id = FileId::of_fd(fildes)?;
    let stat = nix::sys::stat::fstat(fildes)?;
    let kind = kind_of(stat.st_mode as nix::sys::stat::mode_t);
    let recbits = tx.recbits();

    crate::file::global().fds.ref_entry(fildes)?;

    let file_index = match ref_file_table(kind, file_id, recbits) {
        Ok(idx) => idx,
        Err(e) => {
            crate::file::global().fds.unref_entry(fildes);
            return Err(e);
        }
    };
    let ofd_id = OfdId::new(file_id, fildes);
    let ofd_index = match crate::file::global().ofds.ref_by_id(ofd_id, || {
        Ok(Ofd {
            fields: Default::default(),
            kind,
            file_index,
        })
    }) {
        Ok(idx) => idx,
        Err(e) => {
            unref_file_table(kind, file_index);
            crate::file::global().fds.unref_entry(fildes);
            return Err(e);
        }
    };
    let version = match crate::file::global().fds.with_entry(fildes, |entry| entry.version) {
        Ok(v) => v,
        Err(e) => {
            crate::file::global().ofds.unref(ofd_index, |_| {});
            unref_file_table(kind, file_index);
            crate::file::global().fds.unref_entry(fildes);
            return Err(e);
        }
    };
    let offset = match current_offset(fildes) {
        Ok(off) => off,
        Err(e) => {
            crate::file::global().ofds.unref(ofd_index, |_| {});
            unref_file_table(kind, file_index);
            crate::file::global().fds.unref_entry(fildes);
            return Err(e);
        }
    };

    tx.fd_shadow(fildes, || Ok(FdTx::new(fildes, ofd_index, version, owner)))?;
    tx.ofd_shadow(ofd_index, || Ok(OfdTx::new(ofd_index, kind, file_index, owner, offset)))?;
    let cc_mode = tx.cc_mode();
    tx.file_shadow(file_index, || {
        Ok(make_file_handle(kind, fildes, file_index, owner, cc_mode))
    })?;
    Ok(())
}

/// Returns this transaction's `FdTx` shadow for `fildes`, attaching to the
/// live fd table on a cache miss rather than failing outright (§4.5: a
/// transaction may reference an fd it did not itself open).
fn fd_shadow_or_attach(
    tx: &mut Transaction,
    fildes: RawFd,
) -> Result<(Rc<std::cell::RefCell<FdTx>>, u8), Error> {
    match tx.fd_shadow(fildes, || Err(Error::recoverable_errno(nix::libc::EBADF))) {
        Ok(v) => Ok(v),
        Err(_) => {
            attach_fildes(tx, fildes)?;
            tx.fd_shadow(fildes, || Err(Error::irrecoverable("fd shadow missing after attach")))
        }
    }
}

pub fn open_tx<P: AsRef<Path>>(
    tx: &mut Transaction,
    path: P,
    flags: OFlag,
    mode: Mode,
) -> Result<RawFd, Error> {
    let path = path.as_ref();
    let fildes = nix::fcntl::open(path, flags, mode)?;
    let unlink_path = if flags.contains(OFlag::O_CREAT | OFlag::O_EXCL) {
        Some(path.to_path_buf())
    } else {
        None
    };
    if let Err(e) = adopt_fildes(tx, fildes, 0, unlink_path) {
        let _ = nix::unistd::close(fildes);
        return Err(e);
    }
    Ok(fildes)
}

pub fn mkstemp_tx<P: AsRef<Path>>(tx: &mut Transaction, template: P) -> Result<(RawFd, std::path::PathBuf), Error> {
    let (fildes, path) = nix::unistd::mkstemp(template.as_ref())?;
    if let Err(e) = adopt_fildes(tx, fildes, 0, Some(path.clone())) {
        let _ = nix::unistd::close(fildes);
        return Err(e);
    }
    Ok((fildes, path))
}

fn fd_ofd_file(
    tx: &mut Transaction,
    fildes: RawFd,
) -> Result<(Rc<std::cell::RefCell<FdTx>>, Rc<std::cell::RefCell<OfdTx>>, FileTxHandle), Error> {
    let (fd_shadow, _) = fd_shadow_or_attach(tx, fildes)?;
    let ofd_index = fd_shadow.borrow().ofd_index;
    let (ofd_shadow, _) = tx.ofd_shadow(ofd_index, || {
        Err(Error::irrecoverable("ofd shadow missing for referenced fd"))
    })?;
    let file_index = ofd_shadow.borrow().file_index;
    let (file_handle, _) = tx.file_shadow(file_index, || {
        Err(Error::irrecoverable("file shadow missing for referenced ofd"))
    })?;
    Ok((fd_shadow, ofd_shadow, file_handle))
}

pub fn close_tx(tx: &mut Transaction, fildes: RawFd) -> Result<(), Error> {
    let (fd_shadow, module_id) = fd_shadow_or_attach(tx, fildes)?;
    let event = fd_shadow.borrow_mut().request_close(module_id);
    tx.events_mut().append(event.module_id, event.head, event.tail);
    Ok(())
}

pub fn pread_tx(tx: &mut Transaction, fildes: RawFd, buf: &mut [u8], off: u64) -> Result<usize, Error> {
    let (_, _, file) = fd_ofd_file(tx, fildes)?;
    file.pread(buf, off)
}

pub fn pwrite_tx(tx: &mut Transaction, fildes: RawFd, buf: &[u8], off: u64) -> Result<usize, Error> {
    let (_, _, file) = fd_ofd_file(tx, fildes)?;
    let n = file.pwrite(buf, off)?;
    if let FileTxHandle::Regfile(_) = &file {
        let module_id = find_file_module_id(tx, fildes)?;
        tx.events_mut().append(module_id, MODULE_WRITE, 0);
    }
    Ok(n)
}

fn find_file_module_id(tx: &mut Transaction, fildes: RawFd) -> Result<u8, Error> {
    let (fd_shadow, _) = fd_shadow_or_attach(tx, fildes)?;
    let ofd_index = fd_shadow.borrow().ofd_index;
    let (_, ofd_module_id) = tx.ofd_shadow(ofd_index, || {
        Err(Error::irrecoverable("ofd shadow missing"))
    })?;
    let _ = ofd_module_id;
    let file_index = {
        let (ofd_shadow, _) = tx.ofd_shadow(ofd_index, || {
            Err(Error::irrecoverable("ofd shadow missing"))
        })?;
        ofd_shadow.borrow().file_index
    };
    let (_, file_module_id) = tx.file_shadow(file_index, || {
        Err(Error::irrecoverable("file shadow missing"))
    })?;
    Ok(file_module_id)
}

pub fn read_tx(tx: &mut Transaction, fildes: RawFd, buf: &mut [u8]) -> Result<usize, Error> {
    let (_, ofd_shadow, file) = fd_ofd_file(tx, fildes)?;
    match &file {
        FileTxHandle::Regfile(_) => {
            ofd_shadow.borrow_mut().lock_offset_write()?;
            let off = ofd_shadow.borrow().offset();
            let n = file.pread(buf, off)?;
            ofd_shadow.borrow_mut().advance_offset(n as u64);
            Ok(n)
        }
        _ => file.read(buf),
    }
}

pub fn write_tx(tx: &mut Transaction, fildes: RawFd, buf: &[u8]) -> Result<usize, Error> {
    let (_, ofd_shadow, file) = fd_ofd_file(tx, fildes)?;
    match &file {
        FileTxHandle::Regfile(_) => {
            ofd_shadow.borrow_mut().lock_offset_write()?;
            let off = ofd_shadow.borrow().offset();
            let n = file.pwrite(buf, off)?;
            ofd_shadow.borrow_mut().advance_offset(n as u64);
            let module_id = find_file_module_id(tx, fildes)?;
            tx.events_mut().append(module_id, MODULE_WRITE, 0);
            Ok(n)
        }
        _ => file.write(buf),
    }
}

/// `SEEK_SET`/`SEEK_CUR`/`SEEK_END`, matching `nix::unistd::Whence`.
pub fn lseek_tx(
    tx: &mut Transaction,
    fildes: RawFd,
    offset: i64,
    whence: nix::unistd::Whence,
) -> Result<u64, Error> {
    let (_, ofd_shadow, file) = fd_ofd_file(tx, fildes)?;
    if !file.supports_seek() {
        return Err(Error::recoverable_errno(nix::errno::Errno::ESPIPE as i32));
    }
    if whence == nix::unistd::Whence::SeekCur && offset == 0 {
        // Fast path (§4.5, §8 boundary behaviour): no lock, no event.
        return Ok(ofd_shadow.borrow().peek_offset());
    }
    ofd_shadow.borrow_mut().lock_offset_write()?;
    let new_offset = match whence {
        nix::unistd::Whence::SeekSet => offset as u64,
        nix::unistd::Whence::SeekCur => {
            let cur = ofd_shadow.borrow().offset() as i64;
            (cur + offset).max(0) as u64
        }
        nix::unistd::Whence::SeekEnd => {
            let fildes_for_size = match &file {
                FileTxHandle::Regfile(regfile) => regfile.borrow().fildes,
                _ => return Err(Error::recoverable_errno(nix::errno::Errno::ESPIPE as i32)),
            };
            let stat = nix::sys::stat::fstat(fildes_for_size)?;
            (stat.st_size + offset).max(0) as u64
        }
        _ => return Err(Error::recoverable_errno(nix::errno::Errno::EINVAL as i32)),
    };
    ofd_shadow.borrow_mut().set_offset(new_offset);
    Ok(new_offset)
}

pub fn dup_tx(tx: &mut Transaction, fildes: RawFd) -> Result<RawFd, Error> {
    let new_fd = nix::unistd::dup(fildes)?;
    let (fd_shadow, _) = fd_shadow_or_attach(tx, fildes)?;
    let ofd_index = fd_shadow.borrow().ofd_index;
    crate::file::global().ofds.slot(ofd_index).ref_again();
    let version = crate::file::global().fds.open(new_fd, ofd_index, 0)?;
    let owner = tx.owner();
    tx.fd_shadow(new_fd, || Ok(FdTx::new(new_fd, ofd_index, version, owner)))?;

    let guard_id = tx.register_module(Box::new(OpenGuardModule {
        fildes: new_fd,
        unlink_path: None,
        reverted: false,
    }));
    tx.events_mut().append(guard_id, MODULE_OPEN_UNDO, 0);
    Ok(new_fd)
}

pub fn pipe_tx(tx: &mut Transaction) -> Result<(RawFd, RawFd), Error> {
    use std::os::fd::IntoRawFd;
    let (read_end, write_end) = nix::unistd::pipe()?;
    let read_fd = read_end.into_raw_fd();
    let write_fd = write_end.into_raw_fd();
    for fd in [read_fd, write_fd] {
        if let Err(e) = adopt_fildes(tx, fd, 0, None) {
            let _ = nix::unistd::close(read_fd);
            let _ = nix::unistd::close(write_fd);
            return Err(e);
        }
    }
    Ok((read_fd, write_fd))
}

pub fn socket_tx(
    tx: &mut Transaction,
    domain: AddressFamily,
    ty: SockType,
    flags: SockFlag,
) -> Result<RawFd, Error> {
    use std::os::fd::IntoRawFd;
    let fildes = nix::sys::socket::socket(domain, ty, flags, None)?.into_raw_fd();
    if let Err(e) = adopt_fildes(tx, fildes, 0, None) {
        let _ = nix::unistd::close(fildes);
        return Err(e);
    }
    Ok(fildes)
}

/// `fcntl(F_SETFL, …)` and friends. In revocable (Ts/2PL) mode these force
/// an irrevocable retry (§4.5); under `NoUndo` (already irrevocable) they
/// run directly against the kernel.
pub fn fcntl_tx(tx: &mut Transaction, fildes: RawFd, arg: FcntlArg) -> Result<i32, Error> {
    if !tx.is_irrevocable() {
        return Err(tx.request_irrevocable());
    }
    nix::fcntl::fcntl(fildes, arg).map_err(Error::from)
}

/// `sync`/`fsync`: irrevocable-only, no undo possible (§4.5).
pub fn sync_tx(tx: &mut Transaction, fildes: Option<RawFd>) -> Result<(), Error> {
    if !tx.is_irrevocable() {
        return Err(tx.request_irrevocable());
    }
    match fildes {
        Some(fd) => nix::unistd::fsync(fd).map_err(Error::from),
        None => {
            nix::unistd::sync();
            Ok(())
        }
    }
}

/// `unlink`: irrevocable-only, since a removed path cannot be restored on
/// rollback without keeping a full copy of the file.
pub fn unlink_tx<P: AsRef<Path>>(tx: &mut Transaction, path: P) -> Result<(), Error> {
    if !tx.is_irrevocable() {
        return Err(tx.request_irrevocable());
    }
    nix::unistd::unlink(path.as_ref()).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TxConfig;
    use crate::shadow::file_tx::CcMode;
    use crate::tx::begin;

    fn scratch_path(label: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "systx-posix-test-{}-{}-{:?}",
            std::process::id(),
            label,
            std::thread::current().id()
        ))
    }

    #[test]
    fn open_write_close_then_pread_outside_the_transaction() {
        let path = scratch_path("roundtrip");
        let config = TxConfig::default();
        let p = path.clone();

        begin(CcMode::Twopl, &config, move |tx| {
            let fd = open_tx(
                tx,
                &p,
                OFlag::O_CREAT | OFlag::O_RDWR | OFlag::O_TRUNC,
                Mode::S_IRUSR | Mode::S_IWUSR,
            )?;
            pwrite_tx(tx, fd, b"hello", 0)?;
            close_tx(tx, fd)
        })
        .expect("commit");

        let contents = std::fs::read(&path).expect("read back");
        assert_eq!(contents, b"hello");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn write_tx_advances_the_shared_offset() {
        let path = scratch_path("offset");
        let config = TxConfig::default();
        let p = path.clone();

        begin(CcMode::Twopl, &config, move |tx| {
            let fd = open_tx(
                tx,
                &p,
                OFlag::O_CREAT | OFlag::O_RDWR | OFlag::O_TRUNC,
                Mode::S_IRUSR | Mode::S_IWUSR,
            )?;
            write_tx(tx, fd, b"abc")?;
            write_tx(tx, fd, b"def")?;
            close_tx(tx, fd)
        })
        .expect("commit");

        let contents = std::fs::read(&path).expect("read back");
        assert_eq!(contents, b"abcdef");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn mkstemp_rollback_removes_the_created_file() {
        let mut template = scratch_path("mkstemp");
        template.set_file_name(format!(
            "{}XXXXXX",
            template.file_name().unwrap().to_string_lossy()
        ));
        let config = TxConfig::default();
        let created: std::cell::RefCell<Option<std::path::PathBuf>> = std::cell::RefCell::new(None);

        let result: Result<(), Error> = begin(CcMode::Twopl, &config, |tx| {
            let (fd, path) = mkstemp_tx(tx, &template)?;
            *created.borrow_mut() = Some(path);
            pwrite_tx(tx, fd, b"0123456789", 0)?;
            Err(Error::irrecoverable("deliberate abort"))
        });

        assert!(result.is_err());
        let path = created.borrow().clone().expect("mkstemp ran");
        assert!(!path.exists());
    }

    #[test]
    fn fcntl_requires_irrevocable_and_then_succeeds_on_restart() {
        let path = scratch_path("fcntl");
        let config = TxConfig::default();
        let p = path.clone();

        let result = begin(CcMode::Twopl, &config, move |tx| {
            let fd = open_tx(
                tx,
                &p,
                OFlag::O_CREAT | OFlag::O_RDWR | OFlag::O_TRUNC,
                Mode::S_IRUSR | Mode::S_IWUSR,
            )?;
            fcntl_tx(tx, fd, FcntlArg::F_SETFL(OFlag::O_NONBLOCK))?;
            close_tx(tx, fd)
        });

        assert!(result.is_ok());
        let _ = std::fs::remove_file(&path);
    }
}
