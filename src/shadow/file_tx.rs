//! `FileTx` (§3 component F): the per-transaction shadow of a file's
//! content. The `Regfile` variant carries the write-log, read-log,
//! range-lock cookies and concurrency-control mode described in §4.5;
//! the other kinds are simple passthroughs since they have no
//! record-addressable content to shadow.

use std::os::unix::io::RawFd;

use tracing::{event, Level};

use crate::error::Error;
use crate::event::Event;
use crate::file::Regfile;
use crate::lock::owner::OwnerIndex;
use crate::module::Module;

/// Concurrency-control mode a file operates in, chosen at first access
/// within a transaction (§4.5).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CcMode {
    /// Transaction is irrevocable: call the kernel directly, no log.
    NoUndo,
    /// Optimistic: record versions on read, validate and replay at commit.
    Ts,
    /// Pessimistic: take record locks on read/write, replay buffered
    /// writes at commit.
    Twopl,
}

struct WriteLogEntry {
    file_off: u64,
    buf_off: usize,
    len: usize,
}

/// One outstanding read observed during `exec`, remembered so Ts-mode
/// validation can detect that a record changed between read and commit.
struct ReadLogEntry {
    record: u64,
    version_at_read: u64,
}

pub const MODULE_WRITE: u16 = 1;

pub struct RegfileTx {
    pub fildes: RawFd,
    pub file_index: usize,
    owner: OwnerIndex,
    pub cc_mode: CcMode,
    write_log: Vec<WriteLogEntry>,
    write_buf: Vec<u8>,
    read_log: Vec<ReadLogEntry>,
    /// Records currently read/write-locked by this transaction in 2PL
    /// mode (the "rwcountermap" cookie set — memoised so repeated access
    /// to the same record is O(1) instead of re-deriving radix indices).
    held_records: Vec<u64>,
    written_records: Vec<u64>,
    applied: bool,
}

impl RegfileTx {
    pub fn new(fildes: RawFd, file_index: usize, owner: OwnerIndex, cc_mode: CcMode) -> Self {
        RegfileTx {
            fildes,
            file_index,
            owner,
            cc_mode,
            write_log: Vec::new(),
            write_buf: Vec::new(),
            read_log: Vec::new(),
            held_records: Vec::new(),
            written_records: Vec::new(),
            applied: false,
        }
    }

    fn with_regfile<R>(&self, f: impl FnOnce(&Regfile) -> R) -> R {
        crate::file::global()
            .regfiles
            .with_resource(self.file_index, f)
    }

    fn merge_write_log(&self, off: u64, buf: &mut [u8]) {
        let end = off + buf.len() as u64;
        for entry in &self.write_log {
            let entry_end = entry.file_off + entry.len as u64;
            let lo = off.max(entry.file_off);
            let hi = end.min(entry_end);
            if lo >= hi {
                continue;
            }
            let dst_start = (lo - off) as usize;
            let src_start = entry.buf_off + (lo - entry.file_off) as usize;
            let n = (hi - lo) as usize;
            buf[dst_start..dst_start + n]
                .copy_from_slice(&self.write_buf[src_start..src_start + n]);
        }
    }

    /// `pread` semantics, merging any buffered-but-uncommitted writes so
    /// the transaction observes its own writes (§8 read-your-writes law).
    pub fn pread(&mut self, buf: &mut [u8], off: u64) -> Result<usize, Error> {
        match self.cc_mode {
            CcMode::NoUndo => {
                let n = nix::sys::uio::pread(self.fildes, buf, off as i64).map_err(Error::from)?;
                Ok(n)
            }
            CcMode::Ts => {
                self.remember_reads(off, buf.len() as u64);
                let n = nix::sys::uio::pread(self.fildes, buf, off as i64).map_err(Error::from)?;
                self.merge_write_log(off, &mut buf[..n]);
                Ok(n)
            }
            CcMode::Twopl => {
                self.lock_records_read(off, buf.len() as u64)?;
                let n = nix::sys::uio::pread(self.fildes, buf, off as i64).map_err(Error::from)?;
                self.merge_write_log(off, &mut buf[..n]);
                Ok(n)
            }
        }
    }

    /// `pwrite` semantics: in undo-capable modes, buffers the bytes and
    /// logs the region instead of touching the kernel file until apply.
    pub fn pwrite(&mut self, buf: &[u8], off: u64) -> Result<usize, Error> {
        match self.cc_mode {
            CcMode::NoUndo => {
                let n = nix::sys::uio::pwrite(self.fildes, buf, off as i64).map_err(Error::from)?;
                Ok(n)
            }
            CcMode::Ts => {
                self.buffer_write(buf, off);
                Ok(buf.len())
            }
            CcMode::Twopl => {
                self.lock_records_write(off, buf.len() as u64)?;
                self.buffer_write(buf, off);
                Ok(buf.len())
            }
        }
    }

    fn buffer_write(&mut self, buf: &[u8], off: u64) {
        let buf_off = self.write_buf.len();
        self.write_buf.extend_from_slice(buf);
        self.write_log.push(WriteLogEntry {
            file_off: off,
            buf_off,
            len: buf.len(),
        });
        for record in self.with_regfile(|r| r.rangelockmap.records_for(off, buf.len() as u64)) {
            if !self.written_records.contains(&record) {
                self.written_records.push(record);
            }
        }
    }

    fn remember_reads(&mut self, off: u64, len: u64) {
        let records = self.with_regfile(|r| r.rangelockmap.records_for(off, len));
        for record in records {
            if self.read_log.iter().any(|e| e.record == record) {
                continue;
            }
            let version = self.with_regfile(|r| r.record_version(record));
            self.read_log.push(ReadLogEntry {
                record,
                version_at_read: version,
            });
        }
    }

    /// Records in `[off, off+len)` this transaction doesn't already hold,
    /// in ascending order — the subset that still needs acquiring.
    fn unheld_records(&self, off: u64, len: u64) -> Vec<u64> {
        self.with_regfile(|r| r.rangelockmap.records_for(off, len))
            .into_iter()
            .filter(|record| !self.held_records.contains(record))
            .collect()
    }

    fn lock_records_read(&mut self, off: u64, len: u64) -> Result<(), Error> {
        let owner = self.owner;
        let to_lock = self.unheld_records(off, len);
        // `try_rdlock_records` rolls back whatever it itself took if a
        // later record in `to_lock` conflicts; records already held from
        // an earlier call are excluded so that rollback can never drop a
        // lock this transaction still needs.
        let newly = self.with_regfile(|r| r.rangelockmap.try_rdlock_records(owner, &to_lock))?;
        self.held_records.extend(newly);
        Ok(())
    }

    fn lock_records_write(&mut self, off: u64, len: u64) -> Result<(), Error> {
        let owner = self.owner;
        let records = self.with_regfile(|r| r.rangelockmap.records_for(off, len));
        let (already_held, to_lock): (Vec<u64>, Vec<u64>) = records
            .into_iter()
            .partition(|record| self.held_records.contains(record));
        // Upgrades already-held records first (sole-reader-to-writer
        // upgrade, §4.1) — these are this owner's own locks, so they
        // never block and are outside the rollback-tracked batch below.
        self.with_regfile(|r| {
            for &record in &already_held {
                r.rangelockmap.try_wrlock_record(owner, record)?;
            }
            Ok::<_, Error>(())
        })?;
        let newly = self.with_regfile(|r| r.rangelockmap.try_wrlock_records(owner, &to_lock))?;
        self.held_records.extend(newly);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.cc_mode != CcMode::Ts {
            return Ok(());
        }
        self.with_regfile(|r| {
            for entry in &self.read_log {
                if r.record_version(entry.record) != entry.version_at_read {
                    return Err(Error::Conflicting(None));
                }
            }
            Ok(())
        })
    }

    pub fn apply_writes(&mut self) -> Result<(), Error> {
        if self.applied || matches!(self.cc_mode, CcMode::NoUndo) {
            return Ok(());
        }
        self.applied = true;
        for entry in &self.write_log {
            let buf = &self.write_buf[entry.buf_off..entry.buf_off + entry.len];
            nix::sys::uio::pwrite(self.fildes, buf, entry.file_off as i64).map_err(Error::from)?;
        }
        self.with_regfile(|r| {
            for &record in &self.written_records {
                r.bump_record_version(record);
            }
        });
        event!(
            Level::TRACE,
            fildes = self.fildes,
            writes = self.write_log.len(),
            "applied buffered writes"
        );
        Ok(())
    }

    pub fn release_locks(&mut self) {
        if self.held_records.is_empty() {
            return;
        }
        let owner = self.owner;
        let records = std::mem::take(&mut self.held_records);
        self.with_regfile(|r| r.rangelockmap.unlock_all(owner, &records));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;

    fn owner(i: u32) -> OwnerIndex {
        OwnerIndex(i)
    }

    /// Registers a fresh regfile slot for `fildes` in the process-wide
    /// table so `with_regfile` callbacks resolve to a real entry.
    fn regfile_tx(fildes: RawFd, cc_mode: CcMode) -> RegfileTx {
        let id = crate::ident::FileId::of_fd(fildes).expect("fstat");
        let index = crate::file::global()
            .regfiles
            .ref_by_id(id, || Ok(crate::file::Regfile::new(16)))
            .expect("register regfile slot");
        RegfileTx::new(fildes, index, owner(0), cc_mode)
    }

    fn tx(fildes: RawFd, cc_mode: CcMode) -> RegfileTx {
        RegfileTx::new(fildes, usize::MAX, owner(0), cc_mode)
    }

    #[test]
    fn merge_write_log_overlays_buffered_bytes_onto_kernel_read() {
        let mut t = tx(-1, CcMode::Ts);
        t.buffer_write(b"XYZ", 10);

        let mut buf = *b"0123456789_________";
        t.merge_write_log(5, &mut buf);
        assert_eq!(&buf[..5], b"01234");
        assert_eq!(&buf[5..8], b"XYZ");
    }

    #[test]
    fn merge_write_log_prefers_later_overlapping_write() {
        let mut t = tx(-1, CcMode::Ts);
        t.buffer_write(b"AAAA", 0);
        t.buffer_write(b"BB", 1);

        let mut buf = [0u8; 4];
        t.merge_write_log(0, &mut buf);
        assert_eq!(&buf, b"ABBA");
    }

    #[test]
    fn noundo_mode_never_buffers_writes() {
        let file = tempfile::tempfile().expect("tempfile");
        let fildes = file.as_raw_fd();
        let mut t = regfile_tx(fildes, CcMode::NoUndo);
        let n = t.pwrite(b"hi", 0).expect("pwrite");
        assert_eq!(n, 2);
        let mut readback = [0u8; 2];
        let got = nix::sys::uio::pread(fildes, &mut readback, 0).expect("pread");
        assert_eq!(got, 2);
        assert_eq!(&readback, b"hi");
    }

    #[test]
    fn ts_mode_buffers_writes_until_apply() {
        let file = tempfile::tempfile().expect("tempfile");
        let fildes = file.as_raw_fd();
        nix::unistd::ftruncate(fildes, 2).expect("grow file so pre-apply bytes are real zeros");
        let mut t = regfile_tx(fildes, CcMode::Ts);
        t.pwrite(b"hi", 0).expect("pwrite");

        let mut readback = [0xffu8; 2];
        let got = nix::sys::uio::pread(fildes, &mut readback, 0).expect("pread before apply");
        assert_eq!(&readback[..got], b"\0\0");

        t.apply_writes().expect("apply");
        let got = nix::sys::uio::pread(fildes, &mut readback, 0).expect("pread after apply");
        assert_eq!(&readback[..got], b"hi");
    }

    #[test]
    fn apply_writes_is_idempotent() {
        let file = tempfile::tempfile().expect("tempfile");
        let fildes = file.as_raw_fd();
        let mut t = regfile_tx(fildes, CcMode::Twopl);
        t.pwrite(b"x", 0).expect("pwrite");
        t.apply_writes().expect("first apply");
        // A second call must not re-`pwrite` or double-bump record
        // versions; absence of a panic/error here is the assertion.
        t.apply_writes().expect("second apply is a no-op");
    }

    #[test]
    fn read_your_own_buffered_write_in_ts_mode() {
        let file = tempfile::tempfile().expect("tempfile");
        let fildes = file.as_raw_fd();
        let mut t = regfile_tx(fildes, CcMode::Ts);
        t.pwrite(b"abc", 0).expect("pwrite");

        let mut buf = [0u8; 3];
        let n = t.pread(&mut buf, 0).expect("pread");
        assert_eq!(n, 3);
        assert_eq!(&buf, b"abc");
    }
}

pub struct RegfileTxModule {
    pub shared: std::rc::Rc<std::cell::RefCell<RegfileTx>>,
}

impl Module for RegfileTxModule {
    fn validate(&mut self, _is_retry: bool) -> Result<(), Error> {
        self.shared.borrow().validate()
    }

    fn apply_event(&mut self, event: &Event) -> Result<(), Error> {
        if event.head == MODULE_WRITE {
            self.shared.borrow_mut().apply_writes()?;
        }
        Ok(())
    }

    fn undo_event(&mut self, _event: &Event) -> Result<(), Error> {
        // Writes are buffered, never sent to the kernel during `exec` in
        // Ts/2PL mode, so there is nothing to reverse.
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        let mut shadow = self.shared.borrow_mut();
        shadow.release_locks();
        crate::file::global().regfiles.unref(shadow.file_index, |_| {});
        Ok(())
    }
}
