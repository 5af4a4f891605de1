//! Global, refcounted file-kind resources (§3, §4.4 component D) and the
//! open-file-description table. Each kind is a specialisation of
//! [`crate::table::slot::ScanTable`]; this module also owns the
//! process-wide singletons, lazily constructed the way the teacher's
//! `SERIALS` global is.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

use crate::config::TxConfig;
use crate::ident::{FileId, OfdId};
use crate::lock::rangemap::RangeLockMap;
use crate::lock::rwlock::OwnerRwLock;
use crate::table::fdtab::FdTable;
use crate::table::slot::ScanTable;

/// Which POSIX file type a [`crate::ident::FileId`] resolves to. Dispatch
/// on this tag (rather than a vtable of raw function pointers) per
/// Design Notes §9.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum FileKind {
    Regfile,
    Dir,
    Fifo,
    Chrdev,
    Socket,
}

/// Per-field RW-locks shared by every file kind. Regular files add a
/// range-lock map on top for record-level concurrency.
pub struct FileFieldLocks {
    pub size: OwnerRwLock,
    pub mode: OwnerRwLock,
    pub state: OwnerRwLock,
}

impl Default for FileFieldLocks {
    fn default() -> Self {
        FileFieldLocks {
            size: OwnerRwLock::new(0),
            mode: OwnerRwLock::new(1),
            state: OwnerRwLock::new(2),
        }
    }
}

pub struct Regfile {
    pub fields: FileFieldLocks,
    pub rangelockmap: RangeLockMap,
    /// Per-record version numbers, bumped on every committed write to
    /// that record. Consulted by Ts-mode validation (§4.5).
    pub versions: Mutex<HashMap<u64, u64>>,
}

impl Regfile {
    pub(crate) fn new(recbits: u32) -> Self {
        Regfile {
            fields: FileFieldLocks::default(),
            rangelockmap: RangeLockMap::new(recbits),
            versions: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_version(&self, record: u64) -> u64 {
        *self.versions.lock().unwrap().get(&record).unwrap_or(&0)
    }

    pub fn bump_record_version(&self, record: u64) {
        *self.versions.lock().unwrap().entry(record).or_insert(0) += 1;
    }
}

#[derive(Default)]
pub struct Dir {
    pub fields: FileFieldLocks,
}

#[derive(Default)]
pub struct Fifo {
    pub fields: FileFieldLocks,
}

#[derive(Default)]
pub struct Chrdev {
    pub fields: FileFieldLocks,
}

#[derive(Default)]
pub struct Socket {
    pub fields: FileFieldLocks,
}

/// Per-OFD field locks: the file offset and the file-status flags
/// (`O_APPEND`, `O_NONBLOCK`, ...) set by `fcntl(F_SETFL)`.
pub struct OfdFieldLocks {
    pub file_offset: OwnerRwLock,
    pub file_mode: OwnerRwLock,
}

impl Default for OfdFieldLocks {
    fn default() -> Self {
        OfdFieldLocks {
            file_offset: OwnerRwLock::new(0),
            file_mode: OwnerRwLock::new(1),
        }
    }
}

pub struct Ofd {
    pub fields: OfdFieldLocks,
    pub kind: FileKind,
    /// Index into the file table of `kind` this OFD refers to.
    pub file_index: usize,
}

pub struct FileTables {
    pub regfiles: ScanTable<FileId, Regfile>,
    pub dirs: ScanTable<FileId, Dir>,
    pub fifos: ScanTable<FileId, Fifo>,
    pub chrdevs: ScanTable<FileId, Chrdev>,
    pub sockets: ScanTable<FileId, Socket>,
    pub ofds: ScanTable<OfdId, Ofd>,
    pub fds: FdTable,
}

impl FileTables {
    fn new(config: &TxConfig) -> Self {
        FileTables {
            regfiles: ScanTable::new(config.table_capacity),
            dirs: ScanTable::new(config.table_capacity),
            fifos: ScanTable::new(config.table_capacity),
            chrdevs: ScanTable::new(config.table_capacity),
            sockets: ScanTable::new(config.table_capacity),
            ofds: ScanTable::new(config.table_capacity),
            fds: FdTable::new(config.fd_capacity.min(64), config.fd_capacity),
        }
    }
}

static GLOBAL_TABLES: LazyLock<FileTables> = LazyLock::new(|| FileTables::new(&crate::config::active()));

pub fn global() -> &'static FileTables {
    &GLOBAL_TABLES
}
