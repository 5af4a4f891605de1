//! File and open-file-description identity (§3).

use std::os::unix::io::RawFd;
use std::path::Path;

use crate::error::Error;

/// `(device, inode)` identity for regular files, directories, fifos and
/// character devices. Sockets extend this with the owning file descriptor
/// since they are not otherwise comparable across fds.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct FileId {
    pub dev: u64,
    pub ino: u64,
}

impl FileId {
    pub const fn cleared() -> Self {
        FileId { dev: 0, ino: 0 }
    }

    pub fn is_cleared(&self) -> bool {
        *self == Self::cleared()
    }

    pub fn of_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let meta = std::fs::metadata(path.as_ref())?;
        Ok(Self::of_metadata(&meta))
    }

    pub fn of_fd(fd: RawFd) -> Result<Self, Error> {
        use std::os::unix::fs::MetadataExt;
        let stat = nix::sys::stat::fstat(fd)?;
        Ok(FileId {
            dev: stat.st_dev as u64,
            ino: stat.st_ino as u64,
        })
    }

    #[cfg(unix)]
    fn of_metadata(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        FileId {
            dev: meta.dev(),
            ino: meta.ino(),
        }
    }
}

/// Socket identity additionally carries the owning fd: unrelated sockets
/// may share no kernel identity comparable across processes, but within
/// this process the fd disambiguates.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct SocketId {
    pub fildes: RawFd,
}

/// Open-file-description identity. Reduced to `(FileId, fildes)` unless
/// the platform exposes a real OFD identifier (Linux `F_OFD_*`/`kcmp`);
/// see SPEC_FULL.md §3/§9 for the portability decision.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct OfdId {
    pub file: FileId,
    pub fildes: RawFd,
}

impl OfdId {
    pub fn new(file: FileId, fildes: RawFd) -> Self {
        OfdId { file, fildes }
    }
}
