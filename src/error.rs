//! The error model shared by every module in the transaction engine.
//!
//! Shaped after the teacher crate's `IOError`/`LuxorError` split: a
//! `thiserror` enum carrying `#[source]` chains, with a hand-written
//! [`Debug`] impl that walks the full cause chain instead of just the
//! outermost message.

use std::error::Error as StdError;
use std::fmt::{Debug, Formatter};

use crate::lock::owner::OwnerIndex;

/// A lock identifier returned alongside [`Error::Conflicting`], identifying
/// which lock the caller failed to acquire. Opaque outside this crate.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct LockId(pub(crate) u64);

impl LockId {
    pub(crate) fn new(owner: OwnerIndex, field: u32) -> Self {
        LockId(((owner.0 as u64) << 32) | field as u64)
    }
}

/// The numeric errno-equivalent carried by [`Error::Recoverable`].
pub type ErrnoLike = i32;

#[derive(thiserror::Error)]
pub enum Error {
    /// Two transactions' lock requirements could not be satisfied together.
    /// The driver retries automatically; this variant never escapes `begin`.
    #[error("lock conflict")]
    Conflicting(Option<LockId>),

    /// The requested operation cannot be completed without irrevocable
    /// execution. The driver restarts the transaction in irrevocable mode.
    #[error("operation requires irrevocable execution")]
    Revocable,

    /// A kernel-visible error the user's recovery handler may inspect and
    /// act on (commit anyway, abort, or retry).
    #[error("recoverable error: {kind}")]
    Recoverable {
        kind: RecoverableKind,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Rollback itself failed, or apply failed after partial application.
    /// There is no safe way to continue; the driver aborts the process.
    #[error("irrecoverable error: {0}")]
    Irrecoverable(String),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum RecoverableKind {
    #[error("errno {0}")]
    Errno(ErrnoLike),
    #[error("allocation failure")]
    AllocationFailure,
    #[error("invalid environment")]
    InvalidEnv,
}

impl Error {
    pub fn recoverable_errno(errno: ErrnoLike) -> Self {
        Error::Recoverable {
            kind: RecoverableKind::Errno(errno),
            source: None,
        }
    }

    pub fn irrecoverable(detail: impl Into<String>) -> Self {
        Error::Irrecoverable(detail.into())
    }

    /// Whether this error is automatically handled by the driver's retry
    /// loop (i.e. invisible to the transaction body's author).
    pub fn is_driver_handled(&self) -> bool {
        matches!(self, Error::Conflicting(_) | Error::Revocable)
    }
}

impl From<nix::errno::Errno> for Error {
    fn from(value: nix::errno::Errno) -> Self {
        Error::Recoverable {
            kind: RecoverableKind::Errno(value as i32),
            source: Some(std::io::Error::from(value)),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        let errno = value.raw_os_error().unwrap_or(0);
        Error::Recoverable {
            kind: RecoverableKind::Errno(errno),
            source: Some(value),
        }
    }
}

fn error_chain_fmt(error: &impl StdError, fmt: &mut Formatter<'_>) -> std::fmt::Result {
    writeln!(fmt, "{}\n", error)?;
    let mut current = error.source();
    while let Some(cause) = current {
        writeln!(fmt, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }
    Ok(())
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
