//! `errno` access. Reading the thread-local errno set by a just-failed
//! wrapper needs no transactional semantics of its own — by the time a
//! caller reads it, the syscall whose failure set it has already been
//! translated into an [`Error`] by the wrapper that ran it.

use crate::error::{Error, RecoverableKind};

/// The numeric errno equivalent carried by a [`Error::Recoverable`], or
/// `None` for any other error kind.
pub fn errno_of(error: &Error) -> Option<i32> {
    match error {
        Error::Recoverable {
            kind: RecoverableKind::Errno(e),
            ..
        } => Some(*e),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_the_errno_from_a_recoverable_error() {
        let err = Error::recoverable_errno(nix::libc::ENOENT);
        assert_eq!(errno_of(&err), Some(nix::libc::ENOENT));
    }

    #[test]
    fn non_recoverable_errors_have_no_errno() {
        assert_eq!(errno_of(&Error::Conflicting(None)), None);
        assert_eq!(errno_of(&Error::Revocable), None);
        assert_eq!(errno_of(&Error::irrecoverable("boom")), None);
    }
}
