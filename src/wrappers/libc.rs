//! String/libc wrappers. These operate purely on transaction-owned
//! buffers and have no kernel-visible side effect to roll back, so they
//! need no shadow state or event log entries — they only need to be
//! callable with a `&mut Transaction` in scope, for API consistency with
//! every other wrapper in this module (§1: "thin translations over the
//! core").

use crate::error::Error;
use crate::tx::Transaction;

pub fn strlen_tx(_tx: &Transaction, s: &[u8]) -> usize {
    s.iter().position(|&b| b == 0).unwrap_or(s.len())
}

pub fn memcpy_tx(_tx: &Transaction, dst: &mut [u8], src: &[u8]) -> Result<(), Error> {
    if dst.len() < src.len() {
        return Err(Error::recoverable_errno(nix::libc::EINVAL));
    }
    dst[..src.len()].copy_from_slice(src);
    Ok(())
}
