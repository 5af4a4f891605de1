//! Current-working-directory wrapper. `chdir` affects process-global
//! state the kernel has no per-thread undo for, so it is irrevocable-only,
//! the same policy as `sync_tx`/`unlink_tx`.

use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::tx::Transaction;

pub fn getcwd_tx(_tx: &Transaction) -> Result<PathBuf, Error> {
    std::env::current_dir().map_err(Error::from)
}

pub fn chdir_tx<P: AsRef<Path>>(tx: &mut Transaction, path: P) -> Result<(), Error> {
    if !tx.is_irrevocable() {
        return Err(tx.request_irrevocable());
    }
    nix::unistd::chdir(path.as_ref()).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TxConfig;
    use crate::shadow::file_tx::CcMode;

    #[test]
    fn getcwd_matches_the_process_working_directory() {
        let config = TxConfig::default();
        let got = crate::tx::begin(CcMode::Twopl, &config, |tx| getcwd_tx(tx)).expect("commit");
        assert_eq!(got, std::env::current_dir().expect("current_dir"));
    }
}
