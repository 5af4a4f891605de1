#![warn(missing_docs)]

//! `systx`, a user-space system-call transaction manager: smoke-test
//! binary. The real surface is the library; this binary only sets up
//! logging and runs one example transaction end to end.

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use tracing::{event, Level};

use systx::wrappers::posix::{close_tx, open_tx, pwrite_tx};
use systx::{begin, CcMode, TxConfig};

#[tracing::instrument]
fn main() {
    let subscriber = tracing_subscriber::fmt()
        .with_file(true)
        .with_line_number(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting the global subscriber here should be the first attempt to do so, and therefore be successful.");

    if !cfg!(target_os = "linux") {
        panic!("At this time, linux is the only OS supported by systx.");
    }

    event!(Level::INFO, "systx started.");

    let config = TxConfig::default();
    let path = std::env::temp_dir().join(format!("systx-smoke-{}", std::process::id()));
    let path_for_tx = path.clone();

    let result = begin(CcMode::Twopl, &config, move |tx| {
        let fildes = open_tx(
            tx,
            &path_for_tx,
            OFlag::O_CREAT | OFlag::O_RDWR | OFlag::O_TRUNC,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )?;
        pwrite_tx(tx, fildes, b"hello from systx", 0)?;
        close_tx(tx, fildes)?;
        Ok(())
    });

    match result {
        Ok(()) => event!(Level::INFO, "smoke transaction committed."),
        Err(e) => event!(Level::ERROR, error = ?e, "smoke transaction failed."),
    }

    let _ = std::fs::remove_file(&path);
}
