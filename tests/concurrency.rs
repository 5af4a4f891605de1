//! Multi-threaded integration tests exercising the concrete scenarios from
//! the testable-properties list: concurrent read/write under 2PL, append
//! contention, mid-transaction close racing a read, and read-your-writes
//! under Ts mode. Scaled down from the full thread/iteration counts in the
//! properties list to keep the suite fast while still exercising real
//! contention.

use std::sync::Arc;

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;

use systx::wrappers::posix::{close_tx, open_tx, pread_tx, pwrite_tx, read_tx, write_tx};
use systx::{begin, CcMode, Error, TxConfig};

fn scratch_path(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "systx-it-{}-{}-{}",
        std::process::id(),
        label,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .subsec_nanos()
    ))
}

#[test]
fn concurrent_record_writes_under_2pl_never_tear() {
    const RECORD_LEN: usize = 24;
    const THREADS: usize = 8;
    const ROUNDS: usize = 50;

    let path = Arc::new(scratch_path("2pl-records"));
    {
        let config = TxConfig::default();
        let p = Arc::clone(&path);
        begin(CcMode::Twopl, &config, move |tx| {
            let fd = open_tx(
                tx,
                p.as_path(),
                OFlag::O_CREAT | OFlag::O_RDWR | OFlag::O_TRUNC,
                Mode::S_IRUSR | Mode::S_IWUSR,
            )?;
            pwrite_tx(tx, fd, &[0u8; RECORD_LEN], 0)?;
            close_tx(tx, fd)
        })
        .expect("create and size the file");
    }

    let mut handles = Vec::new();
    for t in 0..THREADS {
        let p = Arc::clone(&path);
        handles.push(std::thread::spawn(move || {
            let config = TxConfig::default();
            for round in 0..ROUNDS {
                let marker = (t * ROUNDS + round) as u8;
                let p = p.clone();
                let result = begin(CcMode::Twopl, &config, move |tx| {
                    let fd = open_tx(tx, p.as_path(), OFlag::O_RDWR, Mode::empty())?;
                    let mut buf = [0u8; RECORD_LEN];
                    pread_tx(tx, fd, &mut buf, 0)?;
                    pwrite_tx(tx, fd, &[marker; RECORD_LEN], 0)?;
                    close_tx(tx, fd)
                });
                assert!(result.is_ok(), "transaction should always eventually commit");
            }
        }));
    }
    for h in handles {
        h.join().expect("writer thread panicked");
    }

    let contents = std::fs::read(path.as_path()).expect("read back");
    assert_eq!(contents.len(), RECORD_LEN);
    // Every byte in the record was written by the same committing
    // transaction (writes are never torn into half-old, half-new bytes).
    let first = contents[0];
    assert!(contents.iter().all(|&b| b == first));

    let _ = std::fs::remove_file(path.as_path());
}

#[test]
fn append_contention_leaves_exactly_one_ordering_of_both_writes() {
    let path = Arc::new(scratch_path("append"));
    {
        let config = TxConfig::default();
        let p = Arc::clone(&path);
        begin(CcMode::Twopl, &config, move |tx| {
            let fd = open_tx(
                tx,
                p.as_path(),
                OFlag::O_CREAT | OFlag::O_WRONLY | OFlag::O_TRUNC,
                Mode::S_IRUSR | Mode::S_IWUSR,
            )?;
            close_tx(tx, fd)
        })
        .expect("create");
    }

    let mut handles = Vec::new();
    for _ in 0..2 {
        let p = Arc::clone(&path);
        handles.push(std::thread::spawn(move || {
            let config = TxConfig::default();
            begin(CcMode::Twopl, &config, move |tx| {
                let fd = open_tx(tx, p.as_path(), OFlag::O_WRONLY | OFlag::O_APPEND, Mode::empty())?;
                write_tx(tx, fd, b"Hello world!\n")?;
                close_tx(tx, fd)
            })
        }));
    }
    for h in handles {
        h.join().expect("append thread panicked").expect("append commits");
    }

    let contents = std::fs::read(path.as_path()).expect("read back");
    assert_eq!(contents.len(), 26);
    assert!(
        contents == *b"Hello world!\nHello world!\n",
        "both appends landed, in either order of identical bytes"
    );

    let _ = std::fs::remove_file(path.as_path());
}

#[test]
fn a_transaction_can_read_an_fd_it_did_not_itself_open() {
    // A transaction may attach to an fd opened (and already committed) by
    // an earlier, unrelated transaction, not only one it created itself.
    let path = scratch_path("attach");
    let config = TxConfig::default();

    let fd = {
        let p = path.clone();
        begin(CcMode::Twopl, &config, move |tx| {
            let fd = open_tx(
                tx,
                &p,
                OFlag::O_CREAT | OFlag::O_RDWR | OFlag::O_TRUNC,
                Mode::S_IRUSR | Mode::S_IWUSR,
            )?;
            pwrite_tx(tx, fd, b"data", 0)?;
            Ok(fd)
        })
        .expect("create")
    };

    let got = begin(CcMode::Twopl, &config, |tx| {
        let mut buf = [0u8; 4];
        pread_tx(tx, fd, &mut buf, 0)?;
        Ok(buf)
    })
    .expect("a fresh transaction attaches to the still-open fd");
    assert_eq!(&got, b"data");

    begin(CcMode::Twopl, &config, |tx| close_tx(tx, fd)).expect("close commits");
    let _ = std::fs::remove_file(&path);
}

#[test]
fn mid_transaction_close_then_read_conflicts_or_fails_cleanly() {
    let path = scratch_path("close-race");
    let config = TxConfig::default();

    let fd = {
        let p = path.clone();
        begin(CcMode::Twopl, &config, move |tx| {
            let fd = open_tx(
                tx,
                &p,
                OFlag::O_CREAT | OFlag::O_RDWR | OFlag::O_TRUNC,
                Mode::S_IRUSR | Mode::S_IWUSR,
            )?;
            pwrite_tx(tx, fd, b"data", 0)?;
            Ok(fd)
        })
        .expect("create")
    };

    begin(CcMode::Twopl, &config, |tx| close_tx(tx, fd)).expect("close commits");

    let result: Result<usize, Error> = begin(CcMode::Twopl, &config, |tx| {
        let mut buf = [0u8; 4];
        read_tx(tx, fd, &mut buf)
    });

    // The fd is gone from the kernel's perspective; a fresh transaction
    // attaching to it must see the fd table's `Unused` entry and fail,
    // not silently succeed against a reopened descriptor of the same
    // number.
    assert!(result.is_err());

    let _ = std::fs::remove_file(&path);
}

#[test]
fn read_your_writes_holds_in_ts_mode_before_the_kernel_sees_it() {
    let path = scratch_path("ryw");
    let config = TxConfig::default();
    let p = path.clone();

    let observed = begin(CcMode::Ts, &config, move |tx| {
        let fd = open_tx(
            tx,
            &p,
            OFlag::O_CREAT | OFlag::O_RDWR | OFlag::O_TRUNC,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )?;
        pwrite_tx(tx, fd, b"abc", 0)?;
        let mut buf = [0u8; 3];
        pread_tx(tx, fd, &mut buf, 0)?;
        close_tx(tx, fd)?;
        Ok(buf)
    })
    .expect("commit");

    assert_eq!(&observed, b"abc");
    let contents = std::fs::read(&path).expect("read back after commit");
    assert_eq!(contents, b"abc");

    let _ = std::fs::remove_file(&path);
}
