//! Small standalone harness exercising a handful of the concurrency
//! scenarios from the crate's testable-properties list. Not part of the
//! library's public contract; prints one pass/fail line per scenario.

use std::sync::Arc;

use nix::fcntl::{FcntlArg, OFlag};
use nix::sys::stat::Mode;

use systx::wrappers::posix::{close_tx, fcntl_tx, mkstemp_tx, open_tx, pwrite_tx, pread_tx, write_tx};
use systx::{begin, CcMode, TxConfig};

/// A directory under the system temp root, unique to this process and
/// scenario, removed on drop.
struct ScratchDir(std::path::PathBuf);

impl ScratchDir {
    fn new(label: &str) -> Self {
        let path = std::env::temp_dir().join(format!("systx-txbench-{}-{}", std::process::id(), label));
        std::fs::create_dir_all(&path).expect("create scratch dir");
        ScratchDir(path)
    }

    fn path(&self) -> &std::path::Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn scenario_append_contention() -> bool {
    let dir = ScratchDir::new("append");
    let path = Arc::new(dir.path().join("append.txt"));
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
        if h.join().expect("thread").is_err() {
            return false;
        }
    }

    let contents = std::fs::read(path.as_path()).expect("read back");
    contents.len() == 26 && contents == b"Hello world!\nHello world!\n"
}

fn scenario_mkstemp_rollback() -> bool {
    let dir = ScratchDir::new("mkstemp");
    let template = dir.path().join("fooXXXXXX");
    let config = TxConfig::default();
    let created_path = std::cell::RefCell::new(None);

    let result: Result<(), systx::Error> = begin(CcMode::Twopl, &config, |tx| {
        let (fd, path) = mkstemp_tx(tx, template.as_path())?;
        *created_path.borrow_mut() = Some(path.clone());
        pwrite_tx(tx, fd, b"0123456789", 0)?;
        Err(systx::Error::irrecoverable("deliberate abort".to_string()))
    });

    result.is_err()
        && created_path
            .borrow()
            .as_ref()
            .map(|p| !p.exists())
            .unwrap_or(false)
}

fn scenario_irrevocable_upgrade() -> bool {
    let dir = ScratchDir::new("irrevocable");
    let path = dir.path().join("flag.txt");
    let config = TxConfig::default();

    let result = begin(CcMode::Twopl, &config, move |tx| {
        let fd = open_tx(
            tx,
            path.as_path(),
            OFlag::O_CREAT | OFlag::O_RDWR | OFlag::O_TRUNC,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )?;
        fcntl_tx(tx, fd, FcntlArg::F_SETFL(OFlag::O_NONBLOCK))?;
        close_tx(tx, fd)
    });

    result.is_ok()
}

fn scenario_read_your_writes() -> bool {
    let dir = ScratchDir::new("ryw");
    let path = dir.path().join("rw.txt");
    let config = TxConfig::default();

    begin(CcMode::Ts, &config, move |tx| {
        let fd = open_tx(
            tx,
            path.as_path(),
            OFlag::O_CREAT | OFlag::O_RDWR | OFlag::O_TRUNC,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )?;
        pwrite_tx(tx, fd, b"abc", 0)?;
        let mut buf = [0u8; 3];
        pread_tx(tx, fd, &mut buf, 0)?;
        close_tx(tx, fd)?;
        if &buf == b"abc" {
            Ok(())
        } else {
            Err(systx::Error::irrecoverable("read-your-writes failed".to_string()))
        }
    })
    .is_ok()
}

fn main() {
    let scenarios: [(&str, fn() -> bool); 4] = [
        ("append contention", scenario_append_contention),
        ("mkstemp rollback", scenario_mkstemp_rollback),
        ("irrevocability upgrade", scenario_irrevocable_upgrade),
        ("read-your-writes (ts)", scenario_read_your_writes),
    ];

    let mut failures = 0;
    for (name, scenario) in scenarios {
        let ok = scenario();
        println!("[{}] {}", if ok { "PASS" } else { "FAIL" }, name);
        if !ok {
            failures += 1;
        }
    }

    if failures > 0 {
        std::process::exit(1);
    }
}
