//! The transaction driver (§4.5 state machine, §4.7): registers modules,
//! dispatches lock/validate/apply/undo/finish, and runs the retry loop
//! that stands in for the original's `setjmp`/`longjmp` re-entry (Design
//! Notes §9 — modelled here as a loop over a closure returning a
//! discriminated commit/restart result, never a non-local jump).

use std::cell::RefCell;
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::rc::Rc;

use tracing::{event, span, Level};

use crate::config::TxConfig;
use crate::error::Error;
use crate::event::EventLog;
use crate::fileops::FileTxHandle;
use crate::lock::owner::OwnerIndex;
use crate::module::{Module, ModuleRegistry};
use crate::shadow::fd_tx::{FdTx, FdTxModule};
use crate::shadow::file_tx::CcMode;
use crate::shadow::ofd_tx::{OfdTx, OfdTxModule};

/// The mode a transaction is entered or re-entered in, mirroring the
/// `Start | Restart | Retry | Irrevocable | Recovery` modes of §6.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TxMode {
    Start,
    Restart,
    Retry,
    Irrevocable,
    Recovery,
}

/// Current state in the §4.5 state machine.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TxState {
    Idle,
    Active,
    Committing,
    RollingBack,
    Finalising,
}

/// What a transaction body asked the driver to do once it returns.
enum Outcome<R> {
    Commit(R),
    Restart(TxMode),
}

/// Per-transaction control block: the module registry, event log, lock
/// owner, and the per-fd shadow cache that lets repeated access to the
/// same descriptor within one transaction reuse its materialised shadow
/// (§4.5 "the first time it touches a given (fd, ofd, file)").
pub struct Transaction {
    owner: OwnerIndex,
    state: TxState,
    mode: TxMode,
    modules: ModuleRegistry,
    events: EventLog,
    irrevocable: bool,
    cc_preference: CcMode,
    recbits: u32,
    fds: HashMap<RawFd, (Rc<RefCell<FdTx>>, u8)>,
    ofds: HashMap<usize, (Rc<RefCell<OfdTx>>, u8)>,
    files: HashMap<usize, (FileTxHandle, u8)>,
    alloc: Option<(Rc<RefCell<crate::wrappers::alloc::AllocTx>>, u8)>,
}

impl Transaction {
    fn new(owner: OwnerIndex, cc_preference: CcMode, recbits: u32) -> Self {
        Transaction {
            owner,
            state: TxState::Active,
            mode: TxMode::Start,
            modules: ModuleRegistry::new(),
            events: EventLog::new(),
            irrevocable: false,
            cc_preference,
            recbits,
            fds: HashMap::new(),
            ofds: HashMap::new(),
            files: HashMap::new(),
            alloc: None,
        }
    }

    pub fn owner(&self) -> OwnerIndex {
        self.owner
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn mode(&self) -> TxMode {
        self.mode
    }

    pub fn is_irrevocable(&self) -> bool {
        self.irrevocable
    }

    /// The concurrency-control mode new file shadows should be created
    /// in: `NoUndo` once the transaction has been promoted irrevocable,
    /// otherwise the mode requested at `begin`.
    pub fn cc_mode(&self) -> CcMode {
        if self.irrevocable {
            CcMode::NoUndo
        } else {
            self.cc_preference
        }
    }

    /// `RECBITS` this transaction's process was configured with — the
    /// same value the global regfile tables were sized from, per
    /// [`crate::config::ensure_active`].
    pub fn recbits(&self) -> u32 {
        self.recbits
    }

    /// Requests that this transaction be restarted in irrevocable mode.
    /// Returns the error the caller should propagate up to the `begin`
    /// loop, which recognises `Error::Revocable` and performs the upgrade.
    pub fn request_irrevocable(&self) -> Error {
        Error::Revocable
    }

    pub fn events_mut(&mut self) -> &mut EventLog {
        &mut self.events
    }

    pub fn register_module(&mut self, module: Box<dyn Module>) -> u8 {
        self.modules.register(module)
    }

    /// Materialises (or returns the cached) `FdTx` shadow for `fildes`,
    /// along with the module id it was registered under.
    pub fn fd_shadow(
        &mut self,
        fildes: RawFd,
        init: impl FnOnce() -> Result<FdTx, Error>,
    ) -> Result<(Rc<RefCell<FdTx>>, u8), Error> {
        if let Some(entry) = self.fds.get(&fildes) {
            return Ok(entry.clone());
        }
        let shadow = Rc::new(RefCell::new(init()?));
        let module_id = self.modules.register(Box::new(FdTxModule {
            shared: Rc::clone(&shadow),
        }));
        self.fds.insert(fildes, (Rc::clone(&shadow), module_id));
        Ok((shadow, module_id))
    }

    pub fn ofd_shadow(
        &mut self,
        ofd_index: usize,
        init: impl FnOnce() -> Result<OfdTx, Error>,
    ) -> Result<(Rc<RefCell<OfdTx>>, u8), Error> {
        if let Some(entry) = self.ofds.get(&ofd_index) {
            return Ok(entry.clone());
        }
        let shadow = Rc::new(RefCell::new(init()?));
        let module_id = self.modules.register(Box::new(OfdTxModule {
            shared: Rc::clone(&shadow),
        }));
        self.ofds.insert(ofd_index, (Rc::clone(&shadow), module_id));
        Ok((shadow, module_id))
    }

    pub fn file_shadow(
        &mut self,
        file_index: usize,
        init: impl FnOnce() -> Result<(FileTxHandle, Box<dyn Module>), Error>,
    ) -> Result<(FileTxHandle, u8), Error> {
        if let Some((handle, id)) = self.files.get(&file_index) {
            return Ok((clone_handle(handle), *id));
        }
        let (handle, module) = init()?;
        let module_id = self.modules.register(module);
        self.files.insert(file_index, (clone_handle(&handle), module_id));
        Ok((handle, module_id))
    }

    /// Returns this transaction's single [`crate::wrappers::alloc::AllocTx`]
    /// module, registering one on first use.
    pub fn alloc_shadow(&mut self) -> (Rc<RefCell<crate::wrappers::alloc::AllocTx>>, u8) {
        if let Some(entry) = &self.alloc {
            return entry.clone();
        }
        let shadow = Rc::new(RefCell::new(crate::wrappers::alloc::AllocTx::default()));
        let module_id = self.modules.register(Box::new(AllocModuleAdapter(Rc::clone(&shadow))));
        self.alloc = Some((Rc::clone(&shadow), module_id));
        (shadow, module_id)
    }

    fn reset(&mut self) {
        self.modules.clear();
        self.events.reset();
        self.fds.clear();
        self.ofds.clear();
        self.files.clear();
        self.alloc = None;
        self.state = TxState::Active;
    }
}

struct AllocModuleAdapter(Rc<RefCell<crate::wrappers::alloc::AllocTx>>);

impl Module for AllocModuleAdapter {
    fn apply_event(&mut self, event: &crate::event::Event) -> Result<(), Error> {
        self.0.borrow_mut().apply_event(event)
    }

    fn undo_event(&mut self, event: &crate::event::Event) -> Result<(), Error> {
        self.0.borrow_mut().undo_event(event)
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.0.borrow_mut().finish()
    }
}

fn clone_handle(handle: &FileTxHandle) -> FileTxHandle {
    match handle {
        FileTxHandle::Regfile(rc) => FileTxHandle::Regfile(Rc::clone(rc)),
        FileTxHandle::Dir(rc) => FileTxHandle::Dir(Rc::clone(rc)),
        FileTxHandle::Fifo(rc) => FileTxHandle::Fifo(Rc::clone(rc)),
        FileTxHandle::Chrdev(rc) => FileTxHandle::Chrdev(Rc::clone(rc)),
        FileTxHandle::Socket(rc) => FileTxHandle::Socket(Rc::clone(rc)),
    }
}

/// Runs `body` inside a transaction, retrying on `Conflicting` and
/// escalating to irrevocable mode on `Revocable`, per the §4.5 state
/// machine and §7's failure-semantics table. `Recoverable` errors are
/// returned to the caller untouched so its own recovery handler decides.
pub fn begin<F, R>(default_mode: CcMode, config: &TxConfig, mut body: F) -> Result<R, Error>
where
    F: FnMut(&mut Transaction) -> Result<R, Error>,
{
    // The global tables and lock manager are sized once, lazily, on first
    // touch — fail fast here rather than silently keep running with a
    // `config` the process-wide state no longer matches.
    crate::config::ensure_active(config)?;

    let owner = crate::lock::manager::global().register()?;
    let span = span!(Level::TRACE, "transaction", owner = owner.get());
    let _enter = span.enter();

    let mut tx = Transaction::new(owner, default_mode, config.recbits);
    let mut restarts = 0u32;
    let result = loop {
        match run_once(&mut tx, &mut body) {
            Ok(Outcome::Commit(value)) => break Ok(value),
            Ok(Outcome::Restart(mode)) => {
                restarts += 1;
                if restarts > config.max_conflict_restarts && !tx.irrevocable {
                    event!(
                        Level::TRACE,
                        restarts,
                        "forcing irrevocable after repeated conflicts"
                    );
                    crate::lock::manager::global().make_irrevocable(owner)?;
                    tx.irrevocable = true;
                    tx.reset();
                    tx.mode = TxMode::Irrevocable;
                    continue;
                }
                tx.reset();
                tx.mode = mode;
                continue;
            }
            Err(Error::Revocable) => {
                crate::lock::manager::global().make_irrevocable(owner)?;
                tx.irrevocable = true;
                tx.reset();
                tx.mode = TxMode::Irrevocable;
                continue;
            }
            Err(e) => break Err(e),
        }
    };

    if tx.irrevocable {
        crate::lock::manager::global().release_irrevocability(owner);
    }
    crate::lock::manager::global().unregister(owner);

    if let Err(Error::Irrecoverable(detail)) = &result {
        event!(
            Level::ERROR,
            detail = %detail,
            "irrecoverable error, aborting process"
        );
        std::process::abort();
    }

    result
}

fn run_once<F, R>(tx: &mut Transaction, body: &mut F) -> Result<Outcome<R>, Error>
where
    F: FnMut(&mut Transaction) -> Result<R, Error>,
{
    if !tx.irrevocable {
        crate::lock::manager::global().enter_revocable();
    }
    let body_result = body(tx);
    if !tx.irrevocable {
        crate::lock::manager::global().leave_revocable();
    }

    match body_result {
        Ok(value) => match commit(tx) {
            Ok(()) => Ok(Outcome::Commit(value)),
            // `commit` already rolled back on its own validate failure
            // (every teardown path, conflicting or not, runs the same
            // unlock/undo/finish sequence); nothing left to do here but
            // decide whether to restart.
            Err(Error::Conflicting(_)) => Ok(Outcome::Restart(TxMode::Restart)),
            Err(e) => Err(e),
        },
        Err(Error::Conflicting(lock_id)) => {
            event!(Level::TRACE, ?lock_id, "conflict during exec, rolling back");
            rollback(tx)?;
            Ok(Outcome::Restart(TxMode::Restart))
        }
        Err(Error::Revocable) => {
            rollback(tx)?;
            Err(Error::Revocable)
        }
        Err(e) => {
            rollback(tx)?;
            Err(e)
        }
    }
}

fn commit(tx: &mut Transaction) -> Result<(), Error> {
    tx.state = TxState::Committing;
    tx.modules.lock_all()?;
    if let Err(e) = tx.modules.validate_all(false) {
        tx.modules.unlock_all();
        // Nothing was applied yet, but exec may have taken eager kernel
        // side effects (opens, mallocs) that still need undoing, and
        // every module still holds table refs that must be released
        // regardless of which error validate returned.
        rollback(tx)?;
        return Err(e);
    }
    let events: Vec<_> = tx.events.iter_forward().copied().collect();
    tx.modules.apply_events(&events)?;
    tx.modules.update_cc_all(false)?;
    tx.modules.finish_all()?;
    tx.state = TxState::Idle;
    Ok(())
}

fn rollback(tx: &mut Transaction) -> Result<(), Error> {
    tx.state = TxState::RollingBack;
    let events: Vec<_> = tx.events.iter_backward().copied().collect();
    tx.modules.undo_events(&events)?;
    tx.modules.clear_cc_all(false)?;
    tx.state = TxState::Finalising;
    tx.modules.finish_all()?;
    tx.state = TxState::Idle;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn conflicting_body_is_retried_until_it_commits() {
        let config = TxConfig::default();
        let attempts = Cell::new(0u32);

        let result = begin(CcMode::Twopl, &config, |_tx| {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 3 {
                Err(Error::Conflicting(None))
            } else {
                Ok(attempts.get())
            }
        });

        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn repeated_conflicts_force_irrevocable_after_the_configured_bound() {
        let mut config = TxConfig::default();
        config.max_conflict_restarts = 1;
        let attempts = Cell::new(0u32);

        let result = begin(CcMode::Twopl, &config, |tx| {
            attempts.set(attempts.get() + 1);
            if tx.is_irrevocable() {
                Ok(())
            } else {
                Err(Error::Conflicting(None))
            }
        });

        assert!(result.is_ok());
        // One ordinary restart plus one forced-irrevocable restart before
        // the body finally observes `is_irrevocable() == true`.
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn revocable_request_escalates_immediately() {
        let config = TxConfig::default();
        let attempts = Cell::new(0u32);

        let result = begin(CcMode::Twopl, &config, |tx| {
            attempts.set(attempts.get() + 1);
            if tx.is_irrevocable() {
                Ok(())
            } else {
                Err(tx.request_irrevocable())
            }
        });

        assert!(result.is_ok());
        assert_eq!(attempts.get(), 2);
    }
}
