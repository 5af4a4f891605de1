//! The module framework (§4.7): the fixed vtable contract each resource
//! domain implements to participate in two-phase commit, and the registry
//! that dispatches `lock`/`validate`/`apply`/`undo`/`finish` across all
//! registered modules in registration order.

use crate::error::Error;
use crate::event::Event;

/// The per-module vtable. Every hook has a default no-op so a module only
/// overrides the phases it actually participates in (mirrors the spec's
/// optional `ops` fields, each nullable in the C original).
pub trait Module {
    /// Acquires whatever locks this module needs before validation, in a
    /// deterministic order shared across modules (ascending fd/offset,
    /// §5).
    fn lock(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Releases locks taken by `lock` without running `finish`'s broader
    /// cleanup. Used when an earlier module in the commit sequence fails.
    fn unlock(&mut self) {}

    /// Checks that this module's read-set is still consistent (Ts mode).
    /// `is_retry` indicates this is a post-conflict re-validation.
    fn validate(&mut self, _is_retry: bool) -> Result<(), Error> {
        Ok(())
    }

    /// Replays one logged event forward, during commit.
    fn apply_event(&mut self, _event: &Event) -> Result<(), Error> {
        Ok(())
    }

    /// Reverses one logged event, during rollback. Walked in reverse
    /// program order by the driver.
    fn undo_event(&mut self, _event: &Event) -> Result<(), Error> {
        Ok(())
    }

    /// Updates this module's concurrency-control bookkeeping after a
    /// successful commit (e.g. bump record versions).
    fn update_cc(&mut self, _is_retry: bool) -> Result<(), Error> {
        Ok(())
    }

    /// Clears concurrency-control bookkeeping after a rollback.
    fn clear_cc(&mut self, _is_retry: bool) -> Result<(), Error> {
        Ok(())
    }

    /// Best-effort cleanup run regardless of commit/rollback outcome,
    /// releasing all references this module still holds. Errors here are
    /// non-recoverable but do not stop other modules' `finish` calls.
    fn finish(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Dense, registration-order list of participating modules. IDs are
/// reusable only across transaction lifetimes (spec §4.7); within one
/// transaction's registry they are stable.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Box<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        ModuleRegistry {
            modules: Vec::new(),
        }
    }

    pub fn register(&mut self, module: Box<dyn Module>) -> u8 {
        let id = self.modules.len();
        assert!(id < u8::MAX as usize, "too many registered modules");
        self.modules.push(module);
        id as u8
    }

    pub fn clear(&mut self) {
        self.modules.clear();
    }

    pub fn lock_all(&mut self) -> Result<(), Error> {
        for (i, m) in self.modules.iter_mut().enumerate() {
            if let Err(e) = m.lock() {
                for m in self.modules[..i].iter_mut() {
                    m.unlock();
                }
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn unlock_all(&mut self) {
        for m in self.modules.iter_mut() {
            m.unlock();
        }
    }

    pub fn validate_all(&mut self, is_retry: bool) -> Result<(), Error> {
        for m in self.modules.iter_mut() {
            m.validate(is_retry)?;
        }
        Ok(())
    }

    pub fn apply_events(&mut self, events: &[Event]) -> Result<(), Error> {
        for event in events {
            let module = self
                .modules
                .get_mut(event.module_id as usize)
                .ok_or_else(|| Error::irrecoverable("apply: unknown module id"))?;
            module
                .apply_event(event)
                .map_err(|e| upgrade_to_irrecoverable("apply", e))?;
        }
        Ok(())
    }

    pub fn undo_events(&mut self, events: &[Event]) -> Result<(), Error> {
        for event in events.iter().rev() {
            let module = self
                .modules
                .get_mut(event.module_id as usize)
                .ok_or_else(|| Error::irrecoverable("undo: unknown module id"))?;
            module
                .undo_event(event)
                .map_err(|e| upgrade_to_irrecoverable("undo", e))?;
        }
        Ok(())
    }

    pub fn update_cc_all(&mut self, is_retry: bool) -> Result<(), Error> {
        for m in self.modules.iter_mut() {
            m.update_cc(is_retry)?;
        }
        Ok(())
    }

    pub fn clear_cc_all(&mut self, is_retry: bool) -> Result<(), Error> {
        for m in self.modules.iter_mut() {
            m.clear_cc(is_retry)?;
        }
        Ok(())
    }

    /// Best-effort: every module's `finish` runs even if an earlier one
    /// failed; the first error is returned after all have run (§7).
    pub fn finish_all(&mut self) -> Result<(), Error> {
        let mut first_err = None;
        for m in self.modules.iter_mut() {
            if let Err(e) = m.finish() {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(upgrade_to_irrecoverable("finish", e)),
            None => Ok(()),
        }
    }
}

fn upgrade_to_irrecoverable(phase: &str, error: Error) -> Error {
    if matches!(error, Error::Irrecoverable(_)) {
        return error;
    }
    Error::irrecoverable(format!("{phase} failed after partial application: {error}"))
}
