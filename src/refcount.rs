//! Generic shared, reference-counted objects (§4.3): an atomic refcount
//! paired with a mutex, running a first-ref initialiser on the 0→1
//! transition and a last-ref finaliser on the 1→0 transition, both under
//! the object's lock.
//!
//! This generalises the teacher's `FileSerial`/`SERIALS` pattern (a
//! `LazyLock<Arc<RwLock<Vec<Weak<FileSerial>>>>>` looked up by inode,
//! created on first reference, pruned on `Drop`) into a reusable building
//! block that every global table entry (D) is built from.

use std::sync::Mutex;

use crate::error::Error;

/// A slot that may or may not currently hold a live, identified resource.
/// `Empty` slots are reusable; `search_by_id` on an empty id claims them.
pub struct Shared<T> {
    inner: Mutex<SharedInner<T>>,
}

struct SharedInner<T> {
    refs: u32,
    value: Option<T>,
}

impl<T> Default for Shared<T> {
    fn default() -> Self {
        Shared {
            inner: Mutex::new(SharedInner {
                refs: 0,
                value: None,
            }),
        }
    }
}

impl<T> Shared<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if this slot currently holds no value (refcount is 0).
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().value.is_none()
    }

    pub fn refcount(&self) -> u32 {
        self.inner.lock().unwrap().refs
    }

    /// Runs `predicate` against the current value (if any) under the
    /// object's lock. If it matches, or the slot already has outstanding
    /// references, increments the refcount. On the 0→1 transition runs
    /// `init` to produce the value; if `init` fails the refcount is
    /// reverted to 0 and the error propagated.
    ///
    /// Returns `true` if a match was found and a reference taken.
    pub fn ref_or_set_up(
        &self,
        predicate: impl FnOnce(Option<&T>) -> bool,
        init: impl FnOnce() -> Result<T, Error>,
    ) -> Result<bool, Error> {
        let mut inner = self.inner.lock().unwrap();
        if !predicate(inner.value.as_ref()) {
            return Ok(false);
        }
        if inner.refs == 0 {
            let value = init()?;
            inner.value = Some(value);
        }
        inner.refs += 1;
        Ok(true)
    }

    /// Unconditional increment. Callers must already hold a reference.
    pub fn ref_again(&self) {
        let mut inner = self.inner.lock().unwrap();
        debug_assert!(inner.refs > 0, "ref_again on an unreferenced Shared<T>");
        inner.refs += 1;
    }

    /// Decrements the refcount; on 1→0 runs `finalise` against the value
    /// before clearing it, leaving the slot empty and reusable.
    pub fn unref(&self, finalise: impl FnOnce(&mut T)) {
        let mut inner = self.inner.lock().unwrap();
        if inner.refs == 0 {
            return;
        }
        inner.refs -= 1;
        if inner.refs == 0 {
            if let Some(mut value) = inner.value.take() {
                finalise(&mut value);
            }
        }
    }

    /// References iff `predicate` matches the current value; never
    /// initialises. Used for table scans that only want existing matches.
    pub fn cmp_and_ref(&self, predicate: impl FnOnce(&T) -> bool) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let matched = match inner.value.as_ref() {
            Some(v) => predicate(v),
            None => false,
        };
        if matched {
            inner.refs += 1;
        }
        matched
    }

    pub fn with_value<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let inner = self.inner.lock().unwrap();
        f(inner.value.as_ref())
    }

    pub fn with_value_mut<R>(&self, f: impl FnOnce(Option<&mut T>) -> R) -> R {
        let mut inner = self.inner.lock().unwrap();
        f(inner.value.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_ref_runs_init_once() {
        let shared: Shared<u32> = Shared::new();
        let mut init_calls = 0;
        for _ in 0..3 {
            shared
                .ref_or_set_up(
                    |v| v.is_none() || v == Some(&7),
                    || {
                        init_calls += 1;
                        Ok(7)
                    },
                )
                .unwrap();
        }
        assert_eq!(init_calls, 1);
        assert_eq!(shared.refcount(), 3);
    }

    #[test]
    fn last_ref_clears_value() {
        let shared: Shared<u32> = Shared::new();
        shared
            .ref_or_set_up(|_| true, || Ok(1))
            .unwrap();
        shared.unref(|_| {});
        assert!(shared.is_empty());
        assert_eq!(shared.refcount(), 0);
    }

    #[test]
    fn init_failure_reverts_refcount() {
        let shared: Shared<u32> = Shared::new();
        let result = shared.ref_or_set_up(|_| true, || Err(Error::irrecoverable("boom")));
        assert!(result.is_err());
        assert_eq!(shared.refcount(), 0);
        assert!(shared.is_empty());
    }
}
