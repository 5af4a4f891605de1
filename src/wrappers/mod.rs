//! Surrounding wrappers (§4.5 component L): thin, transactional
//! translations of individual POSIX/libc/libm calls over the core engine.
//! These are deliberately thin — the interesting engineering lives in
//! `shadow`, `fileops` and `tx`; a wrapper's job is only to materialise
//! the right shadows, perform or buffer the syscall, and log an event.

pub mod alloc;
pub mod cwd;
pub mod errno;
pub mod libc;
pub mod libm;
pub mod posix;
