#![warn(missing_docs)]

//! `systx`, a user-space system-call transaction manager: wraps POSIX
//! file I/O, sockets and heap allocation in `begin`/commit blocks with
//! two-phase commit, rollback to entry state, and an irrevocable escape
//! hatch for operations the kernel cannot undo.

pub mod config;
pub mod error;
pub mod event;
pub mod file;
pub mod fileops;
pub mod ident;
pub mod lock;
pub mod module;
pub mod refcount;
pub mod shadow;
pub mod table;
pub mod tx;
pub mod wrappers;

pub use config::TxConfig;
pub use error::Error;
pub use shadow::file_tx::CcMode;
pub use tx::{begin, Transaction, TxState};
