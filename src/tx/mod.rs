//! The transaction driver (§4.5, §4.7): owns the begin/commit/rollback/
//! restart control flow and the per-transaction module/event bookkeeping.

pub mod driver;

pub use driver::{begin, Transaction, TxMode, TxState};
