//! The global, process-wide resource tables (§4.4): identity-scanned
//! file/OFD tables and the fd-indexed FD table.

pub mod fdtab;
pub mod slot;
