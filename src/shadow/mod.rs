//! Per-transaction shadow state (§3 component F): the private view each
//! transaction keeps of the global resources it has touched, reconciled
//! with the outside world only at commit.

pub mod fd_tx;
pub mod file_tx;
pub mod ofd_tx;
