//! Deterministic in-memory doubles for reconciliation scenario tests.
//!
//! No network I/O, no database. [`MemoryLedger`] implements the worker's
//! ledger seam with the same transition rules the real store enforces;
//! [`ScriptedAccrual`] replays a fixed sequence of accrual replies and
//! failures.

pub mod memory_ledger;
pub mod scripted_accrual;

pub use memory_ledger::MemoryLedger;
pub use scripted_accrual::ScriptedAccrual;
