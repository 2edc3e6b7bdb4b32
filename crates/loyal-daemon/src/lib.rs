//! loyal-daemon library surface.
//!
//! Exposed as a lib so the scenario tests under `tests/` can compose the
//! router and drive the reconciliation worker in-process.

pub mod api_types;
pub mod config;
pub mod routes;
pub mod state;
pub mod worker;
