//! Shared runtime state for loyal-daemon.
//!
//! All types here are `Clone`-able (via `Arc` or copy). Handlers receive
//! `State<Arc<AppState>>` from Axum; this module owns nothing async itself.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::RwLock;

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// WorkerSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time view of the reconciliation worker, surfaced by
/// GET /v1/status and updated by the worker after every tick.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    /// False until the worker task starts, and again after it drains on
    /// shutdown.
    pub running: bool,
    pub ticks: u64,
    /// Order number handled on the most recent non-idle tick.
    pub last_order: Option<String>,
    /// Human-readable outcome of the most recent tick.
    pub last_outcome: Option<String>,
    /// Orders currently sitting out a retry-backoff window.
    pub orders_in_backoff: usize,
    pub last_tick_utc: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Ledger pool; handlers reach the store through `loyal-db` functions.
    pub pool: PgPool,
    /// Static build metadata.
    pub build: BuildInfo,
    /// Latest reconciliation worker snapshot.
    pub worker: Arc<RwLock<WorkerSnapshot>>,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            build: BuildInfo {
                service: "loyal-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            worker: Arc::new(RwLock::new(WorkerSnapshot::default())),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}
