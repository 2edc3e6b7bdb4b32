//! Reconciliation worker: the single background task that advances orders
//! through their lifecycle.
//!
//! # Behavior
//!
//! Exactly one worker runs per process, strictly sequentially: one pending
//! order per tick, one external call in flight at a time. Each tick:
//!
//! 1. Ask the ledger for the oldest `NEW`/`PROCESSING` order.
//! 2. Skip it if it is sitting out a retry-backoff window.
//! 3. Claim it (`NEW → PROCESSING`; re-confirming is a no-op).
//! 4. Fetch the accrual verdict and apply the planned transition.
//!
//! Transient failures (fetch errors, store hiccups) leave the order claimed
//! and schedule a capped exponential per-order backoff; the tick interval is
//! the base. Illegal transitions are logged at ERROR and never retried; the
//! order stays in its last-known-good state. Nothing in here panics or
//! propagates an error out of the loop.
//!
//! # Shutdown
//!
//! The loop holds a `watch` stop signal checked between ticks. A tick that
//! is already underway runs to completion before the task exits, so an
//! in-flight order is never abandoned mid-transition.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use loyal_reconcile::{
    delay_for_failures, plan, AccrualSource, ApplyError, PlannedAction, ReconcileLedger,
};
use loyal_schemas::OrderStatus;

use crate::state::WorkerSnapshot;

// ---------------------------------------------------------------------------
// TickOutcome
// ---------------------------------------------------------------------------

/// What a single tick did. Surfaced (stringified) in the status snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No pending orders.
    Idle,
    /// The head-of-queue order is inside its backoff window.
    Deferred { number: String },
    /// Intermediate verdict; order stays `PROCESSING`.
    Kept { number: String },
    /// Terminal verdict committed.
    Finalized { number: String, status: OrderStatus },
    /// Fetch or persistence failed; will retry after backoff.
    TransientFailure { number: String, reason: String },
    /// The planned transition violated the state graph. Not retried.
    IllegalTransition { number: String },
    /// Could not even read the pending queue.
    LedgerUnavailable { reason: String },
}

impl TickOutcome {
    fn describe(&self) -> String {
        match self {
            TickOutcome::Idle => "idle".to_string(),
            TickOutcome::Deferred { .. } => "deferred (backoff)".to_string(),
            TickOutcome::Kept { .. } => "kept (still processing)".to_string(),
            TickOutcome::Finalized { status, .. } => {
                format!("finalized {}", status.as_str())
            }
            TickOutcome::TransientFailure { reason, .. } => {
                format!("transient failure: {reason}")
            }
            TickOutcome::IllegalTransition { .. } => "illegal transition".to_string(),
            TickOutcome::LedgerUnavailable { reason } => {
                format!("ledger unavailable: {reason}")
            }
        }
    }

    fn order(&self) -> Option<&str> {
        match self {
            TickOutcome::Idle | TickOutcome::LedgerUnavailable { .. } => None,
            TickOutcome::Deferred { number }
            | TickOutcome::Kept { number }
            | TickOutcome::Finalized { number, .. }
            | TickOutcome::TransientFailure { number, .. }
            | TickOutcome::IllegalTransition { number } => Some(number),
        }
    }
}

// ---------------------------------------------------------------------------
// ReconcileWorker
// ---------------------------------------------------------------------------

struct BackoffEntry {
    failures: u32,
    due: Instant,
}

/// Generic over its two seams so scenario tests can drive ticks against the
/// in-memory testkit doubles without a database or a network.
pub struct ReconcileWorker<L, A> {
    ledger: L,
    accrual: A,
    tick_interval: Duration,
    backoff: HashMap<String, BackoffEntry>,
    snapshot: Arc<RwLock<WorkerSnapshot>>,
}

impl<L, A> ReconcileWorker<L, A>
where
    L: ReconcileLedger,
    A: AccrualSource,
{
    pub fn new(
        ledger: L,
        accrual: A,
        tick_interval: Duration,
        snapshot: Arc<RwLock<WorkerSnapshot>>,
    ) -> Self {
        Self {
            ledger,
            accrual,
            tick_interval,
            backoff: HashMap::new(),
            snapshot,
        }
    }

    /// Run one tick to completion. Public so tests can step the worker
    /// without waiting on wall-clock intervals.
    pub async fn tick(&mut self) -> TickOutcome {
        let outcome = self.tick_inner().await;
        self.publish(&outcome).await;
        outcome
    }

    async fn tick_inner(&mut self) -> TickOutcome {
        let order = match self.ledger.next_pending().await {
            Ok(Some(order)) => order,
            Ok(None) => return TickOutcome::Idle,
            Err(e) => {
                warn!(error = %e, "reconcile tick could not read pending queue");
                return TickOutcome::LedgerUnavailable {
                    reason: e.to_string(),
                };
            }
        };
        let number = order.number.clone();

        if let Some(entry) = self.backoff.get(&number) {
            if Instant::now() < entry.due {
                return TickOutcome::Deferred { number };
            }
        }

        // Claim before talking to the outside world, so a second poll (or a
        // restarted worker) sees the order as taken.
        if order.status == OrderStatus::New {
            match self.ledger.mark_processing(&number).await {
                Ok(()) => {}
                Err(ApplyError::Illegal(e)) => {
                    error!(order = %number, error = %e, "claim refused by state graph");
                    self.backoff.remove(&number);
                    return TickOutcome::IllegalTransition { number };
                }
                Err(ApplyError::Infra(e)) => {
                    warn!(order = %number, error = %e, "claim failed; will retry");
                    return self.transient(number, e.to_string());
                }
            }
        }

        let reply = match self.accrual.fetch(&number).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(order = %number, error = %e, "accrual fetch failed; will retry");
                return self.transient(number, e.to_string());
            }
        };

        if reply.order != number {
            warn!(
                order = %number,
                reply_order = %reply.order,
                "accrual reply for wrong order; discarding"
            );
            return self.transient(number, "reply order mismatch".to_string());
        }

        match plan(&reply) {
            PlannedAction::Keep => {
                // The service answered; this order just is not done yet.
                self.backoff.remove(&number);
                TickOutcome::Kept { number }
            }
            PlannedAction::Finalize { status, accrual } => {
                match self
                    .ledger
                    .apply_reconciliation(&number, status, accrual)
                    .await
                {
                    Ok(()) => {
                        info!(order = %number, status = status.as_str(), %accrual, "order finalized");
                        self.backoff.remove(&number);
                        TickOutcome::Finalized { number, status }
                    }
                    Err(ApplyError::Illegal(e)) => {
                        error!(order = %number, error = %e, "illegal transition; order left as-is");
                        self.backoff.remove(&number);
                        TickOutcome::IllegalTransition { number }
                    }
                    Err(ApplyError::Infra(e)) => {
                        warn!(order = %number, error = %e, "apply failed; will retry");
                        self.transient(number, e.to_string())
                    }
                }
            }
        }
    }

    fn transient(&mut self, number: String, reason: String) -> TickOutcome {
        let entry = self.backoff.entry(number.clone()).or_insert(BackoffEntry {
            failures: 0,
            due: Instant::now(),
        });
        entry.failures = entry.failures.saturating_add(1);
        entry.due = Instant::now() + delay_for_failures(self.tick_interval, entry.failures);
        TickOutcome::TransientFailure { number, reason }
    }

    async fn publish(&self, outcome: &TickOutcome) {
        let mut snap = self.snapshot.write().await;
        snap.running = true;
        snap.ticks += 1;
        if let Some(number) = outcome.order() {
            snap.last_order = Some(number.to_string());
        }
        snap.last_outcome = Some(outcome.describe());
        snap.orders_in_backoff = self.backoff.len();
        snap.last_tick_utc = Some(chrono::Utc::now());
    }

    async fn drain(&self) {
        let mut snap = self.snapshot.write().await;
        snap.running = false;
    }
}

// ---------------------------------------------------------------------------
// Task driver
// ---------------------------------------------------------------------------

/// Spawn the worker loop. Returns the join handle; send `true` on the stop
/// channel to shut it down after the in-flight tick completes.
pub fn spawn_reconcile_worker<L, A>(
    mut worker: ReconcileWorker<L, A>,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    L: ReconcileLedger + 'static,
    A: AccrualSource + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(worker.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(interval = ?worker.tick_interval, "reconcile worker started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Not cancelled mid-tick: the select only races the
                    // timer, the tick body runs to completion.
                    let _ = worker.tick().await;
                }
                changed = stop.changed() => {
                    let stop_requested = changed.is_err() || *stop.borrow();
                    if stop_requested {
                        break;
                    }
                }
            }
        }
        worker.drain().await;
        info!("reconcile worker stopped");
    })
}
