//! Reconciliation policy for the order ledger.
//!
//! # Design
//!
//! Everything that can be decided without I/O is decided here:
//!
//! 1. **Transition legality.** [`transition_allowed`] / [`check_transition`]
//!    encode the one-directional status graph
//!    `NEW → PROCESSING → {INVALID | PROCESSED}`. Illegal moves return
//!    [`TransitionError`], which callers MUST treat as a data-corruption
//!    alert, not a retryable failure.
//! 2. **Verdict planning.** [`plan`] maps an accrual-service reply onto the
//!    action the worker takes: keep waiting, or finalize with a terminal
//!    status and amount.
//! 3. **Retry pacing.** [`backoff_delay`] computes the capped exponential
//!    delay applied per order after transient fetch/apply failures.
//!
//! The async seams the worker is generic over ([`AccrualSource`] and
//! [`ReconcileLedger`]) also live here, so both the production adapters
//! (`loyal-accrual`, `loyal-db`) and the in-memory test doubles
//! (`loyal-testkit`) implement the same contracts.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use loyal_schemas::{AccrualReply, AccrualStatus, OrderRecord, OrderStatus};

pub mod backoff;

pub use backoff::backoff_delay;

// ---------------------------------------------------------------------------
// Transition legality
// ---------------------------------------------------------------------------

/// Returns `true` if `from → to` is a legal status move.
///
/// `Processing → Processing` is allowed: the worker re-confirms its claim on
/// an order it already holds, and an intermediate verdict leaves the order
/// where it is. Nothing moves back to `New`, and nothing leaves a terminal
/// state.
pub fn transition_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (New, Processing) | (Processing, Processing) | (Processing, Invalid) | (Processing, Processed)
    )
}

/// [`transition_allowed`] as a `Result`, carrying both endpoints on failure.
pub fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<(), TransitionError> {
    if transition_allowed(from, to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// Returned when a status move violates the one-directional state graph.
///
/// **Callers MUST treat this as an alert condition.** A rejected transition
/// means some writer tried to regress or skip a state, which indicates a bug
/// or corrupted data; the order is left in its last-known-good state and the
/// operation is aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "illegal order transition: {} -> {}",
            self.from.as_str(),
            self.to.as_str()
        )
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// Verdict planning
// ---------------------------------------------------------------------------

/// What the worker should do with a claimed order after hearing from the
/// accrual service.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedAction {
    /// Intermediate verdict: leave the order in `PROCESSING`, revisit on a
    /// later tick.
    Keep,
    /// Terminal verdict: commit `status` and `accrual` through the ledger.
    Finalize {
        status: OrderStatus,
        accrual: Decimal,
    },
}

/// Map an accrual reply onto the action to take.
///
/// A `PROCESSED` reply with no amount finalizes at zero; the invariant is
/// `accrual > 0 ⇒ PROCESSED`, not the converse. Non-`PROCESSED` verdicts
/// always carry zero regardless of what the wire said.
pub fn plan(reply: &AccrualReply) -> PlannedAction {
    match reply.status {
        AccrualStatus::Registered | AccrualStatus::Processing => PlannedAction::Keep,
        AccrualStatus::Invalid => PlannedAction::Finalize {
            status: OrderStatus::Invalid,
            accrual: Decimal::ZERO,
        },
        AccrualStatus::Processed => PlannedAction::Finalize {
            status: OrderStatus::Processed,
            accrual: reply.accrual.unwrap_or(Decimal::ZERO),
        },
    }
}

// ---------------------------------------------------------------------------
// Async seams
// ---------------------------------------------------------------------------

/// A transient failure talking to the accrual service: timeout, non-success
/// status, malformed body. Never terminal: the order stays claimed and is
/// retried on the worker's own cadence.
#[derive(Debug, Clone)]
pub struct FetchError {
    pub reason: String,
}

impl FetchError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "accrual fetch failed: {}", self.reason)
    }
}

impl std::error::Error for FetchError {}

/// Failure applying a planned transition through the ledger.
#[derive(Debug)]
pub enum ApplyError {
    /// The requested move violates the state graph (or lost a race to a
    /// writer that already finalized the row). Not retryable.
    Illegal(TransitionError),
    /// Store unavailable or the write failed for infrastructure reasons.
    /// Retried on a later tick.
    Infra(anyhow::Error),
}

impl std::fmt::Display for ApplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplyError::Illegal(e) => write!(f, "{e}"),
            ApplyError::Infra(e) => write!(f, "ledger apply failed: {e}"),
        }
    }
}

impl std::error::Error for ApplyError {}

/// Read side of the external accrual-calculation service.
#[async_trait]
pub trait AccrualSource: Send + Sync {
    async fn fetch(&self, number: &str) -> Result<AccrualReply, FetchError>;
}

/// The slice of the order ledger the reconciliation worker drives.
///
/// Implemented by `loyal-db` over PostgreSQL and by `loyal-testkit` in
/// memory; the worker does not know which it is holding.
#[async_trait]
pub trait ReconcileLedger: Send + Sync {
    /// Oldest order still awaiting a terminal verdict (`NEW` or
    /// `PROCESSING`, FIFO by creation time), if any.
    async fn next_pending(&self) -> anyhow::Result<Option<OrderRecord>>;

    /// Claim an order for reconciliation (`NEW → PROCESSING`); confirming an
    /// order already in `PROCESSING` is a no-op.
    async fn mark_processing(&self, number: &str) -> Result<(), ApplyError>;

    /// Commit a terminal status and accrual amount. Either fully commits or
    /// leaves the prior state untouched.
    async fn apply_reconciliation(
        &self,
        number: &str,
        new_status: OrderStatus,
        accrual: Decimal,
    ) -> Result<(), ApplyError>;
}

// ---------------------------------------------------------------------------
// Re-exported pacing helper
// ---------------------------------------------------------------------------

/// Default cap for per-order retry backoff, as a multiple of the tick
/// interval.
pub const DEFAULT_BACKOFF_CAP_TICKS: u32 = 32;

/// Convenience: capped exponential delay for the `failures`-th consecutive
/// failure, with the cap expressed in ticks.
pub fn delay_for_failures(tick: Duration, failures: u32) -> Duration {
    backoff_delay(tick, tick * DEFAULT_BACKOFF_CAP_TICKS, failures)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_only() {
        use OrderStatus::*;
        let all = [New, Processing, Invalid, Processed];
        for from in all {
            for to in all {
                let expect = matches!(
                    (from, to),
                    (New, Processing)
                        | (Processing, Processing)
                        | (Processing, Invalid)
                        | (Processing, Processed)
                );
                assert_eq!(
                    transition_allowed(from, to),
                    expect,
                    "{} -> {}",
                    from.as_str(),
                    to.as_str()
                );
            }
        }
    }

    #[test]
    fn terminal_states_are_inescapable() {
        use OrderStatus::*;
        for from in [Invalid, Processed] {
            for to in [New, Processing, Invalid, Processed] {
                assert!(!transition_allowed(from, to));
            }
        }
    }

    #[test]
    fn nothing_moves_back_to_new() {
        use OrderStatus::*;
        for from in [New, Processing, Invalid, Processed] {
            assert!(!transition_allowed(from, New));
        }
    }

    #[test]
    fn check_transition_reports_endpoints() {
        let err = check_transition(OrderStatus::Processed, OrderStatus::Processing).unwrap_err();
        assert_eq!(err.from, OrderStatus::Processed);
        assert_eq!(err.to, OrderStatus::Processing);
    }

    #[test]
    fn plan_keeps_intermediate_verdicts() {
        for status in [AccrualStatus::Registered, AccrualStatus::Processing] {
            let reply = AccrualReply {
                order: "12345678903".to_string(),
                status,
                accrual: None,
            };
            assert_eq!(plan(&reply), PlannedAction::Keep);
        }
    }

    #[test]
    fn plan_finalizes_invalid_with_zero_accrual() {
        let reply = AccrualReply {
            order: "12345678903".to_string(),
            status: AccrualStatus::Invalid,
            // A malformed upstream might attach an amount; it must not stick.
            accrual: Some("12.50".parse().unwrap()),
        };
        assert_eq!(
            plan(&reply),
            PlannedAction::Finalize {
                status: OrderStatus::Invalid,
                accrual: Decimal::ZERO,
            }
        );
    }

    #[test]
    fn plan_finalizes_processed_with_amount() {
        let reply = AccrualReply {
            order: "12345678903".to_string(),
            status: AccrualStatus::Processed,
            accrual: Some("500.00".parse().unwrap()),
        };
        assert_eq!(
            plan(&reply),
            PlannedAction::Finalize {
                status: OrderStatus::Processed,
                accrual: "500.00".parse().unwrap(),
            }
        );
    }

    #[test]
    fn plan_processed_without_amount_finalizes_at_zero() {
        let reply = AccrualReply {
            order: "12345678903".to_string(),
            status: AccrualStatus::Processed,
            accrual: None,
        };
        assert_eq!(
            plan(&reply),
            PlannedAction::Finalize {
                status: OrderStatus::Processed,
                accrual: Decimal::ZERO,
            }
        );
    }
}
