//! End-to-end reconciliation scenarios driven tick by tick.
//!
//! The worker runs against the in-memory testkit doubles: a `MemoryLedger`
//! with real transition enforcement and a `ScriptedAccrual` replaying
//! canned verdicts and failures. `ReconcileWorker::tick` is stepped
//! directly, so no wall-clock sleeping is involved.

use std::sync::Arc;
use std::time::Duration;

use loyal_daemon::state::WorkerSnapshot;
use loyal_daemon::worker::{ReconcileWorker, TickOutcome};
use loyal_schemas::{AccrualStatus, OrderStatus};
use loyal_testkit::{MemoryLedger, ScriptedAccrual};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

fn snapshot() -> Arc<RwLock<WorkerSnapshot>> {
    Arc::new(RwLock::new(WorkerSnapshot::default()))
}

/// Worker with a zero tick interval: backoff windows collapse so tests can
/// re-tick immediately after a scripted failure.
fn worker(
    ledger: &MemoryLedger,
    accrual: &ScriptedAccrual,
) -> ReconcileWorker<MemoryLedger, ScriptedAccrual> {
    ReconcileWorker::new(
        ledger.clone(),
        accrual.clone(),
        Duration::ZERO,
        snapshot(),
    )
}

fn amount(s: &str) -> Decimal {
    s.parse().expect("test amount")
}

#[tokio::test]
async fn processed_verdict_finalizes_in_one_tick() {
    let ledger = MemoryLedger::new();
    let accrual = ScriptedAccrual::new();
    ledger.seed("12345678903", "owner-a").await;
    accrual
        .push_reply("12345678903", AccrualStatus::Processed, Some(amount("500.00")))
        .await;

    let mut w = worker(&ledger, &accrual);
    let outcome = w.tick().await;
    assert_eq!(
        outcome,
        TickOutcome::Finalized {
            number: "12345678903".to_string(),
            status: OrderStatus::Processed,
        }
    );

    let order = ledger.get("12345678903").await.unwrap();
    assert_eq!(order.status, OrderStatus::Processed);
    assert_eq!(order.accrual, amount("500.00"));
}

#[tokio::test]
async fn invalid_verdict_terminates_with_zero_accrual() {
    let ledger = MemoryLedger::new();
    let accrual = ScriptedAccrual::new();
    ledger.seed("79927398713", "owner-a").await;
    accrual
        .push_reply("79927398713", AccrualStatus::Invalid, None)
        .await;

    let mut w = worker(&ledger, &accrual);
    let outcome = w.tick().await;
    assert_eq!(
        outcome,
        TickOutcome::Finalized {
            number: "79927398713".to_string(),
            status: OrderStatus::Invalid,
        }
    );

    let order = ledger.get("79927398713").await.unwrap();
    assert_eq!(order.status, OrderStatus::Invalid);
    assert_eq!(order.accrual, Decimal::ZERO);
}

#[tokio::test]
async fn intermediate_verdict_keeps_order_processing() {
    let ledger = MemoryLedger::new();
    let accrual = ScriptedAccrual::new();
    ledger.seed("12345678903", "owner-a").await;
    accrual
        .push_reply("12345678903", AccrualStatus::Processing, None)
        .await;
    accrual
        .push_reply("12345678903", AccrualStatus::Processed, Some(amount("10.00")))
        .await;

    let mut w = worker(&ledger, &accrual);

    // Tick 1: claimed, but the service is not done; stays PROCESSING.
    let outcome = w.tick().await;
    assert!(matches!(outcome, TickOutcome::Kept { .. }));
    let order = ledger.get("12345678903").await.unwrap();
    assert_eq!(order.status, OrderStatus::Processing);

    // Tick 2: terminal.
    let outcome = w.tick().await;
    assert!(matches!(
        outcome,
        TickOutcome::Finalized {
            status: OrderStatus::Processed,
            ..
        }
    ));
}

#[tokio::test]
async fn timeout_leaves_processing_then_a_later_tick_finishes() {
    let ledger = MemoryLedger::new();
    let accrual = ScriptedAccrual::new();
    ledger.seed("12345678903", "owner-a").await;
    accrual.push_failure("timed out").await;
    accrual
        .push_reply("12345678903", AccrualStatus::Processed, Some(amount("500.00")))
        .await;

    let mut w = worker(&ledger, &accrual);

    // Tick 1: fetch fails. The claim already happened, so the order is
    // PROCESSING and safe to retry.
    let outcome = w.tick().await;
    assert!(matches!(outcome, TickOutcome::TransientFailure { .. }));
    let order = ledger.get("12345678903").await.unwrap();
    assert_eq!(order.status, OrderStatus::Processing);

    // Tick 2: the service recovered; terminal state is reached.
    let outcome = w.tick().await;
    assert!(matches!(
        outcome,
        TickOutcome::Finalized {
            status: OrderStatus::Processed,
            ..
        }
    ));
    let order = ledger.get("12345678903").await.unwrap();
    assert_eq!(order.accrual, amount("500.00"));
}

#[tokio::test]
async fn backoff_defers_a_failing_order() {
    let ledger = MemoryLedger::new();
    let accrual = ScriptedAccrual::new();
    ledger.seed("12345678903", "owner-a").await;
    accrual.push_failure("connection refused").await;

    // Non-zero interval: the first failure opens a real backoff window.
    let mut w = ReconcileWorker::new(
        ledger.clone(),
        accrual.clone(),
        Duration::from_secs(3600),
        snapshot(),
    );

    assert!(matches!(w.tick().await, TickOutcome::TransientFailure { .. }));
    assert!(matches!(w.tick().await, TickOutcome::Deferred { .. }));

    // The deferred tick must not have consumed another scripted fetch.
    assert_eq!(accrual.calls().await.len(), 1);
}

#[tokio::test]
async fn mismatched_reply_is_discarded_as_transient() {
    let ledger = MemoryLedger::new();
    let accrual = ScriptedAccrual::new();
    ledger.seed("12345678903", "owner-a").await;
    accrual
        .push_reply("99999999999", AccrualStatus::Processed, Some(amount("1.00")))
        .await;

    let mut w = worker(&ledger, &accrual);
    let outcome = w.tick().await;
    assert!(matches!(outcome, TickOutcome::TransientFailure { .. }));

    // Nothing was committed off the bogus reply.
    let order = ledger.get("12345678903").await.unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.accrual, Decimal::ZERO);
}

#[tokio::test]
async fn orders_are_reconciled_oldest_first() {
    let ledger = MemoryLedger::new();
    let accrual = ScriptedAccrual::new();
    ledger.seed("12345678903", "owner-a").await;
    ledger.seed("79927398713", "owner-b").await;
    accrual
        .push_reply("12345678903", AccrualStatus::Processed, Some(amount("1.00")))
        .await;
    accrual
        .push_reply("79927398713", AccrualStatus::Invalid, None)
        .await;

    let mut w = worker(&ledger, &accrual);
    w.tick().await;
    w.tick().await;

    assert_eq!(
        accrual.calls().await,
        vec!["12345678903".to_string(), "79927398713".to_string()]
    );
}

#[tokio::test]
async fn idle_tick_with_empty_queue() {
    let ledger = MemoryLedger::new();
    let accrual = ScriptedAccrual::new();
    let mut w = worker(&ledger, &accrual);
    assert_eq!(w.tick().await, TickOutcome::Idle);
    assert!(accrual.calls().await.is_empty());
}

#[tokio::test]
async fn snapshot_tracks_tick_progress() {
    let ledger = MemoryLedger::new();
    let accrual = ScriptedAccrual::new();
    ledger.seed("12345678903", "owner-a").await;
    accrual
        .push_reply("12345678903", AccrualStatus::Processed, Some(amount("5.00")))
        .await;

    let snap = snapshot();
    let mut w = ReconcileWorker::new(
        ledger.clone(),
        accrual.clone(),
        Duration::ZERO,
        Arc::clone(&snap),
    );
    w.tick().await;
    w.tick().await; // idle

    let s = snap.read().await.clone();
    assert_eq!(s.ticks, 2);
    assert_eq!(s.last_order.as_deref(), Some("12345678903"));
    assert_eq!(s.last_outcome.as_deref(), Some("idle"));
    assert_eq!(s.orders_in_backoff, 0);
    assert!(s.last_tick_utc.is_some());
}
