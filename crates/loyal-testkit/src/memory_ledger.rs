//! In-memory order ledger with the same transition semantics as the store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use loyal_reconcile::{check_transition, ApplyError, ReconcileLedger};
use loyal_schemas::{OrderRecord, OrderStatus};

/// Cloneable in-memory ledger. Orders are held FIFO by `created_at`; the
/// seeding helpers space creation times one second apart so insertion order
/// is the queue order.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    orders: Arc<Mutex<Vec<OrderRecord>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an order in `NEW`, queued behind everything already present.
    pub async fn seed(&self, number: &str, owner: &str) {
        let mut orders = self.orders.lock().await;
        let created_at = next_created_at(&orders);
        orders.push(OrderRecord {
            number: number.to_string(),
            owner: owner.to_string(),
            status: OrderStatus::New,
            accrual: Decimal::ZERO,
            deduction: Decimal::ZERO,
            deduction_time: None,
            created_at,
        });
    }

    /// Current snapshot of one order, if present.
    pub async fn get(&self, number: &str) -> Option<OrderRecord> {
        self.orders
            .lock()
            .await
            .iter()
            .find(|o| o.number == number)
            .cloned()
    }

    /// Every status observed so far, for queue-shape assertions.
    pub async fn snapshot(&self) -> Vec<OrderRecord> {
        self.orders.lock().await.clone()
    }
}

fn next_created_at(orders: &[OrderRecord]) -> DateTime<Utc> {
    match orders.iter().map(|o| o.created_at).max() {
        Some(latest) => latest + Duration::seconds(1),
        None => Utc::now(),
    }
}

#[async_trait]
impl ReconcileLedger for MemoryLedger {
    async fn next_pending(&self) -> anyhow::Result<Option<OrderRecord>> {
        let orders = self.orders.lock().await;
        Ok(orders
            .iter()
            .filter(|o| !o.status.is_terminal())
            .min_by_key(|o| o.created_at)
            .cloned())
    }

    async fn mark_processing(&self, number: &str) -> Result<(), ApplyError> {
        let mut orders = self.orders.lock().await;
        let order = orders
            .iter_mut()
            .find(|o| o.number == number)
            .ok_or_else(|| ApplyError::Infra(anyhow::anyhow!("order not found: {number}")))?;

        check_transition(order.status, OrderStatus::Processing)
            .map_err(ApplyError::Illegal)?;
        order.status = OrderStatus::Processing;
        Ok(())
    }

    async fn apply_reconciliation(
        &self,
        number: &str,
        new_status: OrderStatus,
        accrual: Decimal,
    ) -> Result<(), ApplyError> {
        let mut orders = self.orders.lock().await;
        let order = orders
            .iter_mut()
            .find(|o| o.number == number)
            .ok_or_else(|| ApplyError::Infra(anyhow::anyhow!("order not found: {number}")))?;

        check_transition(order.status, new_status).map_err(ApplyError::Illegal)?;

        order.status = new_status;
        order.accrual = if new_status == OrderStatus::Processed {
            accrual
        } else {
            Decimal::ZERO
        };
        Ok(())
    }
}
