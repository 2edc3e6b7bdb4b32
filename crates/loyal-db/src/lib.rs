use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::warn;

use loyal_reconcile::{check_transition, ApplyError, ReconcileLedger, TransitionError};
use loyal_schemas::{OrderRecord, OrderStatus};

pub const ENV_DB_URL: &str = "LOYALTY_DATABASE_URL";

/// Connect to Postgres using LOYALTY_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='orders'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus { ok, has_orders_table: exists })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_orders_table: bool,
}

// ---------------------------------------------------------------------------
// Register
// ---------------------------------------------------------------------------

/// Outcome of an atomic order registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Row inserted; the order is new to the ledger.
    Created,
    /// The same owner already registered this number.
    AlreadyOwn,
    /// The number exists under a different owner.
    OtherOwner,
}

/// Register `number` for `owner` with status `NEW`.
///
/// Existence check and insert are a single atomic statement
/// (`ON CONFLICT DO NOTHING` against `uq_orders_number`), so N concurrent
/// registrations of the same number produce exactly one row; every loser of
/// the race sees a duplicate outcome, never a second insert.
pub async fn register(pool: &PgPool, number: &str, owner: &str) -> Result<RegisterOutcome> {
    let res = sqlx::query(
        r#"
        insert into orders (order_number, owner_id, status)
        values ($1, $2, 'NEW')
        on conflict on constraint uq_orders_number do nothing
        "#,
    )
    .bind(number)
    .bind(owner)
    .execute(pool)
    .await
    .context("register insert failed")?;

    if res.rows_affected() == 1 {
        return Ok(RegisterOutcome::Created);
    }

    // Conflict path: the row exists; distinguish whose it is. Owners never
    // change after insert, so this read cannot race to a different answer.
    let (existing_owner,): (String,) = sqlx::query_as::<_, (String,)>(
        "select owner_id from orders where order_number = $1",
    )
    .bind(number)
    .fetch_one(pool)
    .await
    .context("register conflict lookup failed")?;

    if existing_owner == owner {
        Ok(RegisterOutcome::AlreadyOwn)
    } else {
        Ok(RegisterOutcome::OtherOwner)
    }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// All orders registered by `owner`, newest first. Empty vec when none.
pub async fn list_by_owner(pool: &PgPool, owner: &str) -> Result<Vec<OrderRecord>> {
    let rows = sqlx::query(
        r#"
        select order_number, owner_id, status, accrual, deduction, deduction_time, created_at
        from orders
        where owner_id = $1
        order by created_at desc
        "#,
    )
    .bind(owner)
    .fetch_all(pool)
    .await
    .context("list_by_owner query failed")?;

    rows.iter().map(order_from_row).collect()
}

fn order_from_row(row: &sqlx::postgres::PgRow) -> Result<OrderRecord> {
    Ok(OrderRecord {
        number: row.try_get("order_number")?,
        owner: row.try_get("owner_id")?,
        status: OrderStatus::parse(&row.try_get::<String, _>("status")?)?,
        accrual: row.try_get("accrual")?,
        deduction: row.try_get("deduction")?,
        deduction_time: row.try_get("deduction_time")?,
        created_at: row.try_get("created_at")?,
    })
}

// ---------------------------------------------------------------------------
// Reconciliation queries
// ---------------------------------------------------------------------------

/// Oldest order still awaiting a terminal verdict, FIFO by `created_at`.
/// Used exclusively by the reconciliation worker.
pub async fn next_pending(pool: &PgPool) -> Result<Option<OrderRecord>> {
    let row = sqlx::query(
        r#"
        select order_number, owner_id, status, accrual, deduction, deduction_time, created_at
        from orders
        where status in ('NEW', 'PROCESSING')
        order by created_at asc
        limit 1
        "#,
    )
    .fetch_optional(pool)
    .await
    .context("next_pending query failed")?;

    row.as_ref().map(order_from_row).transpose()
}

/// Claim an order for reconciliation: `NEW → PROCESSING`.
///
/// Confirming an order already in `PROCESSING` is a no-op success. The
/// update is guarded by the current status, so a row that has already
/// reached a terminal state cannot be pulled back.
pub async fn mark_processing(pool: &PgPool, number: &str) -> Result<(), ApplyError> {
    let res = sqlx::query(
        r#"
        update orders
        set status = 'PROCESSING'
        where order_number = $1
          and status in ('NEW', 'PROCESSING')
        "#,
    )
    .bind(number)
    .execute(pool)
    .await
    .map_err(|e| ApplyError::Infra(anyhow::Error::new(e).context("mark_processing update failed")))?;

    if res.rows_affected() == 0 {
        let from = current_status(pool, number)
            .await
            .map_err(ApplyError::Infra)?;
        return Err(ApplyError::Illegal(TransitionError {
            from,
            to: OrderStatus::Processing,
        }));
    }

    Ok(())
}

/// Commit a terminal verdict: status plus accrual, atomically.
///
/// The transition is validated against the state graph first, then the
/// UPDATE is guarded by the expected current status; if a concurrent writer
/// finalized the row in between, zero rows match and the call fails without
/// touching anything. Accrual is only ever persisted alongside `PROCESSED`;
/// every other status writes zero.
pub async fn apply_reconciliation(
    pool: &PgPool,
    number: &str,
    new_status: OrderStatus,
    accrual: Decimal,
) -> Result<(), ApplyError> {
    let from = current_status(pool, number)
        .await
        .map_err(ApplyError::Infra)?;

    check_transition(from, new_status).map_err(ApplyError::Illegal)?;

    let amount = if new_status == OrderStatus::Processed {
        accrual
    } else {
        Decimal::ZERO
    };

    let res = sqlx::query(
        r#"
        update orders
        set status = $1,
            accrual = $2
        where order_number = $3
          and status = $4
        "#,
    )
    .bind(new_status.as_str())
    .bind(amount)
    .bind(number)
    .bind(from.as_str())
    .execute(pool)
    .await
    .map_err(|e| {
        ApplyError::Infra(anyhow::Error::new(e).context("apply_reconciliation update failed"))
    })?;

    if res.rows_affected() == 0 {
        // Raced: someone moved the row after our read. The guarded update
        // left it untouched; report the move as illegal from where we saw it.
        warn!(order = number, "apply_reconciliation lost status race");
        return Err(ApplyError::Illegal(TransitionError {
            from,
            to: new_status,
        }));
    }

    Ok(())
}

async fn current_status(pool: &PgPool, number: &str) -> Result<OrderStatus> {
    let (status,): (String,) = sqlx::query_as::<_, (String,)>(
        "select status from orders where order_number = $1",
    )
    .bind(number)
    .fetch_optional(pool)
    .await
    .context("current_status query failed")?
    .ok_or_else(|| anyhow!("order not found: {number}"))?;

    OrderStatus::parse(&status)
}

/// Detect a Postgres unique constraint violation by name.
pub fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.constraint() == Some(constraint)
                || db_err.code().as_deref() == Some("23505")
                    && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// PgLedger — ReconcileLedger over a pool
// ---------------------------------------------------------------------------

/// Thin handle implementing the worker's ledger seam over a `PgPool`.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ReconcileLedger for PgLedger {
    async fn next_pending(&self) -> Result<Option<OrderRecord>> {
        next_pending(&self.pool).await
    }

    async fn mark_processing(&self, number: &str) -> Result<(), ApplyError> {
        mark_processing(&self.pool, number).await
    }

    async fn apply_reconciliation(
        &self,
        number: &str,
        new_status: OrderStatus,
        accrual: Decimal,
    ) -> Result<(), ApplyError> {
        apply_reconciliation(&self.pool, number, new_status, accrual).await
    }
}
