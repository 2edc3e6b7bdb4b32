//! Shared domain and wire types for the loyalty order backend.
//!
//! Everything here is plain data: serde-derived structs and closed enums.
//! Persistence lives in `loyal-db`, policy in `loyal-reconcile`.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a ledger order.
///
/// The storage layer constrains the `status` column to exactly these four
/// values; transitions are one-directional (see `loyal-reconcile`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Accepted by intake; not yet claimed by the reconciliation worker.
    New,
    /// Claimed by the worker; awaiting a terminal verdict from the accrual
    /// service.
    Processing,
    /// Rejected by the accrual service. **Terminal.**
    Invalid,
    /// Accrual finalized and recorded. **Terminal.**
    Processed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Processed => "PROCESSED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "INVALID" => Ok(OrderStatus::Invalid),
            "PROCESSED" => Ok(OrderStatus::Processed),
            other => Err(anyhow!("invalid order status: {}", other)),
        }
    }

    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }
}

// ---------------------------------------------------------------------------
// OrderRecord
// ---------------------------------------------------------------------------

/// A ledger order row as stored and as listed back to its owner.
///
/// `deduction` / `deduction_time` are written by the reward-spend flow, not
/// by reconciliation; they ride along here because the listing payload
/// includes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    #[serde(rename = "order_number")]
    pub number: String,
    #[serde(skip)]
    pub owner: String,
    pub status: OrderStatus,
    pub accrual: Decimal,
    pub deduction: Decimal,
    pub deduction_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Accrual service wire types
// ---------------------------------------------------------------------------

/// Verdict states reported by the external accrual-calculation service.
///
/// `Registered` and `Processing` are intermediate; the order stays claimed
/// and is revisited on a later tick. `Invalid` and `Processed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccrualStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

/// Decoded body of `GET {accrual_base}/api/orders/{number}`.
///
/// `accrual` is only meaningful when `status` is `PROCESSED`; the service
/// omits it otherwise. `Decimal`'s deserializer accepts both JSON numbers
/// and numeric strings, so either wire form decodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualReply {
    pub order: String,
    pub status: AccrualStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Decimal>,
}
