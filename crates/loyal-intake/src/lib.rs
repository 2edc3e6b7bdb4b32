//! Order intake: checksum gate in front of the ledger.
//!
//! A number that fails the Luhn check is rejected synchronously with no
//! persistence attempted; everything else is delegated to the ledger's
//! atomic register and its outcome mapped one-to-one.

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

use loyal_db::RegisterOutcome;

/// Why a submission was rejected. All of these are caller errors, never
/// retried by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The number failed Luhn validation (or contained non-digits).
    InvalidChecksum,
    /// This owner already registered this number.
    AlreadyRegistered,
    /// Another owner holds this number.
    RegisteredByOtherOwner,
}

/// Outcome of a submission. Infrastructure failures propagate separately as
/// errors; an `IntakeOutcome` is always a definitive answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    Accepted,
    Rejected(RejectReason),
}

/// Validate and register `number` for `owner`.
pub async fn register(pool: &PgPool, number: &str, owner: &str) -> Result<IntakeOutcome> {
    if !loyal_luhn::is_valid(number) {
        return Ok(IntakeOutcome::Rejected(RejectReason::InvalidChecksum));
    }

    let outcome = match loyal_db::register(pool, number, owner).await? {
        RegisterOutcome::Created => {
            info!(order = number, "order registered");
            IntakeOutcome::Accepted
        }
        RegisterOutcome::AlreadyOwn => IntakeOutcome::Rejected(RejectReason::AlreadyRegistered),
        RegisterOutcome::OtherOwner => {
            IntakeOutcome::Rejected(RejectReason::RegisteredByOtherOwner)
        }
    };

    Ok(outcome)
}
