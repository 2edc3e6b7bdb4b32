//! Capped exponential retry pacing for per-order transient failures.

use std::time::Duration;

/// Delay before the next attempt after `failures` consecutive failures.
///
/// `failures == 0` means no failure has been seen and there is no delay.
/// The first failure waits one `base` interval, each further failure doubles
/// it, and the result never exceeds `cap`. Shift math saturates well before
/// `u32` overflow so a long outage cannot wrap the delay back down.
pub fn backoff_delay(base: Duration, cap: Duration, failures: u32) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let exp = failures.saturating_sub(1).min(16);
    let delay = base.saturating_mul(1u32 << exp);
    delay.min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_secs(5);
    const CAP: Duration = Duration::from_secs(160);

    #[test]
    fn no_failures_no_delay() {
        assert_eq!(backoff_delay(BASE, CAP, 0), Duration::ZERO);
    }

    #[test]
    fn doubles_per_failure() {
        assert_eq!(backoff_delay(BASE, CAP, 1), Duration::from_secs(5));
        assert_eq!(backoff_delay(BASE, CAP, 2), Duration::from_secs(10));
        assert_eq!(backoff_delay(BASE, CAP, 3), Duration::from_secs(20));
        assert_eq!(backoff_delay(BASE, CAP, 4), Duration::from_secs(40));
    }

    #[test]
    fn caps_and_stays_capped() {
        assert_eq!(backoff_delay(BASE, CAP, 6), CAP);
        assert_eq!(backoff_delay(BASE, CAP, 7), CAP);
        assert_eq!(backoff_delay(BASE, CAP, 1000), CAP);
        assert_eq!(backoff_delay(BASE, CAP, u32::MAX), CAP);
    }
}
