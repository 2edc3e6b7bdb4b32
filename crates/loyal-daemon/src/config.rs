//! Environment-variable configuration for the daemon.
//!
//! Production injects env vars directly; `.env.local` is loaded by `main`
//! for dev convenience. The database URL is owned by `loyal-db`
//! ([`loyal_db::ENV_DB_URL`]); everything else lives here.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

pub const ENV_RUN_ADDR: &str = "LOYALTY_RUN_ADDR";
pub const ENV_ACCRUAL_ADDR: &str = "LOYALTY_ACCRUAL_ADDR";
pub const ENV_POLL_INTERVAL_MS: &str = "LOYALTY_POLL_INTERVAL_MS";
pub const ENV_ACCRUAL_TIMEOUT_MS: &str = "LOYALTY_ACCRUAL_TIMEOUT_MS";

const DEFAULT_BIND: ([u8; 4], u16) = ([127, 0, 0, 1], 8080);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub bind_addr: SocketAddr,
    /// Base URL of the external accrual service, e.g. `http://accrual:8081`.
    pub accrual_base_url: String,
    /// Fixed wake interval of the reconciliation worker.
    pub poll_interval: Duration,
    /// Bounded per-call timeout for accrual fetches.
    pub accrual_timeout: Duration,
}

impl DaemonConfig {
    /// Read configuration from the process environment.
    ///
    /// The accrual address is required: the daemon is useless without the
    /// external service it reconciles against. The rest default sensibly.
    pub fn from_env() -> Result<Self> {
        let bind_addr = match std::env::var(ENV_RUN_ADDR) {
            Ok(v) => v
                .parse()
                .with_context(|| format!("invalid {ENV_RUN_ADDR}: {v}"))?,
            Err(_) => SocketAddr::from(DEFAULT_BIND),
        };

        let accrual_base_url = std::env::var(ENV_ACCRUAL_ADDR)
            .with_context(|| format!("missing env var {ENV_ACCRUAL_ADDR}"))?;

        let poll_interval = duration_ms_from_env(ENV_POLL_INTERVAL_MS)?
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        let accrual_timeout = duration_ms_from_env(ENV_ACCRUAL_TIMEOUT_MS)?
            .unwrap_or(loyal_accrual::DEFAULT_TIMEOUT);

        Ok(Self {
            bind_addr,
            accrual_base_url,
            poll_interval,
            accrual_timeout,
        })
    }
}

fn duration_ms_from_env(key: &str) -> Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(v) => Ok(Some(parse_duration_ms(&v).with_context(|| {
            format!("invalid {key}: {v} (expected positive milliseconds)")
        })?)),
        Err(_) => Ok(None),
    }
}

fn parse_duration_ms(s: &str) -> Result<Duration> {
    let ms: u64 = s.trim().parse().context("not an integer")?;
    if ms == 0 {
        anyhow::bail!("must be > 0");
    }
    Ok(Duration::from_millis(ms))
}
