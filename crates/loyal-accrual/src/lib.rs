//! HTTP client for the external accrual-calculation service.
//!
//! One read endpoint: `GET {base}/api/orders/{number}`. Every failure mode
//! (connect error, timeout, non-success status, missing order, malformed
//! body) is a [`FetchError`], i.e. transient by definition: the worker
//! leaves the order claimed and retries on its own cadence. This client
//! never turns an infrastructure problem into a terminal verdict.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use loyal_reconcile::{AccrualSource, FetchError};
use loyal_schemas::{AccrualReply, AccrualStatus};

/// Default per-call timeout. Overridable via daemon configuration.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct AccrualHttpClient {
    http: reqwest::Client,
    base_url: String,
}

impl AccrualHttpClient {
    /// Build a client against `base_url` with a bounded per-call `timeout`.
    ///
    /// The timeout covers the whole call (connect + response body); an
    /// unbounded hang against a degraded accrual service would otherwise
    /// stall the single-flight reconciliation worker indefinitely.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::new(format!("client build failed: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn order_url(&self, number: &str) -> String {
        format!("{}/api/orders/{number}", self.base_url.trim_end_matches('/'))
    }
}

/// Wire body of the accrual reply. Kept separate from the domain type so a
/// contract change surfaces as a decode error here, not as odd domain state.
#[derive(Debug, Deserialize)]
struct AccrualWireReply {
    order: String,
    status: String,
    #[serde(default)]
    accrual: Option<rust_decimal::Decimal>,
}

fn decode_reply(body: &[u8]) -> Result<AccrualReply, FetchError> {
    let wire: AccrualWireReply = serde_json::from_slice(body)
        .map_err(|e| FetchError::new(format!("malformed accrual body: {e}")))?;

    let status = match wire.status.as_str() {
        "REGISTERED" => AccrualStatus::Registered,
        "PROCESSING" => AccrualStatus::Processing,
        "INVALID" => AccrualStatus::Invalid,
        "PROCESSED" => AccrualStatus::Processed,
        other => {
            return Err(FetchError::new(format!(
                "unknown accrual status '{other}'"
            )))
        }
    };

    Ok(AccrualReply {
        order: wire.order,
        status,
        accrual: wire.accrual,
    })
}

#[async_trait]
impl AccrualSource for AccrualHttpClient {
    async fn fetch(&self, number: &str) -> Result<AccrualReply, FetchError> {
        let url = self.order_url(number);

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::new(format!("request failed: {e}")))?;

        let status = resp.status();

        // 204: the accrual service has not seen this order yet. Not a
        // verdict; try again later.
        if status == reqwest::StatusCode::NO_CONTENT {
            return Err(FetchError::new("order not yet known to accrual service"));
        }

        if !status.is_success() {
            return Err(FetchError::new(format!(
                "accrual service returned {}",
                status.as_u16()
            )));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::new(format!("body read failed: {e}")))?;

        let reply = decode_reply(&body)?;
        debug!(order = number, status = ?reply.status, "accrual reply");
        Ok(reply)
    }
}
