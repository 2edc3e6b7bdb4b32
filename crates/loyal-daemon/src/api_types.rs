//! Request/response bodies for the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::state::WorkerSnapshot;

#[derive(Clone, Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusResponse {
    pub daemon_uptime_secs: u64,
    pub reconcile: WorkerSnapshot,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisteredResponse {
    pub order: String,
}

/// JSON submission form: `{"order": "<digits>"}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderSubmission {
    pub order: String,
}

/// Pull an order number out of a POST body.
///
/// Two accepted shapes, decoded structurally (never by scraping the raw
/// text): a JSON object with an `order` string field, or a bare digit
/// string. Anything else is `None`, a 400 for the caller. Digit-ness is
/// checked here only for the bare form; checksum validity is intake's job.
pub fn extract_order_number(body: &[u8]) -> Option<String> {
    if let Ok(sub) = serde_json::from_slice::<OrderSubmission>(body) {
        return Some(sub.order);
    }

    let raw = std::str::from_utf8(body).ok()?.trim();
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        return Some(raw.to_string());
    }

    None
}
