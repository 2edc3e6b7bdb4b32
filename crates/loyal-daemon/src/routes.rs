//! Axum router and all HTTP handlers for loyal-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Handlers stay thin: owner extraction, body decoding,
//! and outcome-to-status mapping; everything else lives in `loyal-intake`
//! and `loyal-db`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::error;

use loyal_intake::{IntakeOutcome, RejectReason};

use crate::{
    api_types::{
        extract_order_number, ErrorResponse, HealthResponse, RegisteredResponse, StatusResponse,
    },
    state::{uptime_secs, AppState},
};

/// Header carrying the verified owner identity, set by the fronting auth
/// layer. The daemon treats it as opaque; it never sees credentials.
pub const OWNER_HEADER: &str = "x-owner-id";

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/user/orders", post(submit_order).get(list_orders))
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .with_state(state)
}

fn owner_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn error_body(status: StatusCode, msg: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: msg.to_string(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /api/user/orders
// ---------------------------------------------------------------------------

/// Submit an order number for the authenticated owner.
///
/// | Outcome | Status |
/// |---|---|
/// | registered | 200 |
/// | already registered by this owner | 409 |
/// | checksum invalid | 422 |
/// | number held by another owner | 400 |
/// | missing owner identity | 401 |
/// | malformed body | 400 |
pub(crate) async fn submit_order(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(owner) = owner_from_headers(&headers) else {
        return error_body(StatusCode::UNAUTHORIZED, "missing owner identity");
    };

    let Some(number) = extract_order_number(&body) else {
        return error_body(StatusCode::BAD_REQUEST, "order number not found in body");
    };

    match loyal_intake::register(&st.pool, &number, &owner).await {
        Ok(IntakeOutcome::Accepted) => (
            StatusCode::OK,
            Json(RegisteredResponse { order: number }),
        )
            .into_response(),
        Ok(IntakeOutcome::Rejected(RejectReason::InvalidChecksum)) => error_body(
            StatusCode::UNPROCESSABLE_ENTITY,
            "order number failed checksum validation",
        ),
        Ok(IntakeOutcome::Rejected(RejectReason::AlreadyRegistered)) => error_body(
            StatusCode::CONFLICT,
            "order number already registered by this owner",
        ),
        Ok(IntakeOutcome::Rejected(RejectReason::RegisteredByOtherOwner)) => error_body(
            StatusCode::BAD_REQUEST,
            "order number registered by another owner",
        ),
        Err(e) => {
            error!(error = %e, "order registration failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "registration failed")
        }
    }
}

// ---------------------------------------------------------------------------
// GET /api/user/orders
// ---------------------------------------------------------------------------

/// List the owner's orders, newest first. An owner with no orders gets an
/// empty JSON array, not an error.
pub(crate) async fn list_orders(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let Some(owner) = owner_from_headers(&headers) else {
        return error_body(StatusCode::UNAUTHORIZED, "missing owner identity");
    };

    match loyal_db::list_by_owner(&st.pool, &owner).await {
        Ok(orders) => (StatusCode::OK, Json(orders)).into_response(),
        Err(e) => {
            error!(error = %e, "order listing failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "listing failed")
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let reconcile = st.worker.read().await.clone();
    (
        StatusCode::OK,
        Json(StatusResponse {
            daemon_uptime_secs: uptime_secs(),
            reconcile,
        }),
    )
}
