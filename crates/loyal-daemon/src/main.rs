//! loyal-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, connects and
//! migrates the ledger, starts the reconciliation worker, wires middleware,
//! and serves HTTP until ctrl-c. Route handlers live in `routes.rs`; shared
//! state types in `state.rs`; the worker in `worker.rs`.

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use loyal_daemon::{config::DaemonConfig, routes, state, worker};
use tokio::sync::watch;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cfg = DaemonConfig::from_env()?;

    let pool = loyal_db::connect_from_env().await?;
    loyal_db::migrate(&pool).await?;
    let db = loyal_db::status(&pool).await?;
    info!(ok = db.ok, has_orders_table = db.has_orders_table, "ledger ready");

    let shared = Arc::new(state::AppState::new(pool.clone()));

    let accrual = loyal_accrual::AccrualHttpClient::new(&cfg.accrual_base_url, cfg.accrual_timeout)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let (stop_tx, stop_rx) = watch::channel(false);
    let worker_handle = worker::spawn_reconcile_worker(
        worker::ReconcileWorker::new(
            loyal_db::PgLedger::new(pool),
            accrual,
            cfg.poll_interval,
            Arc::clone(&shared.worker),
        ),
        stop_rx,
    );

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    info!("loyal-daemon listening on http://{}", cfg.bind_addr);

    axum::serve(
        tokio::net::TcpListener::bind(cfg.bind_addr).await?,
        app,
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server crashed")?;

    // Let the in-flight tick finish before the process exits, so no order is
    // abandoned mid-transition.
    let _ = stop_tx.send(true);
    let _ = worker_handle.await;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
    }
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
