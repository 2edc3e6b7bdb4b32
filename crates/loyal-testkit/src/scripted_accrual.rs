//! Scripted accrual source: replays a fixed sequence of replies/failures.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use loyal_reconcile::{AccrualSource, FetchError};
use loyal_schemas::{AccrualReply, AccrualStatus};

type ScriptedResult = Result<AccrualReply, FetchError>;

/// Pops one scripted result per `fetch`. An exhausted script answers with a
/// transient failure, so a worker that polls more often than expected cannot
/// invent verdicts.
#[derive(Clone, Default)]
pub struct ScriptedAccrual {
    script: Arc<Mutex<VecDeque<ScriptedResult>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAccrual {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_reply(&self, order: &str, status: AccrualStatus, accrual: Option<Decimal>) {
        self.script.lock().await.push_back(Ok(AccrualReply {
            order: order.to_string(),
            status,
            accrual,
        }));
    }

    /// Script a transient failure (timeout, non-200, malformed body; the
    /// worker cannot tell the difference, and should not).
    pub async fn push_failure(&self, reason: &str) {
        self.script
            .lock()
            .await
            .push_back(Err(FetchError::new(reason)));
    }

    /// Order numbers fetched so far, in call order.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl AccrualSource for ScriptedAccrual {
    async fn fetch(&self, number: &str) -> Result<AccrualReply, FetchError> {
        self.calls.lock().await.push(number.to_string());
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::new("script exhausted")))
    }
}
