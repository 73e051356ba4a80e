//! AI commentary jobs. The ledger core only stores and serves completed
//! results keyed by job id; generation runs on a background task behind the
//! `Analyst` trait and no retry/backoff lives here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::cache::{self, ANALYSIS_TTL, FastStore};
use crate::error::LedgerError;
use crate::market::{MarketData, MarketError};

#[async_trait]
pub trait Analyst: Send + Sync {
    async fn analyze(&self, symbol: &str) -> Result<serde_json::Value, MarketError>;
}

/// Job outcome as served to callers. A job id with no stored result is
/// reported as pending; unknown ids look the same, which matches the
/// fire-and-poll contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Done { payload: serde_json::Value },
    Failed { error: String },
}

pub struct AnalysisService {
    cache: FastStore,
    market: Arc<dyn MarketData>,
    analyst: Arc<dyn Analyst>,
}

impl AnalysisService {
    pub fn new(cache: FastStore, market: Arc<dyn MarketData>, analyst: Arc<dyn Analyst>) -> Self {
        Self {
            cache,
            market,
            analyst,
        }
    }

    /// Validate the symbol, then kick off generation and return the job id
    /// immediately. The completed payload lands in the fast store under
    /// `analysis:{job_id}` with a 30-minute TTL.
    pub async fn submit(&self, symbol: &str) -> Result<Uuid, LedgerError> {
        self.market.validate(symbol).await?;
        let job_id = Uuid::new_v4();
        let store = self.cache.clone();
        let analyst = Arc::clone(&self.analyst);
        let symbol = symbol.to_string();
        tokio::spawn(async move {
            let status = match analyst.analyze(&symbol).await {
                Ok(payload) => JobStatus::Done { payload },
                Err(err) => {
                    warn!(%job_id, %symbol, %err, "analysis job failed");
                    JobStatus::Failed {
                        error: err.to_string(),
                    }
                }
            };
            let raw = serde_json::to_string(&status).expect("job status serializes to JSON");
            store
                .set(&cache::analysis_key(job_id), raw, Some(ANALYSIS_TTL))
                .await;
        });
        Ok(job_id)
    }

    pub async fn status(&self, job_id: Uuid) -> JobStatus {
        match self.cache.get(&cache::analysis_key(job_id)).await {
            None => JobStatus::Pending,
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(status) => status,
                Err(err) => {
                    warn!(%job_id, %err, "corrupt cached analysis result, reporting pending");
                    JobStatus::Pending
                }
            },
        }
    }
}

/// Commentary built from the current quote. Stands in for the external LLM
/// pipeline the production deployment points at.
pub struct CannedAnalyst {
    market: Arc<dyn MarketData>,
}

impl CannedAnalyst {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Analyst for CannedAnalyst {
    async fn analyze(&self, symbol: &str) -> Result<serde_json::Value, MarketError> {
        let price = self.market.current_price(symbol).await?;
        Ok(json!({
            "symbol": symbol,
            "price": price,
            "commentary": format!(
                "{symbol} last traded at {price}. Momentum is mixed; size entries \
                 conservatively and prefer staged exits over a single block."
            ),
        }))
    }
}
