//! Insight Ranker
//!
//! Runs every miner concurrently, each under its own timeout and panic
//! guard, then keeps the most severe findings. A miner that errors, times
//! out or panics contributes nothing and is reported as a [`MinerFailure`].

use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use super::{Insight, InsightKind, Miner, PeriodData};
use crate::kpi::KpiSnapshot;
use crate::pipeline::timeout::panic_message;

/// A miner that produced no result for this run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MinerFailure {
    pub miner: InsightKind,
    pub reason: String,
}

/// Ranked findings for one report
#[derive(Debug, Clone, Default, Serialize)]
pub struct RankedInsights {
    pub insights: Vec<Insight>,
    pub failures: Vec<MinerFailure>,
}

impl RankedInsights {
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Stable severity sort then truncation
pub fn rank(mut insights: Vec<Insight>, max_insights: usize) -> Vec<Insight> {
    insights.sort_by(|a, b| b.severity().cmp(&a.severity()));
    insights.truncate(max_insights);
    insights
}

pub struct InsightRanker {
    miners: Vec<Miner>,
    max_insights: usize,
    miner_timeout: Duration,
}

impl InsightRanker {
    pub fn new(miners: Vec<Miner>, max_insights: usize, miner_timeout: Duration) -> Self {
        Self {
            miners,
            max_insights,
            miner_timeout,
        }
    }

    pub async fn run(
        &self,
        tenant_id: &str,
        data: &PeriodData<'_>,
        kpis: &KpiSnapshot,
    ) -> RankedInsights {
        let runs = self.miners.iter().map(|miner| async move {
            let guarded = AssertUnwindSafe(tokio::time::timeout(
                self.miner_timeout,
                miner.detect(tenant_id, data, kpis),
            ))
            .catch_unwind()
            .await;
            (miner.kind(), guarded)
        });

        let mut found = Vec::new();
        let mut failures = Vec::new();
        for (kind, outcome) in join_all(runs).await {
            let reason = match outcome {
                Ok(Ok(Ok(insights))) => {
                    found.extend(insights);
                    continue;
                }
                Ok(Ok(Err(e))) => e.to_string(),
                Ok(Err(_)) => format!("timed out after {:?}", self.miner_timeout),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            tracing::warn!(tenant = %tenant_id, miner = %kind, %reason, "Miner failed, continuing without it");
            failures.push(MinerFailure {
                miner: kind,
                reason,
            });
        }

        RankedInsights {
            insights: rank(found, self.max_insights),
            failures,
        }
    }
}
