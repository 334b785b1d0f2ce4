//! Profit margin miner: gross margin against a target.
//!
//! Cost data is optional. Without recorded expenses, or without revenue,
//! the miner stays silent.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::{Insight, InsightDetail, InsightKind, PeriodData};
use crate::config::InsightsConfig;
use crate::kpi::KpiSnapshot;
use crate::types::Result;

#[derive(Debug, Clone)]
pub struct ProfitMarginMiner {
    pub target_pct: f64,
}

/// `(revenue - cost) / revenue * 100`, `None` without revenue
pub fn gross_margin_pct(revenue: Decimal, cost: Decimal) -> Option<f64> {
    if revenue <= Decimal::ZERO {
        return None;
    }
    (revenue - cost)
        .checked_div(revenue)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .and_then(|pct| pct.to_f64())
}

impl ProfitMarginMiner {
    pub fn from_config(config: &InsightsConfig) -> Self {
        Self {
            target_pct: config.margin_target_pct,
        }
    }

    pub async fn detect(
        &self,
        tenant_id: &str,
        data: &PeriodData<'_>,
        kpis: &KpiSnapshot,
    ) -> Result<Vec<Insight>> {
        let cost = data
            .source
            .read_cost_total(tenant_id, data.period.start, data.period.end)
            .await?;
        Ok(cost
            .and_then(|cost| self.evaluate(kpis.revenue.current, cost))
            .into_iter()
            .collect())
    }

    pub fn evaluate(&self, revenue: Decimal, cost: Decimal) -> Option<Insight> {
        let margin = gross_margin_pct(revenue, cost)?;
        if margin >= self.target_pct {
            return None;
        }

        Some(Insight::new(
            InsightKind::ProfitMargin,
            format!(
                "Gross margin is {:.1}%, below the {:.0}% target",
                margin, self.target_pct
            ),
            InsightDetail::ProfitMargin {
                margin_pct: margin,
                target_pct: self.target_pct,
                revenue,
                cost,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insights::test_support::{StubReader, period_data, snapshot};
    use crate::storage::MetricsReader;

    fn miner() -> ProfitMarginMiner {
        ProfitMarginMiner::from_config(&InsightsConfig::default())
    }

    #[test]
    fn test_gross_margin() {
        assert_eq!(gross_margin_pct(Decimal::from(1000), Decimal::from(900)), Some(10.0));
        assert_eq!(gross_margin_pct(Decimal::ZERO, Decimal::from(10)), None);
    }

    #[test]
    fn test_below_target_is_flagged() {
        let insight = miner()
            .evaluate(Decimal::from(1000), Decimal::from(900))
            .unwrap();
        assert_eq!(insight.message(), "Gross margin is 10.0%, below the 20% target");
        assert_eq!(insight.severity(), 2);
    }

    #[test]
    fn test_healthy_margin_is_silent() {
        assert!(miner().evaluate(Decimal::from(1000), Decimal::from(800)).is_none());
        assert!(miner().evaluate(Decimal::from(1000), Decimal::from(100)).is_none());
    }

    #[tokio::test]
    async fn test_missing_costs_are_not_an_error() {
        let reader = StubReader::default();
        let source: &dyn MetricsReader = &reader;
        let data = period_data(source, &[]);
        let insights = miner().detect("t1", &data, &snapshot(1000)).await.unwrap();
        assert!(insights.is_empty());
    }

    #[tokio::test]
    async fn test_detect_with_costs() {
        let reader = StubReader {
            cost: Some(Decimal::from(950)),
            ..Default::default()
        };
        let source: &dyn MetricsReader = &reader;
        let data = period_data(source, &[]);
        let insights = miner().detect("t1", &data, &snapshot(1000)).await.unwrap();
        assert_eq!(insights.len(), 1);

        let zero_revenue = miner().detect("t1", &data, &snapshot(0)).await.unwrap();
        assert!(zero_revenue.is_empty());
    }
}
