//! Churn risk miner: previously frequent customers with no recent order.

use super::{Insight, InsightDetail, InsightKind, PeriodData};
use crate::config::InsightsConfig;
use crate::constants::insights::CHURN_SAMPLE_SIZE;
use crate::storage::LapsedCustomer;
use crate::types::Result;

#[derive(Debug, Clone)]
pub struct ChurnRiskMiner {
    /// Days without an order before a customer counts as lapsed
    pub inactive_days: u32,
    pub min_orders: u32,
    /// Finding raised only when the lapsed count exceeds this
    pub min_customers: u32,
}

impl ChurnRiskMiner {
    pub fn from_config(config: &InsightsConfig) -> Self {
        Self {
            inactive_days: config.churn_inactive_days,
            min_orders: config.churn_min_orders,
            min_customers: config.churn_min_customers,
        }
    }

    pub async fn detect(&self, tenant_id: &str, data: &PeriodData<'_>) -> Result<Vec<Insight>> {
        let lapsed = data
            .source
            .read_lapsed_customers(tenant_id, data.as_of, self.inactive_days, self.min_orders)
            .await?;
        Ok(self.evaluate(&lapsed).into_iter().collect())
    }

    pub fn evaluate(&self, lapsed: &[LapsedCustomer]) -> Option<Insight> {
        let count = lapsed.len();
        if count as u64 <= u64::from(self.min_customers) {
            return None;
        }

        let message = if count == 1 {
            format!(
                "1 regular customer has not ordered in {} days",
                self.inactive_days
            )
        } else {
            format!(
                "{} regular customers have not ordered in {} days",
                count, self.inactive_days
            )
        };

        Some(Insight::new(
            InsightKind::ChurnRisk,
            message,
            InsightDetail::ChurnRisk {
                count,
                window_days: self.inactive_days,
                sample: lapsed
                    .iter()
                    .take(CHURN_SAMPLE_SIZE)
                    .map(|c| c.name.clone())
                    .collect(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insights::test_support::date;

    fn lapsed(n: usize) -> Vec<LapsedCustomer> {
        (0..n)
            .map(|i| LapsedCustomer {
                name: format!("customer-{}", i),
                order_count: 3,
                last_order_date: date(2025, 11, 1),
            })
            .collect()
    }

    #[test]
    fn test_no_lapsed_customers() {
        let miner = ChurnRiskMiner::from_config(&InsightsConfig::default());
        assert!(miner.evaluate(&[]).is_none());
    }

    #[test]
    fn test_message_and_sample_cap() {
        let miner = ChurnRiskMiner::from_config(&InsightsConfig::default());
        let insight = miner.evaluate(&lapsed(12)).unwrap();
        assert_eq!(
            insight.message(),
            "12 regular customers have not ordered in 45 days"
        );
        match insight.detail() {
            InsightDetail::ChurnRisk {
                count,
                window_days,
                sample,
            } => {
                assert_eq!(*count, 12);
                assert_eq!(*window_days, 45);
                assert_eq!(sample.len(), 10);
            }
            other => panic!("unexpected detail {:?}", other),
        }

        let single = miner.evaluate(&lapsed(1)).unwrap();
        assert_eq!(
            single.message(),
            "1 regular customer has not ordered in 45 days"
        );
    }

    #[test]
    fn test_min_customers_threshold() {
        let miner = ChurnRiskMiner {
            inactive_days: 45,
            min_orders: 2,
            min_customers: 2,
        };
        assert!(miner.evaluate(&lapsed(2)).is_none());
        assert!(miner.evaluate(&lapsed(3)).is_some());
    }
}
