//! Stock alert miner: products strictly below their alert threshold.

use serde::Serialize;

use super::{Insight, InsightDetail, InsightKind, PeriodData};
use crate::storage::InventoryItem;
use crate::types::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowStockProduct {
    pub name: String,
    pub quantity: i64,
    pub alert_threshold: i64,
}

impl LowStockProduct {
    fn describe(&self) -> String {
        format!(
            "{} ({} left, alert at {})",
            self.name, self.quantity, self.alert_threshold
        )
    }

    fn fill_ratio(&self) -> f64 {
        if self.alert_threshold <= 0 {
            return 0.0;
        }
        self.quantity as f64 / self.alert_threshold as f64
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StockAlertMiner;

impl StockAlertMiner {
    pub async fn detect(&self, tenant_id: &str, data: &PeriodData<'_>) -> Result<Vec<Insight>> {
        let inventory = data.source.read_inventory(tenant_id).await?;
        Ok(self.evaluate(&inventory).into_iter().collect())
    }

    /// Single finding covering every low product, most depleted first
    pub fn evaluate(&self, inventory: &[InventoryItem]) -> Option<Insight> {
        let mut low: Vec<LowStockProduct> = inventory
            .iter()
            .filter(|item| item.quantity < item.alert_threshold)
            .map(|item| LowStockProduct {
                name: item.product_name.clone(),
                quantity: item.quantity,
                alert_threshold: item.alert_threshold,
            })
            .collect();

        if low.is_empty() {
            return None;
        }
        low.sort_by(|a, b| a.fill_ratio().total_cmp(&b.fill_ratio()));

        let message = match low.as_slice() {
            [only] => format!(
                "{} is at risk of running out ({} left, alert at {})",
                only.name, only.quantity, only.alert_threshold
            ),
            many => format!(
                "{} products are running low: {}",
                many.len(),
                many.iter()
                    .map(LowStockProduct::describe)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };

        Some(Insight::new(
            InsightKind::StockAlert,
            message,
            InsightDetail::StockAlert { products: low },
        ))
    }
}
