//! Insight Mining
//!
//! A fixed set of independent detectors. Each [`Miner`] looks at one
//! tenant's period data and KPI snapshot and reports zero or more
//! [`Insight`]s. Severity is a property of the insight kind, never of the
//! individual finding.
//!
//! ```text
//! Miner::StockAlert    (5)  products below their alert threshold
//! Miner::ChurnRisk     (4)  frequent customers gone quiet
//! Miner::Seasonality   (3)  weekday concentration or mid-week trough
//! Miner::ProfitMargin  (2)  gross margin under target
//! ```
//!
//! The [`ranker`] runs all miners with per-miner isolation and keeps the
//! most severe findings.

pub mod churn_risk;
pub mod profit_margin;
pub mod ranker;
pub mod seasonality;
pub mod stock_alert;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use crate::config::InsightsConfig;
use crate::kpi::KpiSnapshot;
use crate::storage::MetricsReader;
use crate::types::{ReportPeriod, Result};

pub use churn_risk::ChurnRiskMiner;
pub use profit_margin::ProfitMarginMiner;
pub use ranker::{InsightRanker, MinerFailure, RankedInsights};
pub use seasonality::{SeasonalPattern, SeasonalityMiner};
pub use stock_alert::{LowStockProduct, StockAlertMiner};

// =============================================================================
// Insight
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    StockAlert,
    ChurnRisk,
    Seasonality,
    ProfitMargin,
}

impl InsightKind {
    /// Fixed severity per kind, higher is more urgent
    pub fn severity(&self) -> u8 {
        match self {
            InsightKind::StockAlert => 5,
            InsightKind::ChurnRisk => 4,
            InsightKind::Seasonality => 3,
            InsightKind::ProfitMargin => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InsightKind::StockAlert => "stock_alert",
            InsightKind::ChurnRisk => "churn_risk",
            InsightKind::Seasonality => "seasonality",
            InsightKind::ProfitMargin => "profit_margin",
        }
    }
}

impl fmt::Display for InsightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific structured payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InsightDetail {
    StockAlert {
        products: Vec<LowStockProduct>,
    },
    ChurnRisk {
        count: usize,
        window_days: u32,
        sample: Vec<String>,
    },
    Seasonality {
        pattern: SeasonalPattern,
        share: f64,
        weekdays: Vec<String>,
        /// Orders per weekday, Monday first
        distribution: [u64; 7],
    },
    ProfitMargin {
        margin_pct: f64,
        target_pct: f64,
        revenue: Decimal,
        cost: Decimal,
    },
}

/// One severity-scored finding. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    kind: InsightKind,
    severity: u8,
    message: String,
    detail: InsightDetail,
}

impl Insight {
    pub fn new(kind: InsightKind, message: impl Into<String>, detail: InsightDetail) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message: message.into(),
            detail,
        }
    }

    pub fn kind(&self) -> InsightKind {
        self.kind
    }

    pub fn severity(&self) -> u8 {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> &InsightDetail {
        &self.detail
    }
}

// =============================================================================
// Miner
// =============================================================================

/// Inputs shared by every miner for one run
#[derive(Clone, Copy)]
pub struct PeriodData<'a> {
    pub period: ReportPeriod,
    pub as_of: NaiveDate,
    /// Current period order timestamps
    pub order_times: &'a [NaiveDateTime],
    pub source: &'a dyn MetricsReader,
}

/// Closed set of detectors
#[derive(Debug, Clone)]
pub enum Miner {
    StockAlert(StockAlertMiner),
    ChurnRisk(ChurnRiskMiner),
    Seasonality(SeasonalityMiner),
    ProfitMargin(ProfitMarginMiner),
}

impl Miner {
    /// All four miners, thresholds from configuration
    pub fn standard_set(config: &InsightsConfig) -> Vec<Miner> {
        vec![
            Miner::StockAlert(StockAlertMiner),
            Miner::ChurnRisk(ChurnRiskMiner::from_config(config)),
            Miner::Seasonality(SeasonalityMiner::from_config(config)),
            Miner::ProfitMargin(ProfitMarginMiner::from_config(config)),
        ]
    }

    pub fn kind(&self) -> InsightKind {
        match self {
            Miner::StockAlert(_) => InsightKind::StockAlert,
            Miner::ChurnRisk(_) => InsightKind::ChurnRisk,
            Miner::Seasonality(_) => InsightKind::Seasonality,
            Miner::ProfitMargin(_) => InsightKind::ProfitMargin,
        }
    }

    pub async fn detect(
        &self,
        tenant_id: &str,
        data: &PeriodData<'_>,
        kpis: &KpiSnapshot,
    ) -> Result<Vec<Insight>> {
        match self {
            Miner::StockAlert(miner) => miner.detect(tenant_id, data).await,
            Miner::ChurnRisk(miner) => miner.detect(tenant_id, data).await,
            Miner::Seasonality(miner) => Ok(miner.detect(data)),
            Miner::ProfitMargin(miner) => miner.detect(tenant_id, data, kpis).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::kpi::{KpiCalculator, PeriodAggregate};
    use crate::storage::{InventoryItem, LapsedCustomer};
    use crate::types::{Cadence, PulseError, TenantProfile};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// In-memory reader with switchable failures
    #[derive(Default)]
    pub struct StubReader {
        pub inventory: Vec<InventoryItem>,
        pub lapsed: Vec<LapsedCustomer>,
        pub cost: Option<Decimal>,
        pub fail_inventory: bool,
        pub panic_lapsed: bool,
        pub slow_cost: bool,
        pub calls: AtomicU32,
    }

    #[async_trait]
    impl MetricsReader for StubReader {
        async fn read_period(
            &self,
            _tenant_id: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<crate::kpi::PeriodAggregate> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PeriodAggregate::default())
        }

        async fn read_inventory(&self, _tenant_id: &str) -> Result<Vec<InventoryItem>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_inventory {
                return Err(PulseError::data_access("inventory table unavailable"));
            }
            Ok(self.inventory.clone())
        }

        async fn tenant_profile(&self, tenant_id: &str) -> Result<Option<TenantProfile>> {
            Ok(Some(TenantProfile {
                id: tenant_id.to_string(),
                name: "Boulangerie".to_string(),
                currency_code: "XAF".to_string(),
            }))
        }

        async fn last_activity_date(
            &self,
            _tenant_id: &str,
            as_of: NaiveDate,
        ) -> Result<Option<NaiveDate>> {
            Ok(Some(as_of))
        }

        async fn read_lapsed_customers(
            &self,
            _tenant_id: &str,
            _as_of: NaiveDate,
            _window_days: u32,
            _min_orders: u32,
        ) -> Result<Vec<LapsedCustomer>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_lapsed {
                panic!("customer index corrupted");
            }
            Ok(self.lapsed.clone())
        }

        async fn read_cost_total(
            &self,
            _tenant_id: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Option<Decimal>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.slow_cost {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
            Ok(self.cost)
        }
    }

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn weekly_period() -> ReportPeriod {
        ReportPeriod::for_cadence(Cadence::Weekly, date(2026, 1, 19))
    }

    pub fn period_data<'a>(
        source: &'a dyn MetricsReader,
        order_times: &'a [NaiveDateTime],
    ) -> PeriodData<'a> {
        PeriodData {
            period: weekly_period(),
            as_of: date(2026, 1, 19),
            order_times,
            source,
        }
    }

    pub fn snapshot(revenue: i64) -> KpiSnapshot {
        let current = PeriodAggregate {
            revenue: Decimal::from(revenue),
            order_count: 10,
            ..Default::default()
        };
        KpiCalculator::default().compute(&current, &PeriodAggregate::default())
    }

    pub fn item(name: &str, quantity: i64, alert: i64) -> InventoryItem {
        InventoryItem {
            product_name: name.to_string(),
            quantity,
            alert_threshold: alert,
        }
    }
}
