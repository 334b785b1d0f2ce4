//! KPI Calculator
//!
//! Turns two raw period aggregates (current and previous) into a
//! [`KpiSnapshot`]. Everything here is a pure function of its inputs: the
//! calculator never reads the data source itself.
//!
//! ## Conventions
//!
//! - Evolution is `(current - previous) / previous * 100`.
//! - previous = 0 and current > 0 gives exactly 100.0; both zero gives 0.0.
//! - Average order value is 0 when there are no orders.
//! - Top products keep first-seen order on equal unit counts.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::constants;

// =============================================================================
// Raw Aggregates
// =============================================================================

/// Units sold for one product, in first-seen order within the period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUnits {
    pub name: String,
    pub units: u64,
}

impl ProductUnits {
    pub fn new(name: impl Into<String>, units: u64) -> Self {
        Self {
            name: name.into(),
            units,
        }
    }
}

/// Raw metrics for one tenant and one date range
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodAggregate {
    pub revenue: Decimal,
    pub order_count: u64,
    pub unique_customers: u64,
    pub product_units: Vec<ProductUnits>,
    /// Order timestamps, ascending
    pub order_times: Vec<NaiveDateTime>,
}

// =============================================================================
// Snapshot
// =============================================================================

/// Current value, previous value and percentage evolution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison<T> {
    pub current: T,
    pub previous: T,
    pub evolution_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopProduct {
    pub name: String,
    pub units_sold: u64,
}

/// Single-period figures without comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub revenue: Decimal,
    pub order_count: u64,
    pub average_order_value: Decimal,
    pub unique_customers: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSnapshot {
    pub revenue: Comparison<Decimal>,
    pub order_count: Comparison<u64>,
    pub average_order_value: Comparison<Decimal>,
    pub unique_customers: u64,
    pub top_products: Vec<TopProduct>,
    /// Same period one year earlier, when it had orders
    pub last_year: Option<PeriodSummary>,
}

impl KpiSnapshot {
    pub fn with_last_year(mut self, last_year: Option<PeriodSummary>) -> Self {
        self.last_year = last_year;
        self
    }

    pub fn best_seller(&self) -> Option<&TopProduct> {
        self.top_products.first()
    }
}

// =============================================================================
// Calculations
// =============================================================================

/// Percentage change from `previous` to `current`
pub fn evolution(current: Decimal, previous: Decimal) -> f64 {
    if previous.is_zero() {
        return if current > Decimal::ZERO { 100.0 } else { 0.0 };
    }
    current
        .checked_sub(previous)
        .and_then(|delta| delta.checked_div(previous))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .and_then(|pct| pct.to_f64())
        .unwrap_or(0.0)
}

/// Revenue per order, unrounded; 0 without orders. Rounding is a display concern.
pub fn average_order_value(revenue: Decimal, order_count: u64) -> Decimal {
    if order_count == 0 {
        return Decimal::ZERO;
    }
    revenue
        .checked_div(Decimal::from(order_count))
        .unwrap_or(Decimal::ZERO)
}

/// Best sellers: units descending, first-seen order on ties, at most `n`
pub fn top_products(units: &[ProductUnits], n: usize) -> Vec<TopProduct> {
    let mut ranked: Vec<&ProductUnits> = units.iter().collect();
    // sort_by is stable, so equal counts keep their input order
    ranked.sort_by(|a, b| b.units.cmp(&a.units));
    ranked
        .into_iter()
        .take(n)
        .map(|p| TopProduct {
            name: p.name.clone(),
            units_sold: p.units,
        })
        .collect()
}

// =============================================================================
// Display
// =============================================================================

/// Whole amount with thousands separators, e.g. `1 250 000`
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp(0).abs().to_string();
    let digits = rounded.split('.').next().unwrap_or("0");
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    if amount.round_dp(0) < Decimal::ZERO {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// `(+12.5%)`, `(-3.0%)`, or `(steady)` when the rounded value is zero
pub fn format_evolution(pct: f64) -> String {
    let rounded = (pct * 10.0).round() / 10.0;
    if rounded == 0.0 {
        "(steady)".to_string()
    } else if rounded > 0.0 {
        format!("(+{:.1}%)", rounded)
    } else {
        format!("({:.1}%)", rounded)
    }
}

/// Builds KPI snapshots from raw aggregates
#[derive(Debug, Clone)]
pub struct KpiCalculator {
    top_n: usize,
}

impl Default for KpiCalculator {
    fn default() -> Self {
        Self::new(constants::pipeline::TOP_PRODUCTS)
    }
}

impl KpiCalculator {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    pub fn compute(&self, current: &PeriodAggregate, previous: &PeriodAggregate) -> KpiSnapshot {
        let aov_current = average_order_value(current.revenue, current.order_count);
        let aov_previous = average_order_value(previous.revenue, previous.order_count);

        KpiSnapshot {
            revenue: Comparison {
                current: current.revenue,
                previous: previous.revenue,
                evolution_pct: evolution(current.revenue, previous.revenue),
            },
            order_count: Comparison {
                current: current.order_count,
                previous: previous.order_count,
                evolution_pct: evolution(
                    Decimal::from(current.order_count),
                    Decimal::from(previous.order_count),
                ),
            },
            average_order_value: Comparison {
                current: aov_current,
                previous: aov_previous,
                evolution_pct: evolution(aov_current, aov_previous),
            },
            unique_customers: current.unique_customers,
            top_products: top_products(&current.product_units, self.top_n),
            last_year: None,
        }
    }

    pub fn summarize(&self, aggregate: &PeriodAggregate) -> PeriodSummary {
        PeriodSummary {
            revenue: aggregate.revenue,
            order_count: aggregate.order_count,
            average_order_value: average_order_value(aggregate.revenue, aggregate.order_count),
            unique_customers: aggregate.unique_customers,
        }
    }
}
