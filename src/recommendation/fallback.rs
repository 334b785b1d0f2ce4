//! Rule-based recommendation used when the provider is unavailable.
//!
//! Deterministic and offline: the same snapshot and insights always give
//! the same text, and the text is never empty.

use crate::constants::recommendation::MAX_SENTENCES;
use crate::insights::{Insight, InsightDetail, SeasonalPattern};
use crate::kpi::KpiSnapshot;

const DECLINE_THRESHOLD_PCT: f64 = -10.0;
const GROWTH_THRESHOLD_PCT: f64 = 15.0;

fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

fn insight_sentence(insight: &Insight) -> String {
    match insight.detail() {
        InsightDetail::StockAlert { products } => {
            let names: Vec<String> = products.iter().map(|p| p.name.clone()).collect();
            if names.is_empty() {
                "Restock your low-stock products quickly to avoid missing sales.".to_string()
            } else {
                format!(
                    "Restock {} quickly to avoid missing sales.",
                    join_names(&names)
                )
            }
        }
        InsightDetail::ChurnRisk { count, .. } => format!(
            "Re-engage your {} lapsed regular customer{} with a personal message or a special offer.",
            count,
            if *count == 1 { "" } else { "s" }
        ),
        InsightDetail::Seasonality {
            pattern: SeasonalPattern::MidweekTrough,
            ..
        } => "Launch a mid-week promotion to fill your quieter Tuesdays and Wednesdays.".to_string(),
        InsightDetail::Seasonality { weekdays, .. } => format!(
            "Plan extra staff and stock for {}, your busiest days.",
            join_names(weekdays)
        ),
        InsightDetail::ProfitMargin { target_pct, .. } => format!(
            "Review your costs and prices to bring your margin back above {:.0}%.",
            target_pct
        ),
    }
}

/// Template recommendation from KPIs and ranked insights
pub fn fallback_recommendation(kpis: &KpiSnapshot, insights: &[Insight]) -> String {
    let mut sentences = Vec::new();

    let revenue_trend = kpis.revenue.evolution_pct;
    if revenue_trend < DECLINE_THRESHOLD_PCT {
        sentences.push(format!(
            "Revenue fell {:.1}% compared with the previous period: look at what changed and run a targeted promotion to bring customers back.",
            revenue_trend.abs()
        ));
    } else if revenue_trend > GROWTH_THRESHOLD_PCT {
        sentences.push(
            "Sales are growing strongly, so make the most of the momentum by keeping your best sellers well stocked."
                .to_string(),
        );
    }

    sentences.extend(insights.iter().map(insight_sentence));

    if sentences.len() < 2 {
        if let Some(best) = kpis.best_seller() {
            sentences.push(format!(
                "Put {} forward, your best seller this period, to draw in more customers.",
                best.name
            ));
        }
    }

    if sentences.is_empty() {
        sentences.push(
            "Keep a close eye on your sales and stock levels over the coming period.".to_string(),
        );
    }

    sentences.truncate(MAX_SENTENCES);
    sentences.join(" ")
}
