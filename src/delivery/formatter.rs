//! Message Formatter
//!
//! Renders a report digest as plain text with emoji markers, and splits
//! long messages for transports with a per-message character limit.

use crate::insights::{Insight, InsightKind};
use crate::kpi::{KpiSnapshot, format_amount, format_evolution};
use crate::types::ReportPeriod;

/// Everything shown in one digest
pub struct DigestInput<'a> {
    pub tenant_name: &'a str,
    pub currency: &'a str,
    pub period: &'a ReportPeriod,
    pub kpis: &'a KpiSnapshot,
    pub insights: &'a [Insight],
    pub recommendation: &'a str,
}

/// Period qualifier from the revenue evolution
pub fn period_qualifier(revenue_evolution_pct: f64) -> &'static str {
    match revenue_evolution_pct {
        pct if pct > 15.0 => "very good",
        pct if pct > 5.0 => "good",
        pct if pct > -5.0 => "steady",
        pct if pct > -15.0 => "quieter",
        _ => "difficult",
    }
}

pub fn insight_emoji(kind: InsightKind) -> &'static str {
    match kind {
        InsightKind::StockAlert => "⚠️",
        InsightKind::ChurnRisk => "😴",
        InsightKind::Seasonality => "📊",
        InsightKind::ProfitMargin => "💹",
    }
}

#[derive(Debug, Clone, Default)]
pub struct MessageFormatter;

impl MessageFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn format(&self, input: &DigestInput<'_>) -> String {
        let kpis = input.kpis;
        let mut lines = vec![
            format!("Hello {} 👋", input.tenant_name),
            String::new(),
            format!(
                "Here is your summary for the {}: a {} period.",
                input.period.label(),
                period_qualifier(kpis.revenue.evolution_pct)
            ),
            String::new(),
            format!(
                "💰 Revenue: {} {} {}",
                format_amount(kpis.revenue.current),
                input.currency,
                format_evolution(kpis.revenue.evolution_pct)
            ),
            format!(
                "📦 Orders: {} {}",
                kpis.order_count.current,
                format_evolution(kpis.order_count.evolution_pct)
            ),
            format!(
                "🛒 Average basket: {} {} {}",
                format_amount(kpis.average_order_value.current),
                input.currency,
                format_evolution(kpis.average_order_value.evolution_pct)
            ),
        ];

        if !kpis.top_products.is_empty() {
            let top = kpis
                .top_products
                .iter()
                .map(|p| format!("{} ({} sold)", p.name, p.units_sold))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("⭐ Best sellers: {}", top));
        }

        if !input.insights.is_empty() {
            lines.push(String::new());
            for insight in input.insights {
                lines.push(format!(
                    "{} {}",
                    insight_emoji(insight.kind()),
                    insight.message()
                ));
            }
        }

        lines.push(String::new());
        lines.push(format!(
            "All things considered, we suggest: {}",
            input.recommendation
        ));

        lines.join("\n")
    }
}

/// Split `text` into chunks of at most `limit` characters.
///
/// Breaks at line boundaries when possible; a single overlong line is cut
/// on character boundaries.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        let needed = if current.is_empty() {
            line_len
        } else {
            current_len + 1 + line_len
        };

        if needed <= limit {
            if !current.is_empty() {
                current.push('\n');
                current_len += 1;
            }
            current.push_str(line);
            current_len += line_len;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len <= limit {
            current.push_str(line);
            current_len = line_len;
        } else {
            let chars: Vec<char> = line.chars().collect();
            let mut last = None;
            for piece in chars.chunks(limit).map(|c| c.iter().collect::<String>()) {
                if let Some(prev) = last.replace(piece) {
                    chunks.push(prev);
                }
            }
            if let Some(tail) = last {
                current_len = tail.chars().count();
                current = tail;
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
