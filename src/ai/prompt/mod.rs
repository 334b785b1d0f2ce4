//! Prompt Builder System
//!
//! Sectioned prompt construction for the recommendation provider.
//!
//! ## Layout
//!
//! 1. **Role**: who the model speaks as
//! 2. **Context**: ordered key/value facts about the tenant and period
//! 3. **Text sections**: free-form blocks with optional headers
//! 4. **Instructions**: numbered rules for the answer

use crate::insights::Insight;
use crate::kpi::{KpiSnapshot, format_amount, format_evolution};
use crate::types::ReportPeriod;

/// Prompt section types
#[derive(Debug, Clone)]
pub enum PromptSection {
    Role { expertise: String, task: String },
    /// Ordered key/value pairs
    Context(Vec<(String, String)>),
    Text {
        header: Option<String>,
        content: String,
    },
    /// Numbered rules
    Instructions(Vec<String>),
}

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<PromptSection>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, expertise: &str, task: &str) -> Self {
        self.sections.push(PromptSection::Role {
            expertise: expertise.to_string(),
            task: task.to_string(),
        });
        self
    }

    /// Add a context item, appending to the existing context section
    pub fn context_item(mut self, key: &str, value: &str) -> Self {
        let item = (key.to_string(), value.to_string());
        let existing = self
            .sections
            .iter()
            .position(|s| matches!(s, PromptSection::Context(_)));
        match existing.map(|idx| &mut self.sections[idx]) {
            Some(PromptSection::Context(items)) => items.push(item),
            _ => self.sections.push(PromptSection::Context(vec![item])),
        }
        self
    }

    pub fn section(mut self, header: &str, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: Some(header.to_string()),
            content: content.to_string(),
        });
        self
    }

    pub fn instructions(mut self, rules: Vec<&str>) -> Self {
        self.sections.push(PromptSection::Instructions(
            rules.into_iter().map(String::from).collect(),
        ));
        self
    }

    /// Build the final prompt string
    pub fn build(self) -> String {
        let mut prompt = String::new();

        for section in self.sections {
            match section {
                PromptSection::Role { expertise, task } => {
                    prompt.push_str(&format!(
                        "You are an expert {} specializing in {}.\n\n",
                        expertise, task
                    ));
                }
                PromptSection::Context(items) => {
                    prompt.push_str("# Context\n\n");
                    for (key, value) in items {
                        prompt.push_str(&format!("{}: {}\n", key, value));
                    }
                    prompt.push('\n');
                }
                PromptSection::Text { header, content } => {
                    if let Some(h) = header {
                        prompt.push_str(&format!("# {}\n\n", h));
                    }
                    prompt.push_str(&content);
                    prompt.push_str("\n\n");
                }
                PromptSection::Instructions(rules) => {
                    prompt.push_str("# Instructions\n\n");
                    for (i, rule) in rules.iter().enumerate() {
                        prompt.push_str(&format!("{}. {}\n", i + 1, rule));
                    }
                    prompt.push('\n');
                }
            }
        }

        prompt.trim_end().to_string()
    }
}

// =============================================================================
// Recommendation Prompt
// =============================================================================

/// Prompt asking for a short, actionable recommendation
pub struct RecommendationPrompt<'a> {
    pub tenant_name: &'a str,
    pub period: &'a ReportPeriod,
    pub currency: &'a str,
    pub kpis: &'a KpiSnapshot,
    pub insights: &'a [Insight],
}

impl RecommendationPrompt<'_> {
    pub fn build(&self) -> String {
        let kpis = self.kpis;
        let mut builder = PromptBuilder::new()
            .role(
                "small-business advisor",
                "turning weekly and monthly figures into concrete actions",
            )
            .context_item("Business", self.tenant_name)
            .context_item("Period", &self.period.label())
            .context_item(
                "Revenue",
                &format!(
                    "{} {} {}",
                    format_amount(kpis.revenue.current),
                    self.currency,
                    format_evolution(kpis.revenue.evolution_pct)
                ),
            )
            .context_item(
                "Orders",
                &format!(
                    "{} {}",
                    kpis.order_count.current,
                    format_evolution(kpis.order_count.evolution_pct)
                ),
            )
            .context_item(
                "Average basket",
                &format!(
                    "{} {} {}",
                    format_amount(kpis.average_order_value.current),
                    self.currency,
                    format_evolution(kpis.average_order_value.evolution_pct)
                ),
            )
            .context_item("Customers", &kpis.unique_customers.to_string());

        if !kpis.top_products.is_empty() {
            let top = kpis
                .top_products
                .iter()
                .map(|p| format!("{} ({} sold)", p.name, p.units_sold))
                .collect::<Vec<_>>()
                .join(", ");
            builder = builder.context_item("Best sellers", &top);
        }

        if let Some(last_year) = &kpis.last_year {
            builder = builder.context_item(
                "Same period last year",
                &format!(
                    "{} {} revenue, {} orders",
                    format_amount(last_year.revenue),
                    self.currency,
                    last_year.order_count
                ),
            );
        }

        let findings = if self.insights.is_empty() {
            "Nothing unusual was detected.".to_string()
        } else {
            self.insights
                .iter()
                .map(|i| format!("- {}", i.message()))
                .collect::<Vec<_>>()
                .join("\n")
        };

        builder
            .section("Detected insights", &findings)
            .instructions(vec![
                "Do not repeat the figures above, the owner already sees them",
                "Turn the insights into concrete actions for the coming days",
                "Be direct and address the owner as \"you\"",
                "Write at most 4 short sentences, one action per sentence",
                "No lists, no headings, no markdown",
            ])
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insights::{InsightDetail, InsightKind};
    use crate::kpi::{KpiCalculator, PeriodAggregate, PeriodSummary, ProductUnits};
    use crate::types::Cadence;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn snapshot() -> KpiSnapshot {
        let current = PeriodAggregate {
            revenue: Decimal::from(1_000_000),
            order_count: 40,
            unique_customers: 25,
            product_units: vec![ProductUnits::new("Croissant", 30)],
            ..Default::default()
        };
        let previous = PeriodAggregate {
            revenue: Decimal::from(800_000),
            order_count: 32,
            ..Default::default()
        };
        KpiCalculator::default().compute(&current, &previous)
    }

    #[test]
    fn test_builder_sections() {
        let prompt = PromptBuilder::new()
            .role("advisor", "bakeries")
            .context_item("Business", "Boulangerie")
            .context_item("Period", "week of 13 to 19 January")
            .instructions(vec!["Be brief", "No markdown"])
            .build();

        assert!(prompt.starts_with("You are an expert advisor specializing in bakeries."));
        assert!(prompt.contains("Business: Boulangerie\nPeriod: week of 13 to 19 January"));
        assert!(prompt.contains("1. Be brief\n2. No markdown"));
    }

    #[test]
    fn test_recommendation_prompt_content() {
        let period = ReportPeriod::for_cadence(
            Cadence::Weekly,
            NaiveDate::from_ymd_opt(2026, 1, 19).unwrap(),
        );
        let kpis = snapshot().with_last_year(Some(PeriodSummary {
            revenue: Decimal::from(700_000),
            order_count: 30,
            average_order_value: Decimal::ZERO,
            unique_customers: 20,
        }));
        let insights = vec![Insight::new(
            InsightKind::StockAlert,
            "Croissant is at risk of running out (5 left, alert at 15)",
            InsightDetail::StockAlert { products: vec![] },
        )];

        let prompt = RecommendationPrompt {
            tenant_name: "Boulangerie du Coin",
            period: &period,
            currency: "XAF",
            kpis: &kpis,
            insights: &insights,
        }
        .build();

        assert!(prompt.contains("Business: Boulangerie du Coin"));
        assert!(prompt.contains("Revenue: 1 000 000 XAF (+25.0%)"));
        assert!(prompt.contains("Best sellers: Croissant (30 sold)"));
        assert!(prompt.contains("Same period last year: 700 000 XAF revenue, 30 orders"));
        assert!(prompt.contains("- Croissant is at risk of running out"));
        assert!(prompt.contains("at most 4 short sentences"));
    }
}
