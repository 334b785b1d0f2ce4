//! Seasonality miner: weekday distribution of the period's orders.

use chrono::{Datelike, NaiveDateTime};
use serde::Serialize;

use super::{Insight, InsightDetail, InsightKind, PeriodData};
use crate::config::InsightsConfig;

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalPattern {
    /// Two busiest days carry most of the volume
    Concentration,
    /// Tuesday and Wednesday are nearly empty
    MidweekTrough,
}

#[derive(Debug, Clone)]
pub struct SeasonalityMiner {
    pub concentration_share: f64,
    pub trough_share: f64,
}

/// Orders per weekday, Monday first
pub fn weekday_distribution(order_times: &[NaiveDateTime]) -> [u64; 7] {
    let mut buckets = [0u64; 7];
    for time in order_times {
        buckets[time.weekday().num_days_from_monday() as usize] += 1;
    }
    buckets
}

fn percent(share: f64) -> i64 {
    (share * 100.0).round() as i64
}

impl SeasonalityMiner {
    pub fn from_config(config: &InsightsConfig) -> Self {
        Self {
            concentration_share: config.concentration_share,
            trough_share: config.trough_share,
        }
    }

    pub fn detect(&self, data: &PeriodData<'_>) -> Vec<Insight> {
        self.evaluate(data.order_times)
    }

    pub fn evaluate(&self, order_times: &[NaiveDateTime]) -> Vec<Insight> {
        let distribution = weekday_distribution(order_times);
        let total: u64 = distribution.iter().sum();
        if total == 0 {
            return Vec::new();
        }
        let total = total as f64;
        let mut insights = Vec::new();

        // Stable sort keeps Monday-first order between equal days
        let mut ranked: Vec<usize> = (0..7).collect();
        ranked.sort_by(|a, b| distribution[*b].cmp(&distribution[*a]));
        let (first, second) = (ranked[0], ranked[1]);
        let top_share = (distribution[first] + distribution[second]) as f64 / total;
        if top_share >= self.concentration_share {
            insights.push(Insight::new(
                InsightKind::Seasonality,
                format!(
                    "{} and {} bring in {}% of your orders",
                    WEEKDAYS[first],
                    WEEKDAYS[second],
                    percent(top_share)
                ),
                InsightDetail::Seasonality {
                    pattern: SeasonalPattern::Concentration,
                    share: top_share,
                    weekdays: vec![WEEKDAYS[first].to_string(), WEEKDAYS[second].to_string()],
                    distribution,
                },
            ));
        }

        let midweek_share = (distribution[1] + distribution[2]) as f64 / total;
        if midweek_share < self.trough_share {
            insights.push(Insight::new(
                InsightKind::Seasonality,
                format!(
                    "Tuesday and Wednesday account for only {}% of your orders",
                    percent(midweek_share)
                ),
                InsightDetail::Seasonality {
                    pattern: SeasonalPattern::MidweekTrough,
                    share: midweek_share,
                    weekdays: vec![WEEKDAYS[1].to_string(), WEEKDAYS[2].to_string()],
                    distribution,
                },
            ));
        }

        insights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insights::test_support::date;

    fn miner() -> SeasonalityMiner {
        SeasonalityMiner::from_config(&InsightsConfig::default())
    }

    /// `counts[i]` orders on the i-th day of the week of 2026-01-12 (a Monday)
    fn orders(counts: [u32; 7]) -> Vec<NaiveDateTime> {
        let mut times = Vec::new();
        for (offset, count) in counts.iter().enumerate() {
            let day = date(2026, 1, 12 + offset as u32);
            for hour in 0..*count {
                times.push(day.and_hms_opt(8 + hour % 10, 0, 0).unwrap());
            }
        }
        times
    }

    fn pattern(insight: &Insight) -> SeasonalPattern {
        match insight.detail() {
            InsightDetail::Seasonality { pattern, .. } => *pattern,
            other => panic!("unexpected detail {:?}", other),
        }
    }

    #[test]
    fn test_empty_set_has_no_finding() {
        assert!(miner().evaluate(&[]).is_empty());
    }

    #[test]
    fn test_distribution() {
        assert_eq!(
            weekday_distribution(&orders([1, 0, 2, 0, 0, 0, 3])),
            [1, 0, 2, 0, 0, 0, 3]
        );
    }

    #[test]
    fn test_even_week_has_no_finding() {
        assert!(miner().evaluate(&orders([2, 2, 2, 2, 2, 2, 2])).is_empty());
    }

    #[test]
    fn test_weekend_concentration_and_trough() {
        let insights = miner().evaluate(&orders([1, 0, 1, 1, 2, 5, 2]));
        assert_eq!(insights.len(), 2);

        assert_eq!(pattern(&insights[0]), SeasonalPattern::Concentration);
        // Saturday 5, then Friday and Sunday tie at 2: Friday comes first
        assert_eq!(
            insights[0].message(),
            "Saturday and Friday bring in 58% of your orders"
        );

        assert_eq!(pattern(&insights[1]), SeasonalPattern::MidweekTrough);
        assert_eq!(
            insights[1].message(),
            "Tuesday and Wednesday account for only 8% of your orders"
        );
    }

    #[test]
    fn test_concentration_threshold_is_inclusive() {
        // 5 of 10 orders on Monday + Thursday
        let insights = miner().evaluate(&orders([3, 1, 1, 2, 1, 1, 1]));
        assert_eq!(insights.len(), 1);
        assert_eq!(pattern(&insights[0]), SeasonalPattern::Concentration);
        assert!(insights[0].message().starts_with("Monday and Thursday"));
    }
}
