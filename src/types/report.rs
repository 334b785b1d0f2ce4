//! Report domain types shared by the pipeline, the stores and the CLI.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Result, ValidationError, ValidationErrorKind};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

fn month_name(date: NaiveDate) -> &'static str {
    MONTH_NAMES[date.month0() as usize]
}

// =============================================================================
// Cadence
// =============================================================================

/// Reporting frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    #[default]
    Weekly,
    Monthly,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
        }
    }

    /// Next scheduled report date strictly after `date`.
    ///
    /// Weekly reports go out on Mondays, monthly reports on the 1st.
    pub fn next_run_after(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Cadence::Weekly => {
                let offset = 7 - u64::from(date.weekday().num_days_from_monday());
                date + Days::new(offset)
            }
            Cadence::Monthly => date
                .with_day(1)
                .and_then(|first| first.checked_add_months(Months::new(1)))
                .unwrap_or(date + Days::new(31)),
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weekly" => Ok(Cadence::Weekly),
            "monthly" => Ok(Cadence::Monthly),
            _ => Err(format!(
                "Unknown cadence: {}. Valid values: weekly, monthly",
                s
            )),
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Named delivery transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    WhatsApp,
    Telegram,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::WhatsApp => "whatsapp",
            Transport::Telegram => "telegram",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "whatsapp" => Ok(Transport::WhatsApp),
            "telegram" => Ok(Transport::Telegram),
            _ => Err(format!(
                "Unknown channel: {}. Valid values: whatsapp, telegram",
                s
            )),
        }
    }
}

// =============================================================================
// Report Status
// =============================================================================

/// Terminal outcome of one orchestrator invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Failed,
    Skipped,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Success => "success",
            ReportStatus::Failed => "failed",
            ReportStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(ReportStatus::Success),
            "failed" => Ok(ReportStatus::Failed),
            "skipped" => Ok(ReportStatus::Skipped),
            _ => Err(format!("Unknown report status: {}", s)),
        }
    }
}

// =============================================================================
// Report Period
// =============================================================================

/// Contiguous reporting window, both bounds inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub cadence: Cadence,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportPeriod {
    /// Period ending on `end` for the given cadence.
    ///
    /// Weekly covers the seven days ending on `end`; monthly runs from the
    /// first of `end`'s month.
    pub fn for_cadence(cadence: Cadence, end: NaiveDate) -> Self {
        let start = match cadence {
            Cadence::Weekly => end - Days::new(6),
            Cadence::Monthly => end.with_day(1).unwrap_or(end),
        };
        Self { cadence, start, end }
    }

    pub fn explicit(cadence: Cadence, start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(ValidationError::new(
                ValidationErrorKind::Range,
                format!("period start {} is after end {}", start, end),
            )
            .with_field("period")
            .into());
        }
        Ok(Self { cadence, start, end })
    }

    /// Number of days covered, inclusive
    pub fn days(&self) -> u64 {
        (self.end - self.start).num_days().max(0) as u64 + 1
    }

    /// Equal-length window ending the day before `start`
    pub fn previous(&self) -> Self {
        let end = self.start - Days::new(1);
        let start = end - Days::new(self.days() - 1);
        Self {
            cadence: self.cadence,
            start,
            end,
        }
    }

    /// Same window one year (365 days) earlier
    pub fn last_year(&self) -> Self {
        Self {
            cadence: self.cadence,
            start: self.start - Days::new(365),
            end: self.end - Days::new(365),
        }
    }

    /// Human-readable label used in digests and prompts
    pub fn label(&self) -> String {
        match self.cadence {
            Cadence::Weekly if self.start.month() == self.end.month() => format!(
                "week of {} to {} {}",
                self.start.day(),
                self.end.day(),
                month_name(self.end)
            ),
            Cadence::Weekly => format!(
                "week of {} {} to {} {}",
                self.start.day(),
                month_name(self.start),
                self.end.day(),
                month_name(self.end)
            ),
            Cadence::Monthly => format!("month of {} {}", month_name(self.end), self.end.year()),
        }
    }
}

// =============================================================================
// Tenant & Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantProfile {
    pub id: String,
    pub name: String,
    pub currency_code: String,
}

/// Per-tenant report configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub tenant_id: String,
    pub cadence: Cadence,
    pub enabled: bool,
    pub channel: Transport,
    pub recipient: Option<String>,
    pub last_activity_date: Option<NaiveDate>,
    pub next_report_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One append-only execution record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportHistory {
    pub id: String,
    pub tenant_id: String,
    pub cadence: Cadence,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub kpis: Option<serde_json::Value>,
    pub insights: Option<serde_json::Value>,
    pub recommendation: Option<String>,
    pub status: ReportStatus,
    pub error_detail: Option<String>,
    pub channel: Option<Transport>,
    pub recipient: Option<String>,
    pub execution_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekly_period_and_previous() {
        let period = ReportPeriod::for_cadence(Cadence::Weekly, date(2026, 1, 19));
        assert_eq!(period.start, date(2026, 1, 13));
        assert_eq!(period.days(), 7);

        let previous = period.previous();
        assert_eq!(previous.end, date(2026, 1, 12));
        assert_eq!(previous.start, date(2026, 1, 6));
    }

    #[test]
    fn test_monthly_period_and_previous() {
        let period = ReportPeriod::for_cadence(Cadence::Monthly, date(2026, 3, 10));
        assert_eq!(period.start, date(2026, 3, 1));
        assert_eq!(period.days(), 10);

        let previous = period.previous();
        assert_eq!(previous.end, date(2026, 2, 28));
        assert_eq!(previous.start, date(2026, 2, 19));
    }

    #[test]
    fn test_explicit_period_rejects_inverted_bounds() {
        let err = ReportPeriod::explicit(Cadence::Weekly, date(2026, 1, 10), date(2026, 1, 9));
        assert!(err.is_err());
    }

    #[test]
    fn test_period_labels() {
        let same_month = ReportPeriod::for_cadence(Cadence::Weekly, date(2026, 1, 19));
        assert_eq!(same_month.label(), "week of 13 to 19 January");

        let spanning = ReportPeriod::for_cadence(Cadence::Weekly, date(2026, 2, 2));
        assert_eq!(spanning.label(), "week of 27 January to 2 February");

        let monthly = ReportPeriod::for_cadence(Cadence::Monthly, date(2026, 1, 31));
        assert_eq!(monthly.label(), "month of January 2026");
    }

    #[test]
    fn test_next_run_after() {
        // 2026-01-19 is a Monday
        assert_eq!(
            Cadence::Weekly.next_run_after(date(2026, 1, 19)),
            date(2026, 1, 26)
        );
        assert_eq!(
            Cadence::Weekly.next_run_after(date(2026, 1, 21)),
            date(2026, 1, 26)
        );
        assert_eq!(
            Cadence::Monthly.next_run_after(date(2026, 12, 15)),
            date(2027, 1, 1)
        );
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("Weekly".parse::<Cadence>().unwrap(), Cadence::Weekly);
        assert_eq!("telegram".parse::<Transport>().unwrap(), Transport::Telegram);
        assert!("sms".parse::<Transport>().is_err());
        assert_eq!("skipped".parse::<ReportStatus>().unwrap(), ReportStatus::Skipped);
    }
}
