//! Append-only report history.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{Row, params};
use uuid::Uuid;

use super::SharedDatabase;
use super::metrics_reader::{DATE_FORMAT, TIMESTAMP_FORMAT};
use crate::types::{Cadence, ReportHistory, ReportStatus, Result, Transport};

/// Record to append; id and timestamp are assigned by the store
#[derive(Debug, Clone)]
pub struct NewHistory {
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
}

#[derive(Clone)]
pub struct HistoryStore {
    db: SharedDatabase,
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn text_error(idx: usize, message: String) -> rusqlite::Error {
    conversion_error(
        idx,
        std::io::Error::new(std::io::ErrorKind::InvalidData, message),
    )
}

fn parse_json(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<serde_json::Value>> {
    raw.map(|s| serde_json::from_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn parse_date(idx: usize, raw: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn row_to_history(row: &Row<'_>) -> rusqlite::Result<ReportHistory> {
    let channel: Option<String> = row.get(10)?;
    Ok(ReportHistory {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        cadence: row
            .get::<_, String>(2)?
            .parse()
            .map_err(|e| text_error(2, e))?,
        period_start: parse_date(3, row.get(3)?)?,
        period_end: parse_date(4, row.get(4)?)?,
        kpis: parse_json(5, row.get(5)?)?,
        insights: parse_json(6, row.get(6)?)?,
        recommendation: row.get(7)?,
        status: row
            .get::<_, String>(8)?
            .parse()
            .map_err(|e| text_error(8, e))?,
        error_detail: row.get(9)?,
        channel: channel
            .map(|c| c.parse::<Transport>().map_err(|e| text_error(10, e)))
            .transpose()?,
        recipient: row.get(11)?,
        execution_ms: row.get::<_, i64>(12)?.max(0) as u64,
        created_at: NaiveDateTime::parse_from_str(&row.get::<_, String>(13)?, TIMESTAMP_FORMAT)
            .map(|dt| dt.and_utc())
            .map_err(|e| conversion_error(13, e))?,
    })
}

impl HistoryStore {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    /// Insert one record and return its id
    pub async fn append(&self, record: NewHistory) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let kpis = record.kpis.as_ref().map(serde_json::to_string).transpose()?;
        let insights = record
            .insights
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let row_id = id.clone();
        self.db
            .run_blocking(move |conn| {
                conn.execute(
                    "INSERT INTO report_history
                        (id, tenant_id, cadence, period_start, period_end, kpis_json,
                         insights_json, recommendation, status, error_detail, channel,
                         recipient, execution_ms, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    params![
                        row_id,
                        record.tenant_id,
                        record.cadence.as_str(),
                        record.period_start.format(DATE_FORMAT).to_string(),
                        record.period_end.format(DATE_FORMAT).to_string(),
                        kpis,
                        insights,
                        record.recommendation,
                        record.status.as_str(),
                        record.error_detail,
                        record.channel.map(|c| c.as_str()),
                        record.recipient,
                        record.execution_ms as i64,
                        Utc::now().format(TIMESTAMP_FORMAT).to_string(),
                    ],
                )?;
                Ok(())
            })
            .await?;

        tracing::debug!(history_id = %id, "History record appended");
        Ok(id)
    }

    /// Most recent records first, optionally for one tenant
    pub async fn list(&self, tenant_id: Option<&str>, limit: usize) -> Result<Vec<ReportHistory>> {
        let tenant_id = tenant_id.map(str::to_string);
        self.db
            .run_blocking(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, tenant_id, cadence, period_start, period_end, kpis_json,
                            insights_json, recommendation, status, error_detail, channel,
                            recipient, execution_ms, created_at
                     FROM report_history
                     WHERE ?1 IS NULL OR tenant_id = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?2",
                )?;
                let records = stmt
                    .query_map(params![tenant_id, limit as i64], row_to_history)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
    }
}
