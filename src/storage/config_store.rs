//! Report configuration store
//!
//! One row per tenant. Mutated by administrative commands and by the
//! orchestrator's bookkeeping after a successful run.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::SharedDatabase;
use super::metrics_reader::{DATE_FORMAT, TIMESTAMP_FORMAT};
use crate::types::{
    Cadence, PulseError, ReportConfig, Result, Transport, ValidationError, ValidationErrorKind,
};

/// Administrative write for one tenant's configuration
#[derive(Debug, Clone)]
pub struct ConfigUpdate {
    pub tenant_id: String,
    pub cadence: Cadence,
    pub channel: Transport,
    pub recipient: Option<String>,
    pub enabled: bool,
}

#[derive(Clone)]
pub struct ReportConfigStore {
    db: SharedDatabase,
}

const SELECT_COLUMNS: &str = "tenant_id, cadence, enabled, channel, recipient,
    last_activity_date, next_report_date, created_at, updated_at";

fn now_text() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

fn parse_enum<T: std::str::FromStr<Err = String>>(idx: usize, raw: String) -> rusqlite::Result<T> {
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}

fn parse_opt_date(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    raw.map(|s| {
        NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

fn parse_utc(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
        .map(|dt| dt.and_utc())
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_config(row: &Row<'_>) -> rusqlite::Result<ReportConfig> {
    Ok(ReportConfig {
        tenant_id: row.get(0)?,
        cadence: parse_enum(1, row.get(1)?)?,
        enabled: row.get::<_, i64>(2)? != 0,
        channel: parse_enum(3, row.get(3)?)?,
        recipient: row.get(4)?,
        last_activity_date: parse_opt_date(5, row.get(5)?)?,
        next_report_date: parse_opt_date(6, row.get(6)?)?,
        created_at: parse_utc(7, row.get(7)?)?,
        updated_at: parse_utc(8, row.get(8)?)?,
    })
}

fn select_one(conn: &Connection, tenant_id: &str) -> Result<Option<ReportConfig>> {
    let sql = format!(
        "SELECT {} FROM report_configs WHERE tenant_id = ?1",
        SELECT_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![tenant_id], row_to_config)
        .optional()?)
}

impl ReportConfigStore {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    pub async fn get(&self, tenant_id: &str) -> Result<Option<ReportConfig>> {
        let tenant_id = tenant_id.to_string();
        self.db
            .run_blocking(move |conn| select_one(conn, &tenant_id))
            .await
    }

    /// Create or replace a tenant's configuration, keeping its bookkeeping dates.
    /// The tenant check, the write and the read-back share one transaction.
    pub async fn upsert(&self, update: ConfigUpdate) -> Result<ReportConfig> {
        self.db
            .run_transaction(move |conn| {
                let known: Option<String> = conn
                    .query_row(
                        "SELECT id FROM tenants WHERE id = ?1 AND deleted_at IS NULL",
                        params![update.tenant_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if known.is_none() {
                    return Err(ValidationError::new(
                        ValidationErrorKind::UnknownTenant,
                        format!("unknown tenant '{}'", update.tenant_id),
                    )
                    .with_field("tenant_id")
                    .into());
                }

                let now = now_text();
                conn.execute(
                    "INSERT INTO report_configs
                        (tenant_id, cadence, enabled, channel, recipient, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                     ON CONFLICT(tenant_id) DO UPDATE SET
                        cadence = excluded.cadence,
                        enabled = excluded.enabled,
                        channel = excluded.channel,
                        recipient = excluded.recipient,
                        updated_at = excluded.updated_at",
                    params![
                        update.tenant_id,
                        update.cadence.as_str(),
                        update.enabled as i64,
                        update.channel.as_str(),
                        update.recipient,
                        now
                    ],
                )?;

                select_one(conn, &update.tenant_id)?.ok_or_else(|| {
                    PulseError::Storage(format!(
                        "configuration for '{}' vanished after upsert",
                        update.tenant_id
                    ))
                })
            })
            .await
    }

    /// Returns false when the tenant has no configuration
    pub async fn set_enabled(&self, tenant_id: &str, enabled: bool) -> Result<bool> {
        let tenant_id = tenant_id.to_string();
        self.db
            .run_blocking(move |conn| {
                let changed = conn.execute(
                    "UPDATE report_configs SET enabled = ?2, updated_at = ?3 WHERE tenant_id = ?1",
                    params![tenant_id, enabled as i64, now_text()],
                )?;
                Ok(changed > 0)
            })
            .await
    }

    /// Enabled configurations for `cadence` whose next report date has come
    pub async fn list_due(&self, cadence: Cadence, today: NaiveDate) -> Result<Vec<ReportConfig>> {
        self.db
            .run_blocking(move |conn| {
                let sql = format!(
                    "SELECT {} FROM report_configs
                     WHERE cadence = ?1 AND enabled = 1
                       AND (next_report_date IS NULL OR next_report_date <= ?2)
                     ORDER BY tenant_id ASC",
                    SELECT_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let configs = stmt
                    .query_map(
                        params![cadence.as_str(), today.format(DATE_FORMAT).to_string()],
                        row_to_config,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(configs)
            })
            .await
    }

    /// Bookkeeping after a successful run. Returns false without a config row.
    pub async fn record_success(
        &self,
        tenant_id: &str,
        last_activity: NaiveDate,
        next_report: NaiveDate,
    ) -> Result<bool> {
        let tenant_id = tenant_id.to_string();
        self.db
            .run_blocking(move |conn| {
                let changed = conn.execute(
                    "UPDATE report_configs
                     SET last_activity_date = ?2, next_report_date = ?3, updated_at = ?4
                     WHERE tenant_id = ?1",
                    params![
                        tenant_id,
                        last_activity.format(DATE_FORMAT).to_string(),
                        next_report.format(DATE_FORMAT).to_string(),
                        now_text()
                    ],
                )?;
                Ok(changed > 0)
            })
            .await
    }
}
