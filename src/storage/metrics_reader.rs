//! Metrics Reader
//!
//! Read-only query service over a tenant's transactional records. Every
//! query is scoped to one tenant and excludes soft-deleted rows.
//! Failures surface as `PulseError::DataAccess`.

use async_trait::async_trait;
use chrono::{Days, NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

use super::SharedDatabase;
use crate::kpi::{PeriodAggregate, ProductUnits};
use crate::types::{PulseError, Result, TenantProfile};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Stock level for one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub product_name: String,
    pub quantity: i64,
    pub alert_threshold: i64,
}

/// Customer who used to order regularly and has gone quiet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapsedCustomer {
    pub name: String,
    pub order_count: u64,
    pub last_order_date: NaiveDate,
}

/// Query service consumed by the report pipeline
#[async_trait]
pub trait MetricsReader: Send + Sync {
    /// Revenue, orders, customers and per-product units for `[start, end]`
    async fn read_period(
        &self,
        tenant_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PeriodAggregate>;

    async fn read_inventory(&self, tenant_id: &str) -> Result<Vec<InventoryItem>>;

    async fn tenant_profile(&self, tenant_id: &str) -> Result<Option<TenantProfile>>;

    /// Date of the latest order on or before `as_of`
    async fn last_activity_date(&self, tenant_id: &str, as_of: NaiveDate)
    -> Result<Option<NaiveDate>>;

    /// Customers with at least `min_orders` orders and none in the
    /// `window_days` before `as_of`
    async fn read_lapsed_customers(
        &self,
        tenant_id: &str,
        as_of: NaiveDate,
        window_days: u32,
        min_orders: u32,
    ) -> Result<Vec<LapsedCustomer>>;

    /// Total recorded expenses for `[start, end]`, `None` without cost data
    async fn read_cost_total(
        &self,
        tenant_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<Decimal>>;
}

// =============================================================================
// SQLite implementation
// =============================================================================

/// Metrics reader backed by the shared connection pool
pub struct SqliteMetricsReader {
    db: SharedDatabase,
}

impl SqliteMetricsReader {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    async fn query<T, F>(&self, what: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.db
            .run_blocking(f)
            .await
            .map_err(|e| match e {
                PulseError::DataAccess(_) => e,
                other => PulseError::data_access(format!("{}: {}", what, other)),
            })
    }
}

fn parse_decimal(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim())
        .map_err(|e| PulseError::data_access(format!("invalid amount '{}': {}", raw, e)))
}

/// Adds a stored amount to a running total, rejecting overflow
fn add_amount(total: Decimal, raw: &str) -> Result<Decimal> {
    total
        .checked_add(parse_decimal(raw)?)
        .ok_or_else(|| PulseError::data_access(format!("amount total overflows at '{}'", raw)))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| PulseError::data_access(format!("invalid date '{}': {}", raw, e)))
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|e| PulseError::data_access(format!("invalid timestamp '{}': {}", raw, e)))
}

fn query_period(
    conn: &Connection,
    tenant_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PeriodAggregate> {
    let start = start.format(DATE_FORMAT).to_string();
    let end = end.format(DATE_FORMAT).to_string();

    let mut stmt = conn.prepare_cached(
        "SELECT customer_id, amount, created_at FROM orders
         WHERE tenant_id = ?1 AND deleted_at IS NULL
           AND date(created_at) BETWEEN ?2 AND ?3
         ORDER BY created_at ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![tenant_id, start, end], |row| {
        Ok((
            row.get::<_, Option<String>>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut aggregate = PeriodAggregate::default();
    let mut customers = HashSet::new();
    for row in rows {
        let (customer_id, amount, created_at) = row?;
        aggregate.revenue = add_amount(aggregate.revenue, &amount)?;
        aggregate.order_count += 1;
        aggregate.order_times.push(parse_timestamp(&created_at)?);
        if let Some(customer_id) = customer_id {
            customers.insert(customer_id);
        }
    }
    aggregate.unique_customers = customers.len() as u64;

    let mut stmt = conn.prepare_cached(
        "SELECT p.name, SUM(oi.quantity) AS units
         FROM order_items oi
         JOIN orders o ON o.id = oi.order_id
         JOIN products p ON p.id = oi.product_id
         WHERE o.tenant_id = ?1 AND o.deleted_at IS NULL
           AND date(o.created_at) BETWEEN ?2 AND ?3
         GROUP BY p.id, p.name
         ORDER BY MIN(o.created_at) ASC, MIN(oi.id) ASC",
    )?;
    aggregate.product_units = stmt
        .query_map(params![tenant_id, start, end], |row| {
            Ok(ProductUnits::new(
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?.max(0) as u64,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(aggregate)
}

#[async_trait]
impl MetricsReader for SqliteMetricsReader {
    async fn read_period(
        &self,
        tenant_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PeriodAggregate> {
        let tenant_id = tenant_id.to_string();
        self.query("read period", move |conn| {
            query_period(conn, &tenant_id, start, end)
        })
        .await
    }

    async fn read_inventory(&self, tenant_id: &str) -> Result<Vec<InventoryItem>> {
        let tenant_id = tenant_id.to_string();
        self.query("read inventory", move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT name, quantity, alert_threshold FROM products
                 WHERE tenant_id = ?1 AND deleted_at IS NULL
                 ORDER BY created_at ASC, id ASC",
            )?;
            let items = stmt
                .query_map(params![tenant_id], |row| {
                    Ok(InventoryItem {
                        product_name: row.get(0)?,
                        quantity: row.get(1)?,
                        alert_threshold: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(items)
        })
        .await
    }

    async fn tenant_profile(&self, tenant_id: &str) -> Result<Option<TenantProfile>> {
        let tenant_id = tenant_id.to_string();
        self.query("read tenant", move |conn| {
            let profile = conn
                .query_row(
                    "SELECT id, name, currency_code FROM tenants
                     WHERE id = ?1 AND deleted_at IS NULL",
                    params![tenant_id],
                    |row| {
                        Ok(TenantProfile {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            currency_code: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(profile)
        })
        .await
    }

    async fn last_activity_date(
        &self,
        tenant_id: &str,
        as_of: NaiveDate,
    ) -> Result<Option<NaiveDate>> {
        let tenant_id = tenant_id.to_string();
        self.query("read last activity", move |conn| {
            let latest: Option<String> = conn.query_row(
                "SELECT MAX(date(created_at)) FROM orders
                 WHERE tenant_id = ?1 AND deleted_at IS NULL AND date(created_at) <= ?2",
                params![tenant_id, as_of.format(DATE_FORMAT).to_string()],
                |row| row.get(0),
            )?;
            latest.as_deref().map(parse_date).transpose()
        })
        .await
    }

    async fn read_lapsed_customers(
        &self,
        tenant_id: &str,
        as_of: NaiveDate,
        window_days: u32,
        min_orders: u32,
    ) -> Result<Vec<LapsedCustomer>> {
        let tenant_id = tenant_id.to_string();
        let cutoff = as_of - Days::new(u64::from(window_days));
        self.query("read lapsed customers", move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT COALESCE(c.name, c.id), COUNT(o.id), MAX(date(o.created_at)) AS last_order
                 FROM customers c
                 JOIN orders o ON o.customer_id = c.id AND o.deleted_at IS NULL
                 WHERE c.tenant_id = ?1 AND c.deleted_at IS NULL
                   AND date(o.created_at) <= ?2
                 GROUP BY c.id
                 HAVING COUNT(o.id) >= ?3 AND MAX(date(o.created_at)) < ?4
                 ORDER BY last_order ASC, c.id ASC",
            )?;
            let rows = stmt.query_map(
                params![
                    tenant_id,
                    as_of.format(DATE_FORMAT).to_string(),
                    min_orders,
                    cutoff.format(DATE_FORMAT).to_string()
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )?;

            let mut customers = Vec::new();
            for row in rows {
                let (name, order_count, last_order) = row?;
                customers.push(LapsedCustomer {
                    name,
                    order_count: order_count.max(0) as u64,
                    last_order_date: parse_date(&last_order)?,
                });
            }
            Ok(customers)
        })
        .await
    }

    async fn read_cost_total(
        &self,
        tenant_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<Decimal>> {
        let tenant_id = tenant_id.to_string();
        self.query("read costs", move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT amount FROM expenses
                 WHERE tenant_id = ?1 AND deleted_at IS NULL
                   AND incurred_on BETWEEN ?2 AND ?3",
            )?;
            let amounts = stmt
                .query_map(
                    params![
                        tenant_id,
                        start.format(DATE_FORMAT).to_string(),
                        end.format(DATE_FORMAT).to_string()
                    ],
                    |row| row.get::<_, String>(0),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            if amounts.is_empty() {
                return Ok(None);
            }
            let mut total = Decimal::ZERO;
            for amount in &amounts {
                total = add_amount(total, amount)?;
            }
            Ok(Some(total))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fixtures::{self, date};
    use std::sync::Arc;

    fn reader() -> (SqliteMetricsReader, SharedDatabase) {
        let db = fixtures::memory_db();
        (SqliteMetricsReader::new(Arc::clone(&db)), db)
    }

    #[tokio::test]
    async fn test_read_period_aggregates_and_excludes_deleted() {
        let (reader, db) = reader();
        fixtures::tenant(&db, "t1", "Boulangerie");
        fixtures::customer(&db, "t1", "c1", "Awa");
        fixtures::customer(&db, "t1", "c2", "Jean");
        fixtures::product(&db, "t1", "p-bread", "Pain", 50, 10);
        fixtures::product(&db, "t1", "p-crois", "Croissant", 5, 15);

        fixtures::order(&db, "t1", "o1", Some("c1"), "1500.50", "2026-01-13 09:00:00", &[("p-crois", 3)]);
        fixtures::order(&db, "t1", "o2", Some("c2"), "2000", "2026-01-14 10:00:00", &[("p-bread", 3), ("p-crois", 1)]);
        fixtures::order(&db, "t1", "o3", Some("c1"), "999", "2026-01-15 11:00:00", &[("p-bread", 4)]);
        fixtures::order(&db, "t1", "o4", None, "100", "2026-01-20 11:00:00", &[]);
        fixtures::soft_delete_order(&db, "o3");

        let aggregate = reader
            .read_period("t1", date(2026, 1, 13), date(2026, 1, 19))
            .await
            .unwrap();

        assert_eq!(aggregate.order_count, 2);
        assert_eq!(aggregate.revenue, Decimal::from_str("3500.50").unwrap());
        assert_eq!(aggregate.unique_customers, 2);
        assert_eq!(
            aggregate.product_units,
            vec![ProductUnits::new("Croissant", 4), ProductUnits::new("Pain", 3)]
        );
        assert_eq!(aggregate.order_times.len(), 2);
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let (reader, db) = reader();
        fixtures::tenant(&db, "t1", "One");
        fixtures::tenant(&db, "t2", "Two");
        fixtures::order(&db, "t1", "o1", None, "10", "2026-01-13 09:00:00", &[]);
        fixtures::order(&db, "t2", "o2", None, "20", "2026-01-13 09:00:00", &[]);

        let aggregate = reader
            .read_period("t2", date(2026, 1, 13), date(2026, 1, 13))
            .await
            .unwrap();
        assert_eq!(aggregate.revenue, Decimal::from(20));
    }

    #[tokio::test]
    async fn test_inventory_and_profile() {
        let (reader, db) = reader();
        fixtures::tenant(&db, "t1", "Boulangerie");
        fixtures::product(&db, "t1", "p1", "Croissant", 5, 15);

        let items = reader.read_inventory("t1").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_name, "Croissant");
        assert_eq!(items[0].alert_threshold, 15);

        let profile = reader.tenant_profile("t1").await.unwrap().unwrap();
        assert_eq!(profile.name, "Boulangerie");
        assert_eq!(profile.currency_code, "XAF");
        assert!(reader.tenant_profile("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_activity_ignores_future_orders() {
        let (reader, db) = reader();
        fixtures::tenant(&db, "t1", "Boulangerie");
        assert_eq!(reader.last_activity_date("t1", date(2026, 1, 19)).await.unwrap(), None);

        fixtures::order(&db, "t1", "o1", None, "10", "2026-01-10 09:00:00", &[]);
        fixtures::order(&db, "t1", "o2", None, "10", "2026-02-10 09:00:00", &[]);
        assert_eq!(
            reader.last_activity_date("t1", date(2026, 1, 19)).await.unwrap(),
            Some(date(2026, 1, 10))
        );
    }

    #[tokio::test]
    async fn test_lapsed_customers() {
        let (reader, db) = reader();
        fixtures::tenant(&db, "t1", "Boulangerie");
        fixtures::customer(&db, "t1", "loyal-gone", "Awa");
        fixtures::customer(&db, "t1", "loyal-active", "Jean");
        fixtures::customer(&db, "t1", "one-off", "Marc");

        fixtures::order(&db, "t1", "o1", Some("loyal-gone"), "10", "2025-10-01 09:00:00", &[]);
        fixtures::order(&db, "t1", "o2", Some("loyal-gone"), "10", "2025-11-01 09:00:00", &[]);
        fixtures::order(&db, "t1", "o3", Some("loyal-active"), "10", "2025-10-01 09:00:00", &[]);
        fixtures::order(&db, "t1", "o4", Some("loyal-active"), "10", "2026-01-15 09:00:00", &[]);
        fixtures::order(&db, "t1", "o5", Some("one-off"), "10", "2025-09-01 09:00:00", &[]);

        let lapsed = reader
            .read_lapsed_customers("t1", date(2026, 1, 19), 45, 2)
            .await
            .unwrap();
        assert_eq!(lapsed.len(), 1);
        assert_eq!(lapsed[0].name, "Awa");
        assert_eq!(lapsed[0].order_count, 2);
        assert_eq!(lapsed[0].last_order_date, date(2025, 11, 1));
    }

    #[tokio::test]
    async fn test_cost_total() {
        let (reader, db) = reader();
        fixtures::tenant(&db, "t1", "Boulangerie");
        assert_eq!(
            reader.read_cost_total("t1", date(2026, 1, 1), date(2026, 1, 31)).await.unwrap(),
            None
        );

        fixtures::expense(&db, "t1", "e1", "250.25", "2026-01-05");
        fixtures::expense(&db, "t1", "e2", "100", "2026-01-20");
        fixtures::expense(&db, "t1", "e3", "999", "2026-02-01");
        assert_eq!(
            reader.read_cost_total("t1", date(2026, 1, 1), date(2026, 1, 31)).await.unwrap(),
            Some(Decimal::from_str("350.25").unwrap())
        );
    }

    #[tokio::test]
    async fn test_bad_amount_is_data_access_error() {
        let (reader, db) = reader();
        fixtures::tenant(&db, "t1", "Boulangerie");
        fixtures::order(&db, "t1", "o1", None, "not-a-number", "2026-01-13 09:00:00", &[]);

        let err = reader
            .read_period("t1", date(2026, 1, 13), date(2026, 1, 19))
            .await
            .unwrap_err();
        assert!(matches!(err, PulseError::DataAccess(_)));
    }

    #[tokio::test]
    async fn test_amount_overflow_is_data_access_error() {
        let (reader, db) = reader();
        let max = Decimal::MAX.to_string();
        fixtures::tenant(&db, "t1", "Boulangerie");
        fixtures::order(&db, "t1", "o1", None, &max, "2026-01-13 09:00:00", &[]);
        fixtures::order(&db, "t1", "o2", None, &max, "2026-01-14 09:00:00", &[]);
        fixtures::expense(&db, "t1", "e1", &max, "2026-01-05");
        fixtures::expense(&db, "t1", "e2", "1", "2026-01-06");

        let err = reader
            .read_period("t1", date(2026, 1, 13), date(2026, 1, 19))
            .await
            .unwrap_err();
        assert!(matches!(err, PulseError::DataAccess(ref msg) if msg.contains("overflows")));

        let err = reader
            .read_cost_total("t1", date(2026, 1, 1), date(2026, 1, 31))
            .await
            .unwrap_err();
        assert!(matches!(err, PulseError::DataAccess(_)));
    }
}
