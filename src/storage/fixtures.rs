//! Test fixtures: in-memory database and row builders.

use chrono::NaiveDate;
use std::sync::Arc;

use super::{Database, SharedDatabase};

const CREATED_AT: &str = "2025-01-01 00:00:00";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn memory_db() -> SharedDatabase {
    let db = Database::open_in_memory().unwrap();
    db.initialize().unwrap();
    Arc::new(db)
}

pub fn tenant(db: &Database, id: &str, name: &str) {
    db.execute(
        "INSERT INTO tenants (id, name, created_at) VALUES (?1, ?2, ?3)",
        &[&id, &name, &CREATED_AT],
    )
    .unwrap();
}

pub fn customer(db: &Database, tenant_id: &str, id: &str, name: &str) {
    db.execute(
        "INSERT INTO customers (id, tenant_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
        &[&id, &tenant_id, &name, &CREATED_AT],
    )
    .unwrap();
}

pub fn product(db: &Database, tenant_id: &str, id: &str, name: &str, quantity: i64, alert: i64) {
    db.execute(
        "INSERT INTO products (id, tenant_id, name, quantity, alert_threshold, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        &[&id, &tenant_id, &name, &quantity, &alert, &CREATED_AT],
    )
    .unwrap();
}

/// Order with its line items, `items` as `(product_id, quantity)`
pub fn order(
    db: &Database,
    tenant_id: &str,
    id: &str,
    customer_id: Option<&str>,
    amount: &str,
    created_at: &str,
    items: &[(&str, i64)],
) {
    db.execute(
        "INSERT INTO orders (id, tenant_id, customer_id, amount, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        &[&id, &tenant_id, &customer_id, &amount, &created_at],
    )
    .unwrap();
    for (product_id, quantity) in items {
        db.execute(
            "INSERT INTO order_items (order_id, product_id, quantity) VALUES (?1, ?2, ?3)",
            &[&id, product_id, quantity],
        )
        .unwrap();
    }
}

pub fn soft_delete_order(db: &Database, id: &str) {
    db.execute(
        "UPDATE orders SET deleted_at = ?2 WHERE id = ?1",
        &[&id, &"2026-01-01 00:00:00"],
    )
    .unwrap();
}

pub fn expense(db: &Database, tenant_id: &str, id: &str, amount: &str, incurred_on: &str) {
    db.execute(
        "INSERT INTO expenses (id, tenant_id, amount, incurred_on) VALUES (?1, ?2, ?3, ?4)",
        &[&id, &tenant_id, &amount, &incurred_on],
    )
    .unwrap();
}
