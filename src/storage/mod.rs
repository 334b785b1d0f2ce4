pub mod config_store;
pub mod database;
pub mod history_store;
pub mod metrics_reader;

#[cfg(test)]
pub(crate) mod fixtures;

pub use config_store::{ConfigUpdate, ReportConfigStore};
pub use database::{Database, PoolConfig, SharedDatabase};
pub use history_store::{HistoryStore, NewHistory};
pub use metrics_reader::{InventoryItem, LapsedCustomer, MetricsReader, SqliteMetricsReader};
