//! bizpulse - Periodic Business Digests for Multi-Tenant Commerce Data
//!
//! Computes a tenant's KPIs for a weekly or monthly period, mines a few
//! ranked insights, asks a text-generation provider for one piece of advice
//! and delivers the result over WhatsApp or Telegram.
//!
//! ## Core Features
//!
//! - **Activity Gate**: dormant tenants are skipped, not messaged
//! - **Insight Miners**: stock alerts, churn risk, seasonality and margin
//! - **Resilient Advice**: bounded retries with a rule-based fallback
//! - **Tenant Isolation**: one task per tenant run, each with a deadline
//! - **Audit Trail**: exactly one history record per delivered run
//!
//! ## Quick Start
//!
//! ```ignore
//! use bizpulse::{ConfigLoader, Database, ReportOrchestrator, RunRequest, Cadence};
//!
//! let config = ConfigLoader::load()?;
//! let db = Arc::new(Database::open(&config.database.path)?);
//! let orchestrator = ReportOrchestrator::from_config(&config, db)?;
//! let outcome = orchestrator
//!     .run_report(RunRequest::new("tenant-1", Cadence::Weekly))
//!     .await;
//! ```
//!
//! ## Modules
//!
//! - [`kpi`]: period aggregates, evolutions and top products
//! - [`insights`]: miners and the severity ranker
//! - [`recommendation`]: provider retries and the fallback advice
//! - [`delivery`]: message formatting and messaging transports
//! - [`pipeline`]: per-tenant orchestration and the cadence scheduler
//! - [`storage`]: SQLite persistence with connection pooling

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod delivery;
pub mod insights;
pub mod kpi;
pub mod pipeline;
pub mod recommendation;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

pub use config::{Config, ConfigLoader};

pub use types::error::{ErrorCategory, Result, ResultExt, PulseError};
pub use types::{Cadence, ReportPeriod, ReportStatus, Transport};

pub use storage::database::PoolConfig;
pub use storage::{Database, HistoryStore, MetricsReader, ReportConfigStore, SharedDatabase};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use pipeline::{
    BatchSummary, Clock, FixedClock, PipelineStage, ReportOrchestrator, ReportScheduler,
    RunMode, RunOutcome, RunRequest, SystemClock,
};

pub use insights::{Insight, InsightKind, InsightRanker};
pub use kpi::{KpiCalculator, KpiSnapshot};
pub use recommendation::{Recommendation, RecommendationGenerator};

// =============================================================================
// Delivery & AI Re-exports
// =============================================================================

pub use ai::{LlmProvider, SharedProvider, create_provider};
pub use delivery::{ChannelRegistry, DeliveryChannel, MessageFormatter, TelegramChannel, WhatsAppChannel};
