//! Report pipeline: per-tenant orchestration and the cadence batch driver.

pub mod clock;
pub mod orchestrator;
pub mod scheduler;
pub mod stage;
pub mod timeout;

pub use clock::{Clock, FixedClock, SharedClock, SystemClock, clock_from_config};
pub use orchestrator::{ReportOrchestrator, RunMode, RunOutcome, RunRequest};
pub use scheduler::{BatchSummary, ReportScheduler};
pub use stage::{PipelineStage, StageTracker};
pub use timeout::{TimeoutConfig, with_timeout};
