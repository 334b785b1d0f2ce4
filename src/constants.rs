//! Global Constants
//!
//! Centralized defaults for the report pipeline.
//! All magic numbers should be defined here with documentation.

/// Report pipeline constants
pub mod pipeline {
    /// Tenants with no order for longer than this are skipped
    pub const INACTIVITY_THRESHOLD_DAYS: u32 = 30;

    /// Maximum ranked insights kept per report
    pub const MAX_INSIGHTS: usize = 3;

    /// Number of best-selling products in a KPI snapshot
    pub const TOP_PRODUCTS: usize = 3;

    /// Overall deadline for one tenant run (seconds)
    pub const RUN_DEADLINE_SECS: u64 = 600;

    /// Timeout for a single metrics query (seconds)
    pub const DATA_TIMEOUT_SECS: u64 = 30;

    /// Timeout for one miner, including its own lookups (seconds)
    pub const MINER_TIMEOUT_SECS: u64 = 30;

    /// Timeout for sending one digest, including channel retries (seconds)
    pub const DELIVERY_TIMEOUT_SECS: u64 = 60;
}

/// Insight miner thresholds
pub mod insights {
    /// Customers silent for this long count as lapsed
    pub const CHURN_INACTIVE_DAYS: u32 = 45;

    /// Orders needed before a customer counts as "frequent"
    pub const CHURN_MIN_ORDERS: u32 = 2;

    /// Lapsed customers must exceed this count to raise a finding
    pub const CHURN_MIN_CUSTOMERS: u32 = 0;

    /// Maximum customer names kept in a churn finding
    pub const CHURN_SAMPLE_SIZE: usize = 10;

    /// Share of orders on the two busiest weekdays that counts as concentrated
    pub const CONCENTRATION_SHARE: f64 = 0.5;

    /// Tuesday + Wednesday share below which mid-week is a trough
    pub const TROUGH_SHARE: f64 = 0.15;

    /// Gross margin target (percent)
    pub const MARGIN_TARGET_PCT: f64 = 20.0;
}

/// Recommendation generation constants
pub mod recommendation {
    /// Total provider attempts before falling back
    pub const MAX_ATTEMPTS: u32 = 3;

    pub const MAX_OUTPUT_TOKENS: u32 = 300;

    pub const TEMPERATURE: f32 = 0.7;

    /// Upper bound on sentences kept from any recommendation
    pub const MAX_SENTENCES: usize = 4;

    /// Cleaned provider text at or below this length is treated as malformed
    pub const MIN_USEFUL_CHARS: usize = 20;
}

/// Delivery channel constants
pub mod delivery {
    /// Per-message character limit shared by both transports
    pub const MAX_MESSAGE_CHARS: usize = 4096;

    /// In-channel retries for transient send failures
    pub const MAX_RETRIES: usize = 2;

    /// First backoff delay (milliseconds)
    pub const BASE_DELAY_MS: u64 = 500;

    pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

    pub const WHATSAPP_API_BASE: &str = "https://graph.facebook.com";

    pub const WHATSAPP_API_VERSION: &str = "v21.0";
}

/// Network constants
pub mod network {
    /// Default HTTP request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Connection establishment timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 10;
}

/// Scheduler constants
pub mod scheduler {
    /// Concurrent tenant runs
    pub const DEFAULT_WORKERS: usize = 4;

    pub const TIMEZONE: &str = "Africa/Douala";

    /// Weekly digests: Monday 08:00
    pub const WEEKLY_DAY: &str = "monday";
    pub const WEEKLY_HOUR: u8 = 8;

    /// Monthly digests: 1st of the month at 09:00
    pub const MONTHLY_DAY: u8 = 1;
    pub const MONTHLY_HOUR: u8 = 9;
}
