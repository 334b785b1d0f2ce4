//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (user config dir) and project (.bizpulse/) level files.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants;
use crate::types::{PulseError, Result, Transport};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    pub database: DatabaseConfig,

    /// Activity gate, ranking and timeouts
    pub pipeline: PipelineConfig,

    /// Miner thresholds
    pub insights: InsightsConfig,

    /// Recommendation provider settings
    pub llm: LlmConfig,

    /// Messaging transports
    pub delivery: DeliveryConfig,

    pub scheduler: SchedulerConfig,

    /// Current-date override for reproducible runs
    pub clock: ClockConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database: DatabaseConfig::default(),
            pipeline: PipelineConfig::default(),
            insights: InsightsConfig::default(),
            llm: LlmConfig::default(),
            delivery: DeliveryConfig::default(),
            scheduler: SchedulerConfig::default(),
            clock: ClockConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `PulseError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(PulseError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.max_attempts == 0 {
            return Err(PulseError::Config(
                "LLM max_attempts must be greater than 0".to_string(),
            ));
        }

        let timeouts = [
            ("llm.timeout_secs", self.llm.timeout_secs),
            ("pipeline.run_deadline_secs", self.pipeline.run_deadline_secs),
            ("pipeline.data_timeout_secs", self.pipeline.data_timeout_secs),
            ("pipeline.miner_timeout_secs", self.pipeline.miner_timeout_secs),
            (
                "pipeline.delivery_timeout_secs",
                self.pipeline.delivery_timeout_secs,
            ),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(PulseError::Config(format!(
                "{} must be greater than 0",
                name
            )));
        }

        if self.pipeline.max_insights == 0 {
            return Err(PulseError::Config(
                "pipeline.max_insights must be greater than 0".to_string(),
            ));
        }

        if self.scheduler.workers == 0 {
            return Err(PulseError::Config(
                "scheduler.workers must be greater than 0".to_string(),
            ));
        }

        for (name, share) in [
            ("insights.concentration_share", self.insights.concentration_share),
            ("insights.trough_share", self.insights.trough_share),
        ] {
            if !(0.0..=1.0).contains(&share) {
                return Err(PulseError::Config(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, share
                )));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path
    pub path: PathBuf,

    /// Connection pool size (defaults to a CPU-based size)
    pub pool_max_size: Option<u32>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".bizpulse/bizpulse.db"),
            pool_max_size: None,
        }
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub inactivity_threshold_days: u32,
    pub max_insights: usize,
    pub top_products: usize,
    pub run_deadline_secs: u64,
    pub data_timeout_secs: u64,
    pub miner_timeout_secs: u64,
    pub delivery_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        use constants::pipeline as p;
        Self {
            inactivity_threshold_days: p::INACTIVITY_THRESHOLD_DAYS,
            max_insights: p::MAX_INSIGHTS,
            top_products: p::TOP_PRODUCTS,
            run_deadline_secs: p::RUN_DEADLINE_SECS,
            data_timeout_secs: p::DATA_TIMEOUT_SECS,
            miner_timeout_secs: p::MINER_TIMEOUT_SECS,
            delivery_timeout_secs: p::DELIVERY_TIMEOUT_SECS,
        }
    }
}

// =============================================================================
// Insight Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightsConfig {
    pub churn_inactive_days: u32,
    pub churn_min_orders: u32,
    pub churn_min_customers: u32,
    pub concentration_share: f64,
    pub trough_share: f64,
    pub margin_target_pct: f64,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        use constants::insights as i;
        Self {
            churn_inactive_days: i::CHURN_INACTIVE_DAYS,
            churn_min_orders: i::CHURN_MIN_ORDERS,
            churn_min_customers: i::CHURN_MIN_CUSTOMERS,
            concentration_share: i::CONCENTRATION_SHARE,
            trough_share: i::TROUGH_SHARE,
            margin_target_pct: i::MARGIN_TARGET_PCT,
        }
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// When false, every report uses the rule-based recommendation
    pub enabled: bool,

    /// Provider name: "gemini" or "openai"
    pub provider: String,

    pub model: String,

    /// Never serialized to output
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Custom endpoint base URL
    pub api_base: Option<String>,

    /// Per-attempt timeout in seconds
    pub timeout_secs: u64,

    pub max_output_tokens: u32,

    pub temperature: f32,

    /// Total attempts before the fallback recommendation is used
    pub max_attempts: u32,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("enabled", &self.enabled)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        use constants::recommendation as r;
        Self {
            enabled: true,
            provider: "gemini".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key: None,
            api_base: None,
            timeout_secs: constants::network::DEFAULT_TIMEOUT_SECS,
            max_output_tokens: r::MAX_OUTPUT_TOKENS,
            temperature: r::TEMPERATURE,
            max_attempts: r::MAX_ATTEMPTS,
        }
    }
}

// =============================================================================
// Delivery Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Channel used when neither the request nor the tenant names one
    pub default_channel: Transport,

    /// HTTP timeout per send request (seconds)
    pub timeout_secs: u64,

    pub telegram: TelegramConfig,

    pub whatsapp: WhatsAppConfig,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            default_channel: Transport::WhatsApp,
            timeout_secs: constants::network::DEFAULT_TIMEOUT_SECS,
            telegram: TelegramConfig::default(),
            whatsapp: WhatsAppConfig::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    #[serde(skip_serializing)]
    pub bot_token: Option<String>,

    pub api_base: String,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: constants::delivery::TELEGRAM_API_BASE.to_string(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    #[serde(skip_serializing)]
    pub api_token: Option<String>,

    /// Business phone number id issued by the Graph API
    pub phone_number_id: Option<String>,

    pub api_version: String,

    pub api_base: String,
}

impl std::fmt::Debug for WhatsAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppConfig")
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("phone_number_id", &self.phone_number_id)
            .field("api_version", &self.api_version)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            phone_number_id: None,
            api_version: constants::delivery::WHATSAPP_API_VERSION.to_string(),
            api_base: constants::delivery::WHATSAPP_API_BASE.to_string(),
        }
    }
}

// =============================================================================
// Scheduler Configuration
// =============================================================================

/// Worker pool size plus the trigger times an external cron should use
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub workers: usize,
    pub timezone: String,
    pub weekly_day: String,
    pub weekly_hour: u8,
    pub monthly_day: u8,
    pub monthly_hour: u8,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        use constants::scheduler as s;
        Self {
            workers: s::DEFAULT_WORKERS,
            timezone: s::TIMEZONE.to_string(),
            weekly_day: s::WEEKLY_DAY.to_string(),
            weekly_hour: s::WEEKLY_HOUR,
            monthly_day: s::MONTHLY_DAY,
            monthly_hour: s::MONTHLY_HOUR,
        }
    }
}

// =============================================================================
// Clock Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Pretend today is this date (YYYY-MM-DD)
    pub current_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.inactivity_threshold_days, 30);
        assert_eq!(config.pipeline.max_insights, 3);
        assert_eq!(config.insights.churn_inactive_days, 45);
        assert_eq!(config.llm.max_attempts, 3);
        assert_eq!(config.llm.max_output_tokens, 300);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.llm.temperature = 3.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.insights.trough_share = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.run_deadline_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pipeline.run_deadline_secs"));
    }

    #[test]
    fn test_secrets_not_serialized() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-secret".to_string());
        config.delivery.telegram.bot_token = Some("123:abc".to_string());

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(!json.contains("123:abc"));

        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
