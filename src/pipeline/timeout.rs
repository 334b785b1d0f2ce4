//! Timeouts and panic guards for pipeline suspension points
//!
//! Every await on the data source, a miner, the provider or a channel goes
//! through [`with_timeout`]. Panics are turned into errors with
//! [`panic_message`] so one tenant's failure never unwinds into another.

use std::any::Any;
use std::future::Future;
use std::time::Duration;

use crate::config::{Config, LlmConfig};
use crate::constants::pipeline as pipeline_constants;
use crate::types::{PulseError, Result};

/// Per-operation timeouts for one report run
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Metrics reads (default: 30 seconds)
    pub data: Duration,
    /// One insight miner (default: 30 seconds)
    pub miner: Duration,
    /// One provider call (default: 30 seconds)
    pub provider: Duration,
    /// Channel send, retries included (default: 60 seconds)
    pub delivery: Duration,
    /// The whole run (default: 10 minutes)
    pub run_deadline: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            data: Duration::from_secs(pipeline_constants::DATA_TIMEOUT_SECS),
            miner: Duration::from_secs(pipeline_constants::MINER_TIMEOUT_SECS),
            provider: Duration::from_secs(LlmConfig::default().timeout_secs),
            delivery: Duration::from_secs(pipeline_constants::DELIVERY_TIMEOUT_SECS),
            run_deadline: Duration::from_secs(pipeline_constants::RUN_DEADLINE_SECS),
        }
    }
}

impl TimeoutConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            data: Duration::from_secs(config.pipeline.data_timeout_secs),
            miner: Duration::from_secs(config.pipeline.miner_timeout_secs),
            provider: Duration::from_secs(config.llm.timeout_secs),
            delivery: Duration::from_secs(config.pipeline.delivery_timeout_secs),
            run_deadline: Duration::from_secs(config.pipeline.run_deadline_secs),
        }
    }
}

/// Execute an async operation with a timeout
///
/// Returns [`PulseError::Timeout`] naming `operation_name` on expiry.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(PulseError::timeout(operation_name, timeout)),
    }
}

/// Best-effort text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "Unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_config_defaults() {
        let config = TimeoutConfig::default();
        assert_eq!(config.data.as_secs(), 30);
        assert_eq!(config.delivery.as_secs(), 60);
        assert_eq!(config.run_deadline.as_secs(), 600);
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.pipeline.run_deadline_secs = 5;
        config.llm.timeout_secs = 7;
        let timeouts = TimeoutConfig::from_config(&config);
        assert_eq!(timeouts.run_deadline, Duration::from_secs(5));
        assert_eq!(timeouts.provider, Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, PulseError>(42) },
            "test operation",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, PulseError>(42)
            },
            "slow operation",
        )
        .await;
        assert!(matches!(result.unwrap_err(), PulseError::Timeout { .. }));
    }

    #[test]
    fn test_panic_message() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload = std::panic::catch_unwind(|| panic!("{} failed", "miner")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "miner failed");
    }
}
