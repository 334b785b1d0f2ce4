//! Source of "today" for the pipeline.

use chrono::{Local, NaiveDate};
use std::sync::Arc;

use crate::config::ClockConfig;

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub type SharedClock = Arc<dyn Clock>;

/// Local calendar date of the host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// `FixedClock` when a date override is configured
pub fn clock_from_config(config: &ClockConfig) -> SharedClock {
    match config.current_date {
        Some(date) => Arc::new(FixedClock(date)),
        None => Arc::new(SystemClock),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_pins_today() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 19).unwrap();
        let clock = clock_from_config(&ClockConfig {
            current_date: Some(date),
        });
        assert_eq!(clock.today(), date);
    }

    #[test]
    fn test_system_clock_without_override() {
        let clock = clock_from_config(&ClockConfig::default());
        assert_eq!(clock.today(), Local::now().date_naive());
    }
}
