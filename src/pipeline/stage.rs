//! Report run stages
//!
//! One run moves through a fixed sequence:
//!
//! ```text
//! Pending -> ActivityChecked -> Skipped
//!                            -> ComputingKpis -> MiningInsights
//!                               -> GeneratingRecommendation -> Formatting
//!                               -> Delivering -> Persisted
//! ```
//!
//! `Failed` is reachable from every non-terminal stage. Preview runs go from
//! `Formatting` straight to `Persisted`.

use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Pending,
    ActivityChecked,
    Skipped,
    ComputingKpis,
    MiningInsights,
    GeneratingRecommendation,
    Formatting,
    Delivering,
    Persisted,
    Failed,
}

impl PipelineStage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ActivityChecked => "activity_check",
            Self::Skipped => "skipped",
            Self::ComputingKpis => "kpis",
            Self::MiningInsights => "insights",
            Self::GeneratingRecommendation => "recommendation",
            Self::Formatting => "formatting",
            Self::Delivering => "delivery",
            Self::Persisted => "persisted",
            Self::Failed => "failed",
        }
    }

    /// Label of the work in progress while in this stage, used in error details
    pub fn work_label(&self) -> &'static str {
        match self {
            Self::Pending => "activity_check",
            other => other.name(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Skipped | Self::Persisted | Self::Failed)
    }

    pub fn can_transition_to(&self, next: PipelineStage) -> bool {
        use PipelineStage::*;

        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Pending, ActivityChecked)
                | (ActivityChecked, Skipped)
                | (ActivityChecked, ComputingKpis)
                | (ComputingKpis, MiningInsights)
                | (MiningInsights, GeneratingRecommendation)
                | (GeneratingRecommendation, Formatting)
                | (Formatting, Delivering)
                | (Formatting, Persisted)
                | (Delivering, Persisted)
        )
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Current stage of one run, with transition logging
#[derive(Debug)]
pub struct StageTracker {
    tenant_id: String,
    current: PipelineStage,
    entered_at: Instant,
}

impl StageTracker {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            current: PipelineStage::Pending,
            entered_at: Instant::now(),
        }
    }

    pub fn current(&self) -> PipelineStage {
        self.current
    }

    /// Move to `next`. Illegal edges are logged and ignored.
    pub fn advance(&mut self, next: PipelineStage) -> bool {
        if !self.current.can_transition_to(next) {
            tracing::warn!(
                tenant = %self.tenant_id,
                from = %self.current,
                to = %next,
                "Illegal stage transition ignored"
            );
            return false;
        }
        debug!(
            tenant = %self.tenant_id,
            from = %self.current,
            to = %next,
            elapsed_ms = self.entered_at.elapsed().as_millis() as u64,
            "Stage transition"
        );
        self.current = next;
        self.entered_at = Instant::now();
        true
    }
}
