//! Schedule Command
//!
//! Runs every due tenant for one cadence. Meant to be triggered by cron at
//! the times listed under `[scheduler]`.

use std::sync::Arc;

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::pipeline::{BatchSummary, ReportOrchestrator, ReportScheduler};
use crate::types::{Cadence, Result};

pub async fn run(cadence: Cadence, workers: Option<usize>, format: &str) -> Result<BatchSummary> {
    let ctx = CommandContext::load()?;
    let workers = workers.unwrap_or(ctx.config.scheduler.workers);
    let orchestrator = Arc::new(ReportOrchestrator::from_config(&ctx.config, ctx.db)?);

    let summary = ReportScheduler::new(orchestrator, workers)
        .run_cadence(cadence)
        .await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(summary);
    }

    let out = Output::new();
    if summary.total == 0 {
        out.info(&format!("No {} reports due", cadence));
        return Ok(summary);
    }

    out.section(&format!("{} batch", cadence));
    for outcome in &summary.outcomes {
        let line = match &outcome.error {
            Some(error) => format!("{}: {}", outcome.tenant_id, error),
            None => format!("{}: {}", outcome.tenant_id, outcome.status),
        };
        out.status(outcome.status, &line);
    }
    println!();
    out.field("Total", summary.total);
    out.field("Success", summary.success);
    out.field("Skipped", summary.skipped);
    out.field("Failed", summary.failed);

    Ok(summary)
}
