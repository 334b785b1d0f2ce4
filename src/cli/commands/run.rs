//! Run Command
//!
//! Build (and unless previewing, deliver) one tenant's report.

use chrono::NaiveDate;

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::pipeline::{ReportOrchestrator, RunMode, RunOutcome, RunRequest};
use crate::types::{Cadence, ReportStatus, Result, Transport};

/// Options for a single report run
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub tenant: String,
    pub cadence: Cadence,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub recipient: Option<String>,
    pub channel: Option<Transport>,
    pub preview: bool,
    pub format: String,
}

impl RunArgs {
    fn into_request(self, today: NaiveDate) -> RunRequest {
        let mut request = RunRequest::new(self.tenant, self.cadence);
        request = match (self.start_date, self.end_date) {
            (Some(start), end) => request.for_period(start, end.unwrap_or(today)),
            (None, Some(end)) => request.ending_on(end),
            (None, None) => request,
        };
        request.recipient = self.recipient;
        request.channel = self.channel;
        if self.preview {
            request = request.preview();
        }
        request
    }
}

/// Returns the run status; the caller turns `Failed` into a non-zero exit.
pub async fn run(args: RunArgs) -> Result<ReportStatus> {
    let ctx = CommandContext::load()?;
    let orchestrator = ReportOrchestrator::from_config(&ctx.config, ctx.db)?;

    let as_json = args.format == "json";
    let request = args.into_request(orchestrator.today());
    let outcome = match request.mode {
        RunMode::Preview => orchestrator.preview_report(request).await,
        RunMode::Deliver => orchestrator.run_report(request).await,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    Ok(outcome.status)
}

fn print_outcome(outcome: &RunOutcome) {
    let out = Output::new();

    if let Some(message) = &outcome.formatted_message {
        out.section(&format!("Digest for {}", outcome.tenant_id));
        println!("{}", message);
    }

    if !outcome.miner_failures.is_empty() {
        out.section("Skipped insight checks");
        for failure in &outcome.miner_failures {
            out.warning(&format!("{}: {}", failure.miner, failure.reason));
        }
    }

    println!();
    let summary = match outcome.status {
        ReportStatus::Success if outcome.mode == RunMode::Preview => "Preview ready".to_string(),
        ReportStatus::Success => "Report delivered".to_string(),
        ReportStatus::Skipped => "Report skipped: no recent activity".to_string(),
        ReportStatus::Failed => format!(
            "Report failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        ),
    };
    out.status(outcome.status, &summary);

    out.field("Tenant", &outcome.tenant_id);
    out.field("Period", outcome.period.label());
    if let Some(delivery) = &outcome.delivery {
        out.field(
            "Sent to",
            format!(
                "{} via {} ({} message(s))",
                delivery.recipient, delivery.transport, delivery.chunks
            ),
        );
    }
    if let Some(recommendation) = &outcome.recommendation
        && recommendation.is_fallback()
    {
        out.field("Advice", "rule-based");
    }
    if let Some(id) = &outcome.history_id {
        out.field("History", id);
    }
    out.field("Duration", format!("{} ms", outcome.duration_ms));
}
