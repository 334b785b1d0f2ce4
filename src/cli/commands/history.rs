//! History Command
//!
//! List recorded report runs, newest first.

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::storage::HistoryStore;
use crate::types::Result;

pub async fn run(tenant: Option<&str>, limit: usize, format: &str) -> Result<()> {
    let ctx = CommandContext::load()?;
    let records = HistoryStore::new(ctx.db).list(tenant, limit).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let out = Output::new();
    if records.is_empty() {
        out.info("No reports recorded yet");
        return Ok(());
    }

    out.header("Report history");
    for record in &records {
        let mut line = format!(
            "{}  {:<12} {} {} → {}  {} ms",
            record.created_at.format("%Y-%m-%d %H:%M"),
            record.tenant_id,
            record.cadence,
            record.period_start,
            record.period_end,
            record.execution_ms,
        );
        if let Some(detail) = &record.error_detail {
            line.push_str(&format!("  {}", detail));
        }
        out.status(record.status, &line);
    }

    Ok(())
}
