//! Tenant Command
//!
//! Administer per-tenant report configuration.

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::storage::{ConfigUpdate, ReportConfigStore};
use crate::types::{Cadence, ReportConfig, Result, Transport, ValidationError, ValidationErrorKind};

fn not_configured(tenant_id: &str) -> ValidationError {
    ValidationError::new(
        ValidationErrorKind::UnknownTenant,
        format!("tenant '{}' has no report configuration", tenant_id),
    )
    .with_field("tenant_id")
}

/// Create or update a configuration. Unset options keep their stored value.
pub async fn configure(
    tenant_id: &str,
    cadence: Cadence,
    channel: Option<Transport>,
    recipient: Option<String>,
) -> Result<()> {
    let ctx = CommandContext::load()?;
    let store = ReportConfigStore::new(ctx.db);
    let existing = store.get(tenant_id).await?;

    let update = ConfigUpdate {
        tenant_id: tenant_id.to_string(),
        cadence,
        channel: channel
            .or(existing.as_ref().map(|c| c.channel))
            .unwrap_or(ctx.config.delivery.default_channel),
        recipient: recipient.or(existing.as_ref().and_then(|c| c.recipient.clone())),
        enabled: existing.as_ref().is_none_or(|c| c.enabled),
    };
    let saved = store.upsert(update).await?;

    let out = Output::new();
    out.success(&format!("Configured {}", tenant_id));
    print_config(&out, &saved);
    if saved.recipient.is_none() {
        out.warning("No recipient set; scheduled runs will fail until one is configured");
    }
    Ok(())
}

pub async fn set_enabled(tenant_id: &str, enabled: bool) -> Result<()> {
    let ctx = CommandContext::load()?;
    if !ReportConfigStore::new(ctx.db)
        .set_enabled(tenant_id, enabled)
        .await?
    {
        return Err(not_configured(tenant_id).into());
    }

    let verb = if enabled { "Enabled" } else { "Disabled" };
    Output::new().success(&format!("{} reports for {}", verb, tenant_id));
    Ok(())
}

pub async fn show(tenant_id: &str, format: &str) -> Result<()> {
    let ctx = CommandContext::load()?;
    let config = ReportConfigStore::new(ctx.db)
        .get(tenant_id)
        .await?
        .ok_or_else(|| not_configured(tenant_id))?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let out = Output::new();
    out.header(&format!("Report configuration: {}", tenant_id));
    print_config(&out, &config);
    Ok(())
}

fn print_config(out: &Output, config: &ReportConfig) {
    fn date_or_dash(date: Option<chrono::NaiveDate>) -> String {
        date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
    }

    out.field("Cadence", config.cadence);
    out.field("Enabled", if config.enabled { "yes" } else { "no" });
    out.field("Channel", config.channel);
    out.field("Recipient", config.recipient.as_deref().unwrap_or("-"));
    out.field("Last activity", date_or_dash(config.last_activity_date));
    out.field("Next report", date_or_dash(config.next_report_date));
}
