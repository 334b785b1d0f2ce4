use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bizpulse::cli::commands::{self, run::RunArgs};
use bizpulse::types::{Cadence, ReportStatus, Transport};

#[derive(Parser)]
#[command(name = "bizpulse")]
#[command(
    version,
    about = "Periodic business digests for small merchants: KPIs, insights and advice"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,

    #[arg(
        long,
        short = 'f',
        global = true,
        default_value = "text",
        value_parser = ["text", "json"],
        help = "Output format: text, json"
    )]
    format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize bizpulse in the current directory
    Init {
        #[arg(long, help = "Overwrite existing initialization")]
        force: bool,
    },

    /// Build and deliver one tenant's report
    Run {
        #[arg(long, short, help = "Tenant identifier")]
        tenant: String,
        #[arg(long, short, default_value = "weekly", help = "Cadence: weekly, monthly")]
        cadence: Cadence,
        #[arg(long, help = "Last day of the period (YYYY-MM-DD, default: today)")]
        end_date: Option<NaiveDate>,
        #[arg(long, help = "First day of an explicit period (YYYY-MM-DD)")]
        start_date: Option<NaiveDate>,
        #[arg(long, help = "Override the configured recipient")]
        recipient: Option<String>,
        #[arg(long, help = "Override the configured channel: whatsapp, telegram")]
        channel: Option<Transport>,
        #[arg(long, help = "Build the digest without sending or recording it")]
        preview: bool,
    },

    /// Run every due tenant for a cadence
    Schedule {
        #[arg(long, short, help = "Cadence: weekly, monthly")]
        cadence: Cadence,
        #[arg(long, short, help = "Concurrent report runs (default: scheduler.workers)")]
        workers: Option<usize>,
    },

    /// List recorded report runs
    History {
        #[arg(long, short, help = "Only this tenant")]
        tenant: Option<String>,
        #[arg(long, short, default_value = "20", help = "Maximum records")]
        limit: usize,
    },

    /// Manage per-tenant report configuration
    Tenant {
        #[command(subcommand)]
        action: TenantAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum TenantAction {
    /// Create or update a tenant's report configuration
    Configure {
        #[arg(long, short)]
        tenant: String,
        #[arg(long, short, help = "Cadence: weekly, monthly")]
        cadence: Cadence,
        #[arg(long, help = "Channel: whatsapp, telegram")]
        channel: Option<Transport>,
        #[arg(long, help = "Phone number or chat id")]
        recipient: Option<String>,
    },
    /// Resume scheduled reports
    Enable {
        #[arg(long, short)]
        tenant: String,
    },
    /// Pause scheduled reports
    Disable {
        #[arg(long, short)]
        tenant: String,
    },
    /// Show a tenant's report configuration
    Show {
        #[arg(long, short)]
        tenant: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(
            long,
            value_parser = ["toml", "json", "yaml"],
            help = "Rendering: toml, json, yaml (default: toml, or json with --format json)"
        )]
        syntax: Option<String>,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mbizpulse encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!("\n\x1b[33mRe-run with RUST_BACKTRACE=1 and --verbose for details.\x1b[0m");
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let format = cli.format;

    match cli.command {
        Commands::Init { force } => {
            commands::init::run(force)?;
        }
        Commands::Run {
            tenant,
            cadence,
            end_date,
            start_date,
            recipient,
            channel,
            preview,
        } => {
            let rt = Runtime::new()?;
            let status = rt.block_on(commands::run::run(RunArgs {
                tenant,
                cadence,
                start_date,
                end_date,
                recipient,
                channel,
                preview,
                format,
            }))?;
            if status == ReportStatus::Failed {
                anyhow::bail!("report run failed");
            }
        }
        Commands::Schedule { cadence, workers } => {
            let rt = Runtime::new()?;
            let summary = rt.block_on(commands::schedule::run(cadence, workers, &format))?;
            if summary.failed > 0 {
                anyhow::bail!("{} of {} report(s) failed", summary.failed, summary.total);
            }
        }
        Commands::History { tenant, limit } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::history::run(tenant.as_deref(), limit, &format))?;
        }
        Commands::Tenant { action } => {
            let rt = Runtime::new()?;
            match action {
                TenantAction::Configure {
                    tenant,
                    cadence,
                    channel,
                    recipient,
                } => rt.block_on(commands::tenant::configure(
                    &tenant, cadence, channel, recipient,
                ))?,
                TenantAction::Enable { tenant } => {
                    rt.block_on(commands::tenant::set_enabled(&tenant, true))?
                }
                TenantAction::Disable { tenant } => {
                    rt.block_on(commands::tenant::set_enabled(&tenant, false))?
                }
                TenantAction::Show { tenant } => {
                    rt.block_on(commands::tenant::show(&tenant, &format))?
                }
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { syntax } => {
                let default = if format == "json" { "json" } else { "toml" };
                let syntax = syntax.unwrap_or_else(|| default.to_string());
                commands::config::show(&syntax)?;
            }
            ConfigAction::Path => {
                commands::config::path()?;
            }
            ConfigAction::Init { global, force } => {
                if global {
                    commands::config::init_global(force)?;
                } else {
                    commands::config::init_project()?;
                }
            }
        },
    }

    Ok(())
}
