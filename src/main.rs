// src/main.rs
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use timesheet_compliance::compliance::{month_start, ReportContext};
use timesheet_compliance::config::AppConfig;
use timesheet_compliance::odoo_client::OdooClient;
use timesheet_compliance::reconciliation::{MatchPolicy, MissingEntryRecord};
use timesheet_compliance::roster::{ManagerMapping, Roster};
use timesheet_compliance::server::{self, AppState, OdooConnector};
use timesheet_compliance::slot_query::ShiftStatus;
use timesheet_compliance::timeliness::TimelinessRecord;

#[derive(Parser, Debug)]
#[command(name = "timesheet-compliance", version, about = "Missing and late timesheet reports from Odoo planning data")]
struct Cli {
    /// Log filter, e.g. `debug` or `timesheet_compliance=trace`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Planned slots without logged time, for the month up to END_DATE
    Missing {
        #[arg(long)]
        end_date: Option<NaiveDate>,
        #[arg(long, default_value = "all")]
        status: ShiftStatus,
        /// Comma separated match tiers, in order
        #[arg(long)]
        tiers: Option<MatchPolicy>,
        /// Also print the designers with missing entries on this project
        #[arg(long)]
        project: Option<String>,
        /// Also print the designers with missing entries in this manager's team
        #[arg(long)]
        manager: Option<String>,
        /// Write the missing entries as CSV to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Delay between work date and timesheet submission
    Timeliness {
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        end_date: Option<NaiveDate>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Compliance rate over time
    Trend {
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        end_date: Option<NaiveDate>,
        #[arg(long, default_value = "all")]
        status: ShiftStatus,
        #[arg(long)]
        tiers: Option<MatchPolicy>,
    },
    /// Serve the reports as JSON over HTTP
    Serve,
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("Invalid --log-level filter")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;
    Ok(())
}

/// A roster that cannot be read only disables the manager breakdown.
fn load_managers(path: &Path) -> ManagerMapping {
    match Roster::load(path) {
        Ok(roster) => roster.manager_mapping(),
        Err(e) => {
            warn!("Employee-manager mapping not available: {}", e);
            ManagerMapping::new()
        }
    }
}

fn write_csv<T: serde::Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

async fn connect(config: &AppConfig) -> Result<ReportContext> {
    let client = OdooClient::connect(config.odoo())
        .await
        .context("Failed to connect to Odoo")?;
    Ok(ReportContext::new(Arc::new(client)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    let config = AppConfig::from_env().context("Failed to load configuration from environment")?;
    info!("App configuration loaded.");
    let today = Local::now().date_naive();

    match cli.command {
        Command::Missing {
            end_date,
            status,
            tiers,
            project,
            manager,
            output,
        } => {
            let end_date = end_date.unwrap_or(today);
            let managers = load_managers(&config.roster_path);
            let mut context = connect(&config)
                .await?
                .with_policy(tiers.unwrap_or_default())
                .with_managers(managers.clone());
            let mut report = context
                .missing_entries_report(end_date, status)
                .await
                .context("Failed to build missing entries report")?;
            if let Some(project) = project.as_deref() {
                report = report.with_project_drill_down(project);
            }
            if let Some(manager) = manager.as_deref() {
                report = report.with_team_drill_down(manager, &managers);
            }

            if let Some(path) = output {
                write_csv::<MissingEntryRecord>(&path, &report.records)?;
            }
            println!("{}", serde_json::to_string_pretty(&report.summary)?);
            if !report.drill_downs.is_empty() {
                println!("{}", serde_json::to_string_pretty(&report.drill_downs)?);
            }
        }
        Command::Timeliness {
            start_date,
            end_date,
            output,
        } => {
            let end = end_date.unwrap_or(today);
            let start = start_date.unwrap_or_else(|| month_start(end));
            let mut context = connect(&config).await?;
            let report = context
                .timeliness_report(start, end)
                .await
                .context("Failed to build timeliness report")?;

            if let Some(path) = output {
                write_csv::<TimelinessRecord>(&path, &report.records)?;
            }
            println!("{}", serde_json::to_string_pretty(&report.summary)?);
        }
        Command::Trend {
            start_date,
            end_date,
            status,
            tiers,
        } => {
            let end = end_date.unwrap_or(today);
            let start = start_date.unwrap_or_else(|| month_start(end));
            let mut context = connect(&config)
                .await?
                .with_policy(tiers.unwrap_or_default());
            let points = context
                .historical_compliance(start, end, status)
                .await
                .context("Failed to build compliance trend")?;
            println!("{}", serde_json::to_string_pretty(&points)?);
        }
        Command::Serve => {
            let state = AppState {
                connector: Arc::new(OdooConnector::new(config.odoo())),
                managers: Arc::new(load_managers(&config.roster_path)),
            };
            server::serve(&config, state).await?;
        }
    }

    Ok(())
}
