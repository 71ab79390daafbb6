//! Scheduled entry point: reads the CRM exports, rebuilds the revenue ledger
//! and overwrites the MRR summaries.
//!
//! With `REVENUE_LEDGER_*` set in the environment (or a `.env` file) it runs
//! without arguments.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use log::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use revenue_ledger_builder::{run_report, CsvDirectorySink, CsvRowSource, ReportConfig};

#[derive(Parser)]
#[command(
    name = "revenue-ledger",
    version,
    about = "Rebuild the monthly revenue ledger and MRR summaries from CRM exports"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// JSON report configuration (owners, status mappings, columns)
    #[arg(long, env = "REVENUE_LEDGER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// CSV export of the contracts sheet
    #[arg(long, env = "REVENUE_LEDGER_CONTRACTS", global = true)]
    contracts: Option<PathBuf>,

    /// CSV export of the opportunities sheet
    #[arg(long, env = "REVENUE_LEDGER_OPPORTUNITIES", global = true)]
    opportunities: Option<PathBuf>,

    /// Directory receiving the ledgers and per-fiscal-year summaries
    #[arg(long, env = "REVENUE_LEDGER_OUTPUT_DIR", global = true)]
    output_dir: Option<PathBuf>,

    /// Override the current date (YYYY-MM-DD) when re-running a past report
    #[arg(long, global = true)]
    today: Option<NaiveDate>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild and write every table (default)
    Run,
    /// Print the JSON Schema of the report configuration
    ConfigSchema,
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "revenue_ledger_builder=info,revenue_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::ConfigSchema) => print_schema(),
        Some(Commands::Run) | None => run(&cli),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Report run failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_schema() -> anyhow::Result<()> {
    let schema = ReportConfig::schema_as_json().context("rendering configuration schema")?;
    println!("{}", schema);
    Ok(())
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config_path = required(&cli.config, "--config / REVENUE_LEDGER_CONFIG")?;
    let contracts = required(&cli.contracts, "--contracts / REVENUE_LEDGER_CONTRACTS")?;
    let opportunities = required(
        &cli.opportunities,
        "--opportunities / REVENUE_LEDGER_OPPORTUNITIES",
    )?;
    let output_dir = required(&cli.output_dir, "--output-dir / REVENUE_LEDGER_OUTPUT_DIR")?;

    let config = ReportConfig::from_path(config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;
    let today = cli.today.unwrap_or_else(|| Local::now().date_naive());

    let source = CsvRowSource::new(contracts, opportunities);
    let mut sink = CsvDirectorySink::new(output_dir).with_labels(config.labels.clone());

    let summary = run_report(&config, &source, &mut sink, today).context("building report")?;

    info!(
        "Contracts: {} rows -> {} records ({} after dedup)",
        summary.contract_rows, summary.contract_records_expanded, summary.contract_records_kept
    );
    info!(
        "Opportunities: {} rows -> {} records ({} after dedup)",
        summary.opportunity_rows,
        summary.opportunity_records_expanded,
        summary.opportunity_records_kept
    );
    info!("Fiscal years written: {:?}", summary.fiscal_years);
    Ok(())
}

fn required<'a>(value: &'a Option<PathBuf>, name: &str) -> anyhow::Result<&'a PathBuf> {
    value
        .as_ref()
        .with_context(|| format!("missing required setting {}", name))
}
