//! # Revenue Ledger Builder
//!
//! Turns the CRM sync's contract and opportunity sheets into a monthly
//! revenue-recognition ledger and a pivoted MRR summary per fiscal year.
//!
//! ## Core Concepts
//!
//! - **Source rows**: one contract or opportunity with an anchor date (contract
//!   start or close date), a billing cadence and an MRR
//! - **Window**: the accounting horizon, from a fixed floor month up to the
//!   month one year after today
//! - **Accrual records**: one per recognized month, tagged confirmed,
//!   unconfirmed (future contract months) or forecast (opportunities)
//! - **Deduplication**: a partial and a full deployment of the same institution
//!   in the same month count once, the full one
//! - **Pivot**: (fiscal year, month, owner) rows with one column per status and
//!   a total row per fiscal year
//!
//! ## Example
//!
//! ```rust,ignore
//! use revenue_ledger_builder::*;
//! use chrono::NaiveDate;
//!
//! let config = ReportConfig::from_path("report.json".as_ref())?;
//! let source = CsvRowSource::new("contracts.csv", "opportunities.csv");
//! let mut sink = CsvDirectorySink::new("out");
//! let today = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
//!
//! let summary = run_report(&config, &source, &mut sink, today)?;
//! ```

pub mod aggregate;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod fiscal;
pub mod ingestion;
pub mod io;
pub mod schema;
pub mod utils;

pub use aggregate::{PivotRow, PivotTable, RevenueAggregator, StatusTotals};
pub use dedup::dedupe;
pub use engine::{expand_all, AccrualExpander, Window};
pub use error::{Result, RevenueLedgerError};
pub use fiscal::FiscalYearClassifier;
pub use ingestion::*;
pub use io::*;
pub use schema::*;
pub use utils::*;

use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccrualStatus {
    /// Contract revenue for the current month or earlier.
    Confirmed,
    /// Contract revenue for a month after the current one.
    Unconfirmed,
    /// Probability-weighted opportunity revenue.
    Forecast,
}

impl AccrualStatus {
    /// Pivot column order.
    pub const ALL: [AccrualStatus; 3] = [
        AccrualStatus::Confirmed,
        AccrualStatus::Unconfirmed,
        AccrualStatus::Forecast,
    ];
}

impl fmt::Display for AccrualStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccrualStatus::Confirmed => write!(f, "confirmed"),
            AccrualStatus::Unconfirmed => write!(f, "unconfirmed"),
            AccrualStatus::Forecast => write!(f, "forecast"),
        }
    }
}

/// One month of recognized revenue for one source row. Built only by
/// [`AccrualExpander`]; the source row is shared, never copied or mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccrualRecord {
    pub source: Arc<SourceRecord>,
    /// First day of the month the amount is recognized in.
    pub accounting_month: NaiveDate,
    pub status: AccrualStatus,
    pub fiscal_year: i32,
    pub amount: i64,
}

/// Everything one run computes, before anything is written.
#[derive(Debug, Clone)]
pub struct ReportOutput {
    pub window: Window,
    pub contracts: Vec<AccrualRecord>,
    pub opportunities: Vec<AccrualRecord>,
    pub pivots: BTreeMap<i32, PivotTable>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub contract_rows: usize,
    pub opportunity_rows: usize,
    pub contract_records_expanded: usize,
    pub contract_records_kept: usize,
    pub opportunity_records_expanded: usize,
    pub opportunity_records_kept: usize,
    pub fiscal_years: Vec<i32>,
}

pub struct ReportProcessor<'a> {
    config: &'a ReportConfig,
}

impl<'a> ReportProcessor<'a> {
    pub fn new(config: &'a ReportConfig) -> Self {
        Self { config }
    }

    /// Runs expansion, deduplication and aggregation over both sheets.
    pub fn build(
        &self,
        contract_rows: &[RawRow],
        opportunity_rows: &[RawRow],
        today: NaiveDate,
    ) -> Result<(ReportOutput, RunSummary)> {
        self.config.validate()?;

        let window = Window::for_today(self.config.window_floor, today)?;
        let expander = AccrualExpander::new(today, window, self.config.classifier());
        debug!(
            "Accounting window {} to {} ({} months)",
            format_accounting_month(window.start),
            format_accounting_month(window.end),
            window.month_count()
        );

        info!("Processing {} contract rows", contract_rows.len());
        let contract_records = parse_rows(RecordKind::Contract, contract_rows, self.config)?;
        let expanded_contracts = expand_all(&expander, contract_records)?;
        let contracts = dedupe(&expanded_contracts);

        info!("Processing {} opportunity rows", opportunity_rows.len());
        let opportunity_records =
            parse_rows(RecordKind::Opportunity, opportunity_rows, self.config)?;
        let expanded_opportunities = expand_all(&expander, opportunity_records)?;
        let opportunities = dedupe(&expanded_opportunities);

        let pivots =
            RevenueAggregator::new(&self.config.total_marker).aggregate(&contracts, &opportunities);

        let summary = RunSummary {
            contract_rows: contract_rows.len(),
            opportunity_rows: opportunity_rows.len(),
            contract_records_expanded: expanded_contracts.len(),
            contract_records_kept: contracts.len(),
            opportunity_records_expanded: expanded_opportunities.len(),
            opportunity_records_kept: opportunities.len(),
            fiscal_years: pivots.keys().copied().collect(),
        };

        let output = ReportOutput {
            window,
            contracts,
            opportunities,
            pivots,
        };

        Ok((output, summary))
    }

    /// Reads both sheets, computes every table, then writes them. Nothing is
    /// written unless all tables were computed.
    pub fn run<S, K>(&self, source: &S, sink: &mut K, today: NaiveDate) -> Result<RunSummary>
    where
        S: RowSource + ?Sized,
        K: RowSink + ?Sized,
    {
        info!("Report run START (today = {})", today);

        let contract_rows = source.contracts()?;
        let opportunity_rows = source.opportunities()?;
        let (output, summary) = self.build(&contract_rows, &opportunity_rows, today)?;

        info!("Writing ledgers");
        sink.write_ledger(RecordKind::Contract, &output.contracts)?;
        sink.write_ledger(RecordKind::Opportunity, &output.opportunities)?;

        info!("Writing {} fiscal year summaries", output.pivots.len());
        for (fiscal_year, table) in &output.pivots {
            sink.write_pivot(&self.config.destination_name(*fiscal_year), table)?;
        }

        info!("Report run END");
        Ok(summary)
    }
}

pub fn run_report<S, K>(
    config: &ReportConfig,
    source: &S,
    sink: &mut K,
    today: NaiveDate,
) -> Result<RunSummary>
where
    S: RowSource + ?Sized,
    K: RowSink + ?Sized,
{
    ReportProcessor::new(config).run(source, sink, today)
}
