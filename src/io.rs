use crate::aggregate::PivotTable;
use crate::error::Result;
use crate::ingestion::RawRow;
use crate::schema::{Cadence, DisplayLabels, RecordKind};
use crate::utils::format_accounting_month;
use crate::{AccrualRecord, AccrualStatus};
use chrono::NaiveDate;
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const TMP_SUFFIX: &str = "tmp";

const LEDGER_HEADERS: [&str; 15] = [
    "kind",
    "entity_id",
    "entity_name",
    "owner",
    "cadence",
    "anchor_date",
    "quantity",
    "rate",
    "probability",
    "deployment",
    "mrr",
    "accounting_month",
    "status",
    "fiscal_year",
    "amount",
];

const PIVOT_KEY_HEADERS: [&str; 3] = ["fiscal_year", "accounting_month", "owner"];

/// Supplies the raw contract and opportunity sheets.
pub trait RowSource {
    fn contracts(&self) -> Result<Vec<RawRow>>;
    fn opportunities(&self) -> Result<Vec<RawRow>>;
}

/// Persists the run's output. Each call replaces whatever the destination
/// held before.
pub trait RowSink {
    fn write_ledger(&mut self, kind: RecordKind, records: &[AccrualRecord]) -> Result<()>;
    fn write_pivot(&mut self, destination: &str, table: &PivotTable) -> Result<()>;
}

/// Reads both sheets from header-bearing CSV exports.
pub struct CsvRowSource {
    contracts_path: PathBuf,
    opportunities_path: PathBuf,
}

impl CsvRowSource {
    pub fn new(contracts_path: impl Into<PathBuf>, opportunities_path: impl Into<PathBuf>) -> Self {
        Self {
            contracts_path: contracts_path.into(),
            opportunities_path: opportunities_path.into(),
        }
    }
}

impl RowSource for CsvRowSource {
    fn contracts(&self) -> Result<Vec<RawRow>> {
        read_csv_rows(&self.contracts_path)
    }

    fn opportunities(&self) -> Result<Vec<RawRow>> {
        read_csv_rows(&self.opportunities_path)
    }
}

pub fn read_csv_rows(path: &Path) -> Result<Vec<RawRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader
        .deserialize::<RawRow>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Writes every destination as a CSV file inside one directory.
pub struct CsvDirectorySink {
    dir: PathBuf,
    labels: DisplayLabels,
}

impl CsvDirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            labels: DisplayLabels::default(),
        }
    }

    pub fn with_labels(mut self, labels: DisplayLabels) -> Self {
        self.labels = labels;
        self
    }

    pub fn ledger_path(&self, kind: RecordKind) -> PathBuf {
        self.dir.join(format!("{}_ledger.csv", kind.sheet_name()))
    }

    pub fn pivot_path(&self, destination: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", destination))
    }

    fn replace(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if !self.dir.exists() {
            info!("Creating output directory {}", self.dir.display());
            fs::create_dir_all(&self.dir)?;
        }
        if path.exists() {
            debug!("Replacing {}", path.display());
        } else {
            info!("Creating destination {}", path.display());
        }
        write_atomic(path, contents)
    }
}

impl RowSink for CsvDirectorySink {
    fn write_ledger(&mut self, kind: RecordKind, records: &[AccrualRecord]) -> Result<()> {
        let contents = render_ledger_csv(records, &self.labels)?;
        self.replace(&self.ledger_path(kind), &contents)
    }

    fn write_pivot(&mut self, destination: &str, table: &PivotTable) -> Result<()> {
        let contents = render_pivot_csv(table, &self.labels)?;
        self.replace(&self.pivot_path(destination), &contents)
    }
}

/// Stages the contents next to the target and renames over it, so readers
/// see either the old file or the complete new one.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{}.{}", existing, TMP_SUFFIX),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

#[derive(Debug, Serialize)]
struct LedgerCsvRow<'a> {
    kind: RecordKind,
    entity_id: &'a str,
    entity_name: &'a str,
    owner: &'a str,
    cadence: Cadence,
    anchor_date: NaiveDate,
    quantity: i64,
    rate: i64,
    probability: Option<i64>,
    deployment: &'a str,
    mrr: i64,
    accounting_month: String,
    status: &'a str,
    fiscal_year: i32,
    amount: i64,
}

impl<'a> LedgerCsvRow<'a> {
    fn new(record: &'a AccrualRecord, labels: &'a DisplayLabels) -> Self {
        let source = &record.source;
        Self {
            kind: source.kind,
            entity_id: &source.entity_id,
            entity_name: &source.entity_name,
            owner: &source.owner,
            cadence: source.cadence,
            anchor_date: source.anchor_date,
            quantity: source.quantity,
            rate: source.rate,
            probability: source.probability,
            deployment: labels.deployment(source.deployment),
            mrr: source.mrr,
            accounting_month: format_accounting_month(record.accounting_month),
            status: labels.accrual(record.status),
            fiscal_year: record.fiscal_year,
            amount: record.amount,
        }
    }
}

pub fn render_ledger_csv(records: &[AccrualRecord], labels: &DisplayLabels) -> Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(LEDGER_HEADERS)?;
    for record in records {
        wtr.serialize(LedgerCsvRow::new(record, labels))?;
    }
    Ok(wtr.into_inner().map_err(|e| e.into_error())?)
}

pub fn render_pivot_csv(table: &PivotTable, labels: &DisplayLabels) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    let status_headers = AccrualStatus::ALL.map(|status| labels.accrual(status));
    wtr.write_record(PIVOT_KEY_HEADERS.iter().chain(status_headers.iter()))?;
    for row in &table.rows {
        let (year, month) = match row.accounting_month {
            Some(month) => (table.fiscal_year.to_string(), format_accounting_month(month)),
            None => (String::new(), String::new()),
        };
        let [confirmed, unconfirmed, forecast] = row.totals.columns();
        wtr.write_record([
            year,
            month,
            row.owner.clone(),
            confirmed.to_string(),
            unconfirmed.to_string(),
            forecast.to_string(),
        ])?;
    }
    Ok(wtr.into_inner().map_err(|e| e.into_error())?)
}

/// Row source backed by in-memory tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryRowSource {
    pub contracts: Vec<RawRow>,
    pub opportunities: Vec<RawRow>,
}

impl RowSource for MemoryRowSource {
    fn contracts(&self) -> Result<Vec<RawRow>> {
        Ok(self.contracts.clone())
    }

    fn opportunities(&self) -> Result<Vec<RawRow>> {
        Ok(self.opportunities.clone())
    }
}

/// Sink that keeps the latest output of each destination in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub ledgers: BTreeMap<RecordKind, Vec<AccrualRecord>>,
    pub pivots: BTreeMap<String, PivotTable>,
}

impl RowSink for MemorySink {
    fn write_ledger(&mut self, kind: RecordKind, records: &[AccrualRecord]) -> Result<()> {
        self.ledgers.insert(kind, records.to_vec());
        Ok(())
    }

    fn write_pivot(&mut self, destination: &str, table: &PivotTable) -> Result<()> {
        self.pivots.insert(destination.to_string(), table.clone());
        Ok(())
    }
}
