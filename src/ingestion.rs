use crate::error::{RevenueLedgerError, Result};
use crate::schema::{Cadence, DeploymentStatus, RecordKind, ReportConfig};
use chrono::NaiveDate;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

/// One spreadsheet row as delivered by the CRM sync: column name to cell text.
pub type RawRow = BTreeMap<String, String>;

/// A typed contract or opportunity row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRecord {
    pub kind: RecordKind,
    pub entity_id: String,
    pub entity_name: String,
    /// Owner display name, already resolved from the CRM owner id.
    pub owner: String,
    pub cadence: Cadence,
    /// Contract start date for contracts, close date for opportunities.
    pub anchor_date: NaiveDate,
    pub quantity: i64,
    pub rate: i64,
    /// Win probability in percent; opportunities only.
    pub probability: Option<i64>,
    /// Monthly recurring amount, truncated toward zero. Fixed at parse time.
    pub mrr: i64,
    pub deployment: DeploymentStatus,
}

struct RowReader<'a> {
    sheet: &'static str,
    row_number: usize,
    row: &'a RawRow,
}

impl<'a> RowReader<'a> {
    fn text(&self, field: &str) -> Result<&'a str> {
        self.row
            .get(field)
            .map(|value| value.trim())
            .ok_or_else(|| RevenueLedgerError::MissingField {
                sheet: self.sheet.to_string(),
                row: self.row_number,
                field: field.to_string(),
            })
    }

    fn integer(&self, field: &str) -> Result<i64> {
        let value = self.text(field)?;
        value
            .replace(',', "")
            .parse::<i64>()
            .map_err(|_| RevenueLedgerError::InvalidNumber {
                sheet: self.sheet.to_string(),
                row: self.row_number,
                field: field.to_string(),
                value: value.to_string(),
            })
    }

    fn date(&self, field: &str) -> Result<NaiveDate> {
        let value = self.text(field)?;
        NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
            RevenueLedgerError::InvalidDate {
                sheet: self.sheet.to_string(),
                row: self.row_number,
                field: field.to_string(),
                value: value.to_string(),
            }
        })
    }

    fn owner(&self, field: &str, config: &ReportConfig) -> Result<String> {
        let id = self.text(field)?;
        config
            .owners
            .get(id)
            .cloned()
            .ok_or_else(|| RevenueLedgerError::UnmappedOwner {
                sheet: self.sheet.to_string(),
                row: self.row_number,
                value: id.to_string(),
            })
    }

    fn cadence(&self, field: &str, config: &ReportConfig) -> Result<Cadence> {
        let label = self.text(field)?;
        config
            .cadences
            .get(label)
            .copied()
            .ok_or_else(|| RevenueLedgerError::UnknownCadence {
                sheet: self.sheet.to_string(),
                row: self.row_number,
                value: label.to_string(),
            })
    }

    fn deployment(&self, field: &str, config: &ReportConfig) -> Result<DeploymentStatus> {
        let code = self.text(field)?;
        config
            .deployment_statuses
            .get(code)
            .copied()
            .ok_or_else(|| RevenueLedgerError::UnmappedStatus {
                sheet: self.sheet.to_string(),
                row: self.row_number,
                value: code.to_string(),
            })
    }

    fn mrr(&self, quantity: i64, rate: i64, probability: Option<i64>) -> Result<i64> {
        let base = quantity.checked_mul(rate);
        let amount = match probability {
            Some(probability) => base
                .and_then(|base| base.checked_mul(probability))
                .map(|weighted| weighted / 100),
            None => base,
        };
        amount.ok_or_else(|| RevenueLedgerError::AmountOverflow {
            sheet: self.sheet.to_string(),
            row: self.row_number,
            quantity,
            rate,
        })
    }
}

pub fn parse_contract(
    row: &RawRow,
    row_number: usize,
    config: &ReportConfig,
) -> Result<SourceRecord> {
    let columns = &config.contract_columns;
    let reader = RowReader {
        sheet: RecordKind::Contract.sheet_name(),
        row_number,
        row,
    };
    let quantity = reader.integer(&columns.quantity)?;
    let rate = reader.integer(&columns.rate)?;

    Ok(SourceRecord {
        kind: RecordKind::Contract,
        entity_id: reader.text(&columns.entity_id)?.to_string(),
        entity_name: reader.text(&columns.entity_name)?.to_string(),
        owner: reader.owner(&columns.owner, config)?,
        cadence: reader.cadence(&columns.cadence, config)?,
        anchor_date: reader.date(&columns.anchor_date)?,
        quantity,
        rate,
        probability: None,
        mrr: reader.mrr(quantity, rate, None)?,
        deployment: reader.deployment(&columns.status, config)?,
    })
}

pub fn parse_opportunity(
    row: &RawRow,
    row_number: usize,
    config: &ReportConfig,
) -> Result<SourceRecord> {
    let columns = &config.opportunity_columns;
    let reader = RowReader {
        sheet: RecordKind::Opportunity.sheet_name(),
        row_number,
        row,
    };

    let probability = reader.integer(&columns.probability)?;
    if !(0..=100).contains(&probability) {
        return Err(RevenueLedgerError::InvalidProbability {
            sheet: reader.sheet.to_string(),
            row: row_number,
            value: probability,
        });
    }
    let quantity = reader.integer(&columns.quantity)?;
    let rate = reader.integer(&columns.rate)?;

    Ok(SourceRecord {
        kind: RecordKind::Opportunity,
        entity_id: reader.text(&columns.entity_id)?.to_string(),
        entity_name: reader.text(&columns.entity_name)?.to_string(),
        owner: reader.owner(&columns.owner, config)?,
        cadence: reader.cadence(&columns.cadence, config)?,
        anchor_date: reader.date(&columns.anchor_date)?,
        quantity,
        rate,
        probability: Some(probability),
        mrr: reader.mrr(quantity, rate, Some(probability))?,
        deployment: reader.deployment(&columns.status, config)?,
    })
}

/// Coerces a whole sheet. The first malformed row fails the sheet.
pub fn parse_rows(
    kind: RecordKind,
    rows: &[RawRow],
    config: &ReportConfig,
) -> Result<Vec<SourceRecord>> {
    let records = rows
        .iter()
        .enumerate()
        .map(|(idx, row)| match kind {
            RecordKind::Contract => parse_contract(row, idx + 1, config),
            RecordKind::Opportunity => parse_opportunity(row, idx + 1, config),
        })
        .collect::<Result<Vec<_>>>()?;

    debug!("Parsed {} {} rows", records.len(), kind.sheet_name());
    Ok(records)
}
