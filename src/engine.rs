use crate::error::{RevenueLedgerError, Result};
use crate::fiscal::FiscalYearClassifier;
use crate::ingestion::SourceRecord;
use crate::schema::{Cadence, RecordKind};
use crate::utils::{add_years, floor_to_month, month_start, months_between, prev_month_start};
use crate::{AccrualRecord, AccrualStatus};
use chrono::{Datelike, NaiveDate};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The accounting horizon of one run. Both bounds are first-of-month dates
/// and both are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start.day() != 1 || end.day() != 1 {
            return Err(RevenueLedgerError::DateError(format!(
                "Window bounds must be month starts, got {} and {}",
                start, end
            )));
        }
        if end < start {
            return Err(RevenueLedgerError::DateError(format!(
                "Window end {} precedes start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// From the fixed floor up to the first of the month one year after `today`.
    pub fn for_today(floor: NaiveDate, today: NaiveDate) -> Result<Self> {
        let end = add_years(floor_to_month(today), 1)?;
        Self::new(floor, end)
    }

    pub fn contains(&self, month: NaiveDate) -> bool {
        self.start <= month && month <= self.end
    }

    pub fn month_count(&self) -> usize {
        (months_between(self.start, self.end) + 1) as usize
    }
}

pub struct AccrualExpander {
    current_month: NaiveDate,
    window: Window,
    classifier: FiscalYearClassifier,
}

impl AccrualExpander {
    pub fn new(today: NaiveDate, window: Window, classifier: FiscalYearClassifier) -> Self {
        Self {
            current_month: floor_to_month(today),
            window,
            classifier,
        }
    }

    /// Produces the accrual records one source row implies, newest month first.
    pub fn expand(&self, source: &Arc<SourceRecord>) -> Result<Vec<AccrualRecord>> {
        if source.kind == RecordKind::Opportunity && source.anchor_date > self.window.end {
            debug!(
                "Skipping opportunity {} ({}): close date {} is after {}",
                source.entity_id, source.entity_name, source.anchor_date, self.window.end
            );
            return Ok(Vec::new());
        }

        let months = match (source.kind, source.cadence) {
            (_, Cadence::Monthly) => self.monthly_months(source.anchor_date)?,
            (RecordKind::Contract, Cadence::Annual) => {
                self.contract_annual_months(source.anchor_date)?
            }
            (RecordKind::Opportunity, Cadence::Annual) => {
                self.opportunity_annual_months(source.anchor_date)?
            }
        };

        let amount = source.mrr;
        months
            .into_iter()
            .map(|accounting_month| {
                Ok(AccrualRecord {
                    source: Arc::clone(source),
                    accounting_month,
                    status: self.status_for(source.kind, accounting_month),
                    fiscal_year: self.classifier.classify(accounting_month)?,
                    amount,
                })
            })
            .collect()
    }

    fn status_for(&self, kind: RecordKind, accounting_month: NaiveDate) -> AccrualStatus {
        match kind {
            RecordKind::Opportunity => AccrualStatus::Forecast,
            RecordKind::Contract if accounting_month > self.current_month => {
                AccrualStatus::Unconfirmed
            }
            RecordKind::Contract => AccrualStatus::Confirmed,
        }
    }

    /// Every month from the window end back to the anchor month (or the
    /// window start, whichever is later).
    fn monthly_months(&self, anchor: NaiveDate) -> Result<Vec<NaiveDate>> {
        let first = floor_to_month(anchor).max(self.window.start);
        let mut months = Vec::new();
        let mut month = self.window.end;
        while month >= first {
            months.push(month);
            month = prev_month_start(month)?;
        }
        Ok(months)
    }

    /// The anchor month of each year, walking down from the window end year.
    ///
    /// Raw years stop above the window start year. When the window start month
    /// is on or before the anchor month every raw year is shifted back by one,
    /// so the newest year is not revisited even if its anchor month is still
    /// inside the window.
    fn contract_annual_months(&self, anchor: NaiveDate) -> Result<Vec<NaiveDate>> {
        let shift = i32::from(self.window.start.month() <= anchor.month());
        let mut months = Vec::new();

        for raw_year in ((self.window.start.year() + 1)..=self.window.end.year()).rev() {
            let year = raw_year - shift;
            if year < anchor.year() {
                break;
            }
            let month = month_start(year, anchor.month())?;
            if month > self.window.end {
                continue;
            }
            months.push(month);
        }

        Ok(months)
    }

    /// The close month of each year from the window end year down to the
    /// close year itself.
    fn opportunity_annual_months(&self, anchor: NaiveDate) -> Result<Vec<NaiveDate>> {
        let mut months = Vec::new();

        for year in (anchor.year()..=self.window.end.year()).rev() {
            let month = month_start(year, anchor.month())?;
            if month > self.window.end {
                continue;
            }
            if month < self.window.start {
                break;
            }
            months.push(month);
        }

        Ok(months)
    }
}

/// Expands every row of one sheet. Rows that imply no months contribute nothing.
pub fn expand_all(
    expander: &AccrualExpander,
    records: Vec<SourceRecord>,
) -> Result<Vec<AccrualRecord>> {
    let mut ledger = Vec::new();
    for record in records {
        let source = Arc::new(record);
        let expanded = expander.expand(&source)?;
        debug!(
            "{} {} expanded into {} months",
            source.kind,
            source.entity_id,
            expanded.len()
        );
        ledger.extend(expanded);
    }
    Ok(ledger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DeploymentStatus;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn floor() -> NaiveDate {
        ymd(2019, 4, 1)
    }

    fn source(kind: RecordKind, cadence: Cadence, anchor: NaiveDate) -> Arc<SourceRecord> {
        Arc::new(SourceRecord {
            kind,
            entity_id: "ENT-1".to_string(),
            entity_name: "North High".to_string(),
            owner: "aaaa".to_string(),
            cadence,
            anchor_date: anchor,
            quantity: 2,
            rate: 1000,
            probability: match kind {
                RecordKind::Contract => None,
                RecordKind::Opportunity => Some(50),
            },
            mrr: match kind {
                RecordKind::Contract => 2000,
                RecordKind::Opportunity => 1000,
            },
            deployment: DeploymentStatus::Full,
        })
    }

    fn months_of(records: &[AccrualRecord]) -> Vec<NaiveDate> {
        records.iter().map(|r| r.accounting_month).collect()
    }

    #[test]
    fn test_window_for_today() {
        let window = Window::for_today(floor(), ymd(2023, 6, 17)).unwrap();
        assert_eq!(window.start, ymd(2019, 4, 1));
        assert_eq!(window.end, ymd(2024, 6, 1));
        assert!(window.contains(ymd(2024, 6, 1)));
        assert!(!window.contains(ymd(2024, 7, 1)));
        assert_eq!(window.month_count(), 63);
    }

    #[test]
    fn test_window_rejects_mid_month_bounds() {
        assert!(Window::new(ymd(2019, 4, 2), ymd(2020, 1, 1)).is_err());
        assert!(Window::new(ymd(2020, 1, 1), ymd(2019, 4, 1)).is_err());
    }

    #[test]
    fn test_monthly_contract_stops_at_anchor_month() {
        let window = Window::new(floor(), ymd(2020, 6, 1)).unwrap();
        let expander = AccrualExpander::new(ymd(2020, 4, 10), window, FiscalYearClassifier::default());

        let records = expander
            .expand(&source(RecordKind::Contract, Cadence::Monthly, ymd(2020, 3, 15)))
            .unwrap();

        assert_eq!(
            months_of(&records),
            vec![ymd(2020, 6, 1), ymd(2020, 5, 1), ymd(2020, 4, 1), ymd(2020, 3, 1)]
        );
        let statuses: Vec<AccrualStatus> = records.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                AccrualStatus::Unconfirmed,
                AccrualStatus::Unconfirmed,
                AccrualStatus::Confirmed,
                AccrualStatus::Confirmed
            ]
        );
        assert!(records.iter().all(|r| r.amount == 2000));
        assert_eq!(records[0].fiscal_year, 2020);
        assert_eq!(records[1].fiscal_year, 2019);
    }

    #[test]
    fn test_monthly_contract_clamped_to_window_start() {
        let window = Window::new(floor(), ymd(2019, 6, 1)).unwrap();
        let expander = AccrualExpander::new(ymd(2019, 6, 1), window, FiscalYearClassifier::default());

        let records = expander
            .expand(&source(RecordKind::Contract, Cadence::Monthly, ymd(2015, 1, 1)))
            .unwrap();

        assert_eq!(
            months_of(&records),
            vec![ymd(2019, 6, 1), ymd(2019, 5, 1), ymd(2019, 4, 1)]
        );
    }

    #[test]
    fn test_contract_anchored_after_window_yields_nothing() {
        let window = Window::new(floor(), ymd(2024, 6, 1)).unwrap();
        let expander = AccrualExpander::new(ymd(2023, 6, 1), window, FiscalYearClassifier::default());

        let records = expander
            .expand(&source(RecordKind::Contract, Cadence::Monthly, ymd(2024, 8, 1)))
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_annual_contract_with_anchor_month_after_april() {
        let window = Window::new(floor(), ymd(2024, 6, 1)).unwrap();
        let expander = AccrualExpander::new(ymd(2023, 6, 1), window, FiscalYearClassifier::default());

        let records = expander
            .expand(&source(RecordKind::Contract, Cadence::Annual, ymd(2020, 5, 20)))
            .unwrap();

        // 2024-05 is inside the window but the year shift never reaches it.
        assert_eq!(
            months_of(&records),
            vec![ymd(2023, 5, 1), ymd(2022, 5, 1), ymd(2021, 5, 1), ymd(2020, 5, 1)]
        );
        assert!(records.iter().all(|r| r.status == AccrualStatus::Confirmed));
    }

    #[test]
    fn test_annual_contract_with_anchor_month_before_april() {
        let window = Window::new(floor(), ymd(2024, 6, 1)).unwrap();
        let expander = AccrualExpander::new(ymd(2023, 6, 1), window, FiscalYearClassifier::default());

        let records = expander
            .expand(&source(RecordKind::Contract, Cadence::Annual, ymd(2022, 2, 1)))
            .unwrap();

        assert_eq!(
            months_of(&records),
            vec![ymd(2024, 2, 1), ymd(2023, 2, 1), ymd(2022, 2, 1)]
        );
        assert_eq!(records[0].status, AccrualStatus::Unconfirmed);
        assert_eq!(records[1].status, AccrualStatus::Confirmed);
    }

    #[test]
    fn test_annual_contract_never_emits_after_window_end() {
        let window = Window::new(floor(), ymd(2024, 1, 1)).unwrap();
        let expander = AccrualExpander::new(ymd(2023, 1, 1), window, FiscalYearClassifier::default());

        for month in 1..=12 {
            let records = expander
                .expand(&source(RecordKind::Contract, Cadence::Annual, ymd(2020, month, 1)))
                .unwrap();
            assert!(records.iter().all(|r| r.accounting_month <= window.end));
        }

        // Boundary is inclusive: an anchor month equal to the window end is kept.
        let records = expander
            .expand(&source(RecordKind::Contract, Cadence::Annual, ymd(2021, 1, 1)))
            .unwrap();
        assert_eq!(months_of(&records)[0], ymd(2024, 1, 1));
    }

    #[test]
    fn test_annual_contract_before_floor_stays_in_window() {
        let window = Window::new(floor(), ymd(2021, 6, 1)).unwrap();
        let expander = AccrualExpander::new(ymd(2020, 6, 1), window, FiscalYearClassifier::default());

        let records = expander
            .expand(&source(RecordKind::Contract, Cadence::Annual, ymd(2016, 2, 1)))
            .unwrap();
        assert_eq!(months_of(&records), vec![ymd(2021, 2, 1), ymd(2020, 2, 1)]);
    }

    #[test]
    fn test_monthly_opportunity_is_forecast() {
        let window = Window::new(floor(), ymd(2024, 6, 1)).unwrap();
        let expander = AccrualExpander::new(ymd(2023, 6, 1), window, FiscalYearClassifier::default());

        let records = expander
            .expand(&source(RecordKind::Opportunity, Cadence::Monthly, ymd(2024, 3, 31)))
            .unwrap();

        assert_eq!(
            months_of(&records),
            vec![ymd(2024, 6, 1), ymd(2024, 5, 1), ymd(2024, 4, 1), ymd(2024, 3, 1)]
        );
        assert!(records.iter().all(|r| r.status == AccrualStatus::Forecast));
        assert!(records.iter().all(|r| r.amount == 1000));
    }

    #[test]
    fn test_opportunity_closing_after_window_is_skipped() {
        let window = Window::new(floor(), ymd(2024, 6, 1)).unwrap();
        let expander = AccrualExpander::new(ymd(2023, 6, 1), window, FiscalYearClassifier::default());

        for cadence in [Cadence::Monthly, Cadence::Annual] {
            let records = expander
                .expand(&source(RecordKind::Opportunity, cadence, ymd(2024, 6, 2)))
                .unwrap();
            assert!(records.is_empty());
        }
    }

    #[test]
    fn test_annual_opportunity_includes_close_year() {
        let window = Window::new(floor(), ymd(2024, 6, 1)).unwrap();
        let expander = AccrualExpander::new(ymd(2023, 6, 1), window, FiscalYearClassifier::default());

        let records = expander
            .expand(&source(RecordKind::Opportunity, Cadence::Annual, ymd(2022, 9, 30)))
            .unwrap();

        // 2024-09 is after the window end and is skipped, not a stop.
        assert_eq!(months_of(&records), vec![ymd(2023, 9, 1), ymd(2022, 9, 1)]);
        assert!(records.iter().all(|r| r.status == AccrualStatus::Forecast));
        assert_eq!(records[0].fiscal_year, 2023);
        assert_eq!(records[1].fiscal_year, 2022);
    }

    #[test]
    fn test_annual_opportunity_closed_before_floor_stops_at_window_start() {
        let window = Window::new(floor(), ymd(2021, 6, 1)).unwrap();
        let expander = AccrualExpander::new(ymd(2020, 6, 1), window, FiscalYearClassifier::default());

        let records = expander
            .expand(&source(RecordKind::Opportunity, Cadence::Annual, ymd(2017, 6, 20)))
            .unwrap();

        assert_eq!(
            months_of(&records),
            vec![ymd(2021, 6, 1), ymd(2020, 6, 1), ymd(2019, 6, 1)]
        );
        assert!(records.iter().all(|r| r.accounting_month >= floor()));
        assert!(records.iter().all(|r| r.amount == 1000));
    }

    #[test]
    fn test_records_share_source_without_copying() {
        let window = Window::new(floor(), ymd(2020, 6, 1)).unwrap();
        let expander = AccrualExpander::new(ymd(2020, 6, 1), window, FiscalYearClassifier::default());
        let row = source(RecordKind::Contract, Cadence::Monthly, ymd(2020, 1, 1));

        let records = expander.expand(&row).unwrap();
        assert_eq!(records.len(), 6);
        assert!(records.iter().all(|r| Arc::ptr_eq(&r.source, &row)));
    }
}
