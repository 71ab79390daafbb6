use crate::{AccrualRecord, AccrualStatus};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::AddAssign;

/// Summed amounts per accrual status. Missing statuses are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusTotals {
    pub confirmed: i64,
    pub unconfirmed: i64,
    pub forecast: i64,
}

impl StatusTotals {
    pub fn add(&mut self, status: AccrualStatus, amount: i64) {
        match status {
            AccrualStatus::Confirmed => self.confirmed += amount,
            AccrualStatus::Unconfirmed => self.unconfirmed += amount,
            AccrualStatus::Forecast => self.forecast += amount,
        }
    }

    pub fn get(&self, status: AccrualStatus) -> i64 {
        match status {
            AccrualStatus::Confirmed => self.confirmed,
            AccrualStatus::Unconfirmed => self.unconfirmed,
            AccrualStatus::Forecast => self.forecast,
        }
    }

    /// Values in the fixed column order: confirmed, unconfirmed, forecast.
    pub fn columns(&self) -> [i64; 3] {
        AccrualStatus::ALL.map(|status| self.get(status))
    }

    pub fn sum(&self) -> i64 {
        self.confirmed + self.unconfirmed + self.forecast
    }
}

impl AddAssign for StatusTotals {
    fn add_assign(&mut self, other: Self) {
        self.confirmed += other.confirmed;
        self.unconfirmed += other.unconfirmed;
        self.forecast += other.forecast;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PivotRow {
    /// `None` on the synthetic total row.
    pub accounting_month: Option<NaiveDate>,
    pub owner: String,
    pub totals: StatusTotals,
}

impl PivotRow {
    pub fn is_total(&self) -> bool {
        self.accounting_month.is_none()
    }
}

/// One fiscal year of the MRR summary. The last row is always the total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PivotTable {
    pub fiscal_year: i32,
    pub rows: Vec<PivotRow>,
}

impl PivotTable {
    pub fn owner_rows(&self) -> &[PivotRow] {
        match self.rows.split_last() {
            Some((last, rest)) if last.is_total() => rest,
            _ => &self.rows,
        }
    }

    pub fn total(&self) -> Option<&PivotRow> {
        self.rows.last().filter(|row| row.is_total())
    }
}

pub struct RevenueAggregator {
    total_marker: String,
}

impl RevenueAggregator {
    pub fn new(total_marker: impl Into<String>) -> Self {
        Self {
            total_marker: total_marker.into(),
        }
    }

    /// Pivots the deduplicated contract and opportunity ledgers into
    /// (fiscal year, accounting month, owner) rows with one column per status.
    ///
    /// Rows are ordered by accounting month, then owner. Each fiscal year gets
    /// a trailing total row owned by the total marker.
    pub fn aggregate(
        &self,
        contracts: &[AccrualRecord],
        opportunities: &[AccrualRecord],
    ) -> BTreeMap<i32, PivotTable> {
        let mut grouped: BTreeMap<i32, BTreeMap<(NaiveDate, &str), StatusTotals>> =
            BTreeMap::new();

        for record in contracts.iter().chain(opportunities) {
            grouped
                .entry(record.fiscal_year)
                .or_default()
                .entry((record.accounting_month, record.source.owner.as_str()))
                .or_default()
                .add(record.status, record.amount);
        }

        grouped
            .into_iter()
            .map(|(fiscal_year, cells)| {
                let mut total = StatusTotals::default();
                let mut rows: Vec<PivotRow> = cells
                    .into_iter()
                    .map(|((accounting_month, owner), totals)| {
                        total += totals;
                        PivotRow {
                            accounting_month: Some(accounting_month),
                            owner: owner.to_string(),
                            totals,
                        }
                    })
                    .collect();

                rows.push(PivotRow {
                    accounting_month: None,
                    owner: self.total_marker.clone(),
                    totals: total,
                });

                (fiscal_year, PivotTable { fiscal_year, rows })
            })
            .collect()
    }
}
