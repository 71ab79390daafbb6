use crate::error::{RevenueLedgerError, Result};
use chrono::{Datelike, NaiveDate};

pub const DEFAULT_FISCAL_SEED_YEAR: i32 = 2012;
pub const FISCAL_YEAR_START_MONTH: u32 = 6;

/// Maps accounting months onto fiscal years running June 1 to May 31.
///
/// Fiscal year `Y` covers `[Y-06-01, (Y+1)-06-01)`. Lookup walks forward from
/// the seed year until the containing interval is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiscalYearClassifier {
    seed_year: i32,
}

impl Default for FiscalYearClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_FISCAL_SEED_YEAR)
    }
}

impl FiscalYearClassifier {
    pub fn new(seed_year: i32) -> Self {
        Self { seed_year }
    }

    pub fn fiscal_year_start(year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, FISCAL_YEAR_START_MONTH, 1)
    }

    /// Returns the fiscal year containing `month_start`.
    ///
    /// Dates before the seed year's June 1 are rejected.
    pub fn classify(&self, month_start: NaiveDate) -> Result<i32> {
        let out_of_range = || RevenueLedgerError::FiscalYearOutOfRange {
            month: month_start,
            seed_year: self.seed_year,
        };

        let seed_start = Self::fiscal_year_start(self.seed_year).ok_or_else(out_of_range)?;
        if month_start < seed_start {
            return Err(out_of_range());
        }

        let mut candidate = self.seed_year;
        loop {
            let next_start = Self::fiscal_year_start(candidate + 1).ok_or_else(out_of_range)?;
            if month_start < next_start {
                return Ok(candidate);
            }
            // Bounded: the year after month_start.year() always starts later.
            debug_assert!(candidate <= month_start.year());
            candidate += 1;
        }
    }
}
