use crate::error::{RevenueLedgerError, Result};
use chrono::{Datelike, Months, NaiveDate};

pub const ACCOUNTING_MONTH_FORMAT: &str = "%Y-%m";

pub fn month_start(year: i32, month: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        RevenueLedgerError::DateError(format!("No such month: {:04}-{:02}", year, month))
    })
}

/// Truncates a date to the first day of its month.
pub fn floor_to_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn prev_month_start(date: NaiveDate) -> Result<NaiveDate> {
    floor_to_month(date)
        .checked_sub_months(Months::new(1))
        .ok_or_else(|| RevenueLedgerError::DateError(format!("No month before {}", date)))
}

pub fn add_years(date: NaiveDate, years: u32) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(years * 12))
        .ok_or_else(|| {
            RevenueLedgerError::DateError(format!("Cannot add {} years to {}", years, date))
        })
}

pub fn months_between(start: NaiveDate, end: NaiveDate) -> i32 {
    let year_diff = end.year() - start.year();
    let month_diff = end.month() as i32 - start.month() as i32;
    year_diff * 12 + month_diff
}

pub fn format_accounting_month(date: NaiveDate) -> String {
    date.format(ACCOUNTING_MONTH_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_to_month() {
        let date = NaiveDate::from_ymd_opt(2023, 2, 28).unwrap();
        assert_eq!(
            floor_to_month(date),
            NaiveDate::from_ymd_opt(2023, 2, 1).unwrap()
        );
    }

    #[test]
    fn test_prev_month_start() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert_eq!(
            prev_month_start(date).unwrap(),
            NaiveDate::from_ymd_opt(2022, 12, 1).unwrap()
        );

        let date = NaiveDate::from_ymd_opt(2023, 3, 31).unwrap();
        assert_eq!(
            prev_month_start(date).unwrap(),
            NaiveDate::from_ymd_opt(2023, 2, 1).unwrap()
        );
    }

    #[test]
    fn test_add_years_keeps_month() {
        let date = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        assert_eq!(
            add_years(date, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
        );
    }

    #[test]
    fn test_months_between() {
        let start = NaiveDate::from_ymd_opt(2019, 4, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(months_between(start, end), 62);
        assert_eq!(months_between(end, start), -62);
    }

    #[test]
    fn test_format_accounting_month() {
        let date = NaiveDate::from_ymd_opt(2023, 7, 1).unwrap();
        assert_eq!(format_accounting_month(date), "2023-07");
    }

    #[test]
    fn test_month_start_rejects_bad_month() {
        assert!(month_start(2023, 13).is_err());
        assert_eq!(
            month_start(2024, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
        );
    }
}
