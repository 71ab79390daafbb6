use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RevenueLedgerError {
    #[error("{sheet} row {row}: missing field '{field}'")]
    MissingField {
        sheet: String,
        row: usize,
        field: String,
    },

    #[error("{sheet} row {row}: field '{field}' has invalid date '{value}' (expected YYYY-MM-DD)")]
    InvalidDate {
        sheet: String,
        row: usize,
        field: String,
        value: String,
    },

    #[error("{sheet} row {row}: field '{field}' is not an integer: '{value}'")]
    InvalidNumber {
        sheet: String,
        row: usize,
        field: String,
        value: String,
    },

    #[error("{sheet} row {row}: probability {value} must be between 0 and 100")]
    InvalidProbability {
        sheet: String,
        row: usize,
        value: i64,
    },

    #[error("{sheet} row {row}: monthly amount overflows ({quantity} x {rate})")]
    AmountOverflow {
        sheet: String,
        row: usize,
        quantity: i64,
        rate: i64,
    },

    #[error("{sheet} row {row}: unrecognized cadence '{value}'")]
    UnknownCadence {
        sheet: String,
        row: usize,
        value: String,
    },

    #[error("{sheet} row {row}: owner id '{value}' has no display name")]
    UnmappedOwner {
        sheet: String,
        row: usize,
        value: String,
    },

    #[error("{sheet} row {row}: status code '{value}' has no deployment mapping")]
    UnmappedStatus {
        sheet: String,
        row: usize,
        value: String,
    },

    #[error("Accounting month {month} precedes the start of fiscal year {seed_year}")]
    FiscalYearOutOfRange { month: NaiveDate, seed_year: i32 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RevenueLedgerError>;
