//! Error handling for the lot-pairing engine
//!
//! A single typed error enum covers every failure mode a component can raise.

#![allow(dead_code)]

use chrono::NaiveDate;
use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no database is currently open")]
    NoDatabaseOpen,

    #[error("database schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i64, supported: i64 },

    #[error("operation requires {expected} rate mode but the store is in {actual} mode")]
    WrongRateMode { expected: String, actual: String },

    #[error("no rate available for {currency} on {date}")]
    RateUnavailable { currency: String, date: NaiveDate },

    #[error("invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("pairing {0} is locked")]
    LockedPairing(i64),

    #[error("insufficient quantity: {pairings_created} pairings created, {total_quantity_paired} paired, {message}")]
    InsufficientQuantity {
        pairings_created: u32,
        total_quantity_paired: f64,
        message: String,
    },

    #[error("row {row_index} failed to parse: {message}")]
    RowParseError { row_index: usize, message: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using `EngineError`
pub type Result<T> = std::result::Result<T, EngineError>;
