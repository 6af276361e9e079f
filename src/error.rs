//! Error handling for the filing pipeline
//!
//! Defines custom error types and establishes a unified Result type
//! using anyhow for context chaining and error propagation.

use chrono::NaiveDate;
use thiserror::Error;

/// Core error types for ingestion and table operations
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("missing source file: {0}")]
    MissingFile(String),

    #[error("schema mismatch in {unit}: {field} column not found")]
    SchemaMismatch { unit: String, field: &'static str },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("duplicate record: {ticker} already has {date}")]
    Duplicate { ticker: String, date: NaiveDate },

    #[error("out-of-order append: {ticker} {date} is not after {last}")]
    OutOfOrder {
        ticker: String,
        date: NaiveDate,
        last: NaiveDate,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// Result type alias for pipeline operations
pub type Result<T> = anyhow::Result<T>;
