use std::path::PathBuf;
use thiserror::Error;

/// All errors produced while preparing the visualization data.
#[derive(Error, Debug)]
pub enum PrepError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be created or written.
    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed or serialized.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A cached CSV table could not be read or written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A workbook could not be opened or one of its sheets decoded.
    #[error("Workbook error in {path}: {message}")]
    Workbook { path: PathBuf, message: String },

    /// The requested sheet is not part of the workbook.
    #[error("Sheet {sheet} not found in {path}")]
    MissingSheet { path: PathBuf, sheet: String },

    /// A required header column is absent from a table.
    #[error("Missing column {column} in {table}")]
    MissingColumn { table: String, column: String },

    /// A cell holds a value that cannot be interpreted.
    #[error("Invalid value {value:?} in {table} at row {row}, column {col}")]
    InvalidCell {
        table: String,
        row: usize,
        col: usize,
        value: String,
    },

    /// The header region of a survey sheet matches no known layout.
    #[error("Could not parse sheet layout of {sheet}: {reason}")]
    SheetLayout { sheet: String, reason: String },

    /// No survey workbook covers the requested year.
    #[error("No data available for year {0}")]
    NoDataForYear(u16),

    /// A region code is not one of BE, BXL, WAL, FL, VL.
    #[error("Invalid region {0}")]
    InvalidRegion(String),

    /// No known grouping matches an approximate grouping name.
    #[error("No grouping matches {0:?}")]
    NoGroupingMatch(String),

    /// Several groupings match and no choice was made.
    #[error("Grouping {input:?} is ambiguous: candidates={candidates:?}")]
    AmbiguousGrouping {
        input: String,
        candidates: Vec<String>,
    },

    /// A survey table lacks a usable grand total (code `0`).
    #[error("Missing or zero grand total in {sheet} / {group}")]
    MissingTotal { sheet: String, group: String },

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the prep crates.
pub type Result<T> = std::result::Result<T, PrepError>;
