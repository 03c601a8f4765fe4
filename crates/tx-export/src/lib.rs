//! Writing extracted sessions to disk
//!
//! Two layouts are supported: a long-format table (one row per stimulus,
//! channel and capture window) built as an Arrow `RecordBatch`, and a
//! spreadsheet-style grid that lays each trial out as a block of cells.

pub mod csv;
pub mod sheet;
pub mod table;

use thiserror::Error;

pub use self::csv::write_batch;
pub use sheet::{write_session, Cell, Offset, Sheet};
pub use table::session_table;

/// Errors that can occur while exporting
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("Cell {cell} cannot move by {cols} columns and {rows} rows")]
    OutOfSheet { cell: String, cols: u32, rows: u32 },
}

impl From<::csv::Error> for ExportError {
    fn from(error: ::csv::Error) -> Self {
        match error.kind() {
            ::csv::ErrorKind::Io(io_err) => {
                ExportError::Io(std::io::Error::new(io_err.kind(), error.to_string()))
            }
            _ => ExportError::Csv(error.to_string()),
        }
    }
}
