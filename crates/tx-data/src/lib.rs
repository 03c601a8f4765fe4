//! Block loading, time alignment and configuration for tank extraction

pub mod cache;
pub mod config;
pub mod filter;
pub mod index;
pub mod sources;

use thiserror::Error;
use tokio::task::JoinError;
use tx_core::CoreError;

// Re-exports
pub use cache::WindowCache;
pub use config::SessionConfig;
pub use filter::{epoc_filter, TrialWindows};
pub use index::SpikeIndex;
pub use sources::{read_block, BlockSource};

/// Errors that can occur in data operations
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Invalid trial window: {0}")]
    InvalidWindow(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Join error: {0}")]
    Join(#[from] JoinError),
}

impl From<csv::Error> for DataError {
    fn from(error: csv::Error) -> Self {
        match error.kind() {
            csv::ErrorKind::Io(io_err) => {
                DataError::Io(std::io::Error::new(io_err.kind(), error.to_string()))
            }
            _ => DataError::Csv(error.to_string()),
        }
    }
}
