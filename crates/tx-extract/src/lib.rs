//! Session extraction: turns a recorded block into trials, tones and spike counts

pub mod processor;

use thiserror::Error;
use tx_core::CoreError;
use tx_data::DataError;

pub use processor::SessionProcessor;

/// Errors raised while extracting a session
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Spike count array has an invalid shape: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Failed to load block: {0}")]
    Load(String),

    #[error("Block has not been loaded")]
    NotLoaded,
}
