//! Core functionality for tank recording extraction
//!
//! This crate provides the fundamental data model (timestamps, blocks,
//! sessions) and the processing primitives shared by the other crates.

pub mod block;
pub mod exclusion;
pub mod processors;
pub mod structures;
pub mod time;
pub mod utils;

use thiserror::Error;

// Re-export commonly used types
pub use block::{Block, Epoc, EventType, Snip};
pub use exclusion::{ExclusionDataType, ExclusionError, ExclusionTrialsType, TrialExclusion};
pub use processors::{ChannelRemapper, DataProcessor};
pub use structures::{
    AcousticAttenuation, AcousticFrequency, Session, Stimulus, Tone, Trial, TrialOutcome,
};
pub use time::{RelativeTimestamp, TankTimestamp, TimeRange};
pub use data::RecordingSource;

/// Errors raised by the core data model
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel map contains errors: {0}")]
    InvalidChannelMap(String),

    #[error("Data structure of provided channel map is not valid: {0}")]
    MalformedChannelMap(String),

    #[error("Number of channels in the array ({actual}) does not match number of channels in the map ({expected})")]
    ChannelCountMismatch { expected: usize, actual: usize },

    #[error("Store '{0}' not found in block")]
    MissingStore(String),
}

pub mod data {
    use crate::block::{Block, EventType};

    /// Trait for anything that can produce a recording block
    #[async_trait::async_trait]
    pub trait RecordingSource: Send + Sync {
        /// Load the block, restricted to the requested event families
        async fn load(&self, event_types: &[EventType]) -> anyhow::Result<Block>;

        /// Get the source name/path
        fn source_name(&self) -> &str;
    }
}
