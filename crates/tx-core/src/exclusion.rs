//! Trial exclusion files
//!
//! Exclusion files are plain text notes dropped next to (or above) a block.
//! The file name says which data and trials the exclusion applies to, and
//! the contents may carry `Exclude after: <n>s` / `Exclude before: <n>s`
//! lines bounding the excluded period. All other lines form the reason.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::time::TankTimestamp;

/// Default file name prefix for exclusion files
pub const EXCLUSION_FILE_PREFIX: &str = "exclude";

/// Errors raised while reading an exclusion file
#[derive(Error, Debug)]
pub enum ExclusionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("More than one line matches `Exclude after:`")]
    MultipleExcludeAfter,

    #[error("More than one line matches `Exclude before:`")]
    MultipleExcludeBefore,

    #[error("Invalid offset '{0}' in exclusion file")]
    InvalidOffset(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExclusionDataType {
    NeuralData,
    HrData,
}

impl ExclusionDataType {
    pub const ALL: [ExclusionDataType; 2] = [ExclusionDataType::NeuralData, ExclusionDataType::HrData];

    pub fn name(&self) -> &'static str {
        match self {
            ExclusionDataType::NeuralData => "NEURAL_DATA",
            ExclusionDataType::HrData => "HR_DATA",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExclusionTrialsType {
    AcousticTrials,
    ElectricalTrials,
}

impl ExclusionTrialsType {
    pub const ALL: [ExclusionTrialsType; 2] = [
        ExclusionTrialsType::AcousticTrials,
        ExclusionTrialsType::ElectricalTrials,
    ];
}

/// A period of a block to leave out of results
#[derive(Debug, Clone, PartialEq)]
pub struct TrialExclusion {
    pub data_types: BTreeSet<ExclusionDataType>,
    pub trials_types: BTreeSet<ExclusionTrialsType>,
    pub start_offset: TankTimestamp,
    pub end_offset: Option<TankTimestamp>,
    pub reason: String,
}

fn exclude_after_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^Exclude after:\s+(\d+)s?").expect("exclude after pattern is valid")
    })
}

fn exclude_before_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^Exclude before:\s+(\d+)s").expect("exclude before pattern is valid")
    })
}

fn parse_offset(captured: &str) -> Result<TankTimestamp, ExclusionError> {
    captured
        .parse::<f64>()
        .map(TankTimestamp)
        .map_err(|_| ExclusionError::InvalidOffset(captured.to_string()))
}

impl TrialExclusion {
    /// Parse the contents of an exclusion file
    pub fn from_reader<R: BufRead>(
        reader: R,
        data_types: BTreeSet<ExclusionDataType>,
        trials_types: BTreeSet<ExclusionTrialsType>,
    ) -> Result<Self, ExclusionError> {
        let mut start_offset: Option<TankTimestamp> = None;
        let mut end_offset: Option<TankTimestamp> = None;
        let mut reason: Vec<String> = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if let Some(caps) = exclude_after_pattern().captures(&line) {
                if start_offset.is_some() {
                    return Err(ExclusionError::MultipleExcludeAfter);
                }
                start_offset = Some(parse_offset(&caps[1])?);
                continue;
            }
            if let Some(caps) = exclude_before_pattern().captures(&line) {
                if end_offset.is_some() {
                    return Err(ExclusionError::MultipleExcludeBefore);
                }
                end_offset = Some(parse_offset(&caps[1])?);
                continue;
            }
            reason.push(line);
        }

        Ok(Self {
            data_types,
            trials_types,
            start_offset: start_offset.unwrap_or_default(),
            end_offset,
            reason: reason.join("\n").trim().to_string(),
        })
    }

    /// Read an exclusion file, classifying it by file name.
    ///
    /// Returns `Ok(None)` for files that are not trial exclusions.
    pub fn from_path(path: &Path, prefix: &str) -> Result<Option<Self>, ExclusionError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_lowercase();
        let remainder = name.get(prefix.len()..).unwrap_or_default();
        let remainder = remainder.strip_suffix(".txt").unwrap_or(remainder);

        let all_data = || ExclusionDataType::ALL.into_iter().collect::<BTreeSet<_>>();
        let all_trials = || ExclusionTrialsType::ALL.into_iter().collect::<BTreeSet<_>>();

        let (data_types, trials_types) = if remainder.is_empty() {
            (all_data(), all_trials())
        } else if remainder.contains("neural data") {
            (BTreeSet::from([ExclusionDataType::NeuralData]), all_trials())
        } else if remainder.contains("results aggregation - electrical")
            || remainder.contains("results aggregation - partial electrical")
        {
            (
                all_data(),
                BTreeSet::from([ExclusionTrialsType::ElectricalTrials]),
            )
        } else if remainder.contains("results aggregation") {
            (all_data(), all_trials())
        } else if remainder.contains("cf saving")
            || remainder.contains("bulk reprocessing")
            || remainder.contains("map generation")
        {
            debug!("Skipping non-trial exclusion file {}", path.display());
            return Ok(None);
        } else {
            warn!("Unknown exclusion type: {}", path.display());
            return Ok(None);
        };

        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), data_types, trials_types).map(Some)
    }

    /// Collect exclusions from `dir` and every directory above it
    pub fn from_autofind_in_path(dir: &Path, prefix: &str) -> Result<Vec<Self>, ExclusionError> {
        Self::autofind(dir.ancestors(), prefix)
    }

    /// Collect exclusions from `dir` and its ancestors, stopping at `root`
    /// (inclusive)
    pub fn from_autofind_between(dir: &Path, root: &Path, prefix: &str) -> Result<Vec<Self>, ExclusionError> {
        let mut reached_root = false;
        let dirs = dir.ancestors().take_while(move |p| {
            let take = !reached_root;
            reached_root = *p == root;
            take
        });
        Self::autofind(dirs, prefix)
    }

    fn autofind<'a>(
        dirs: impl Iterator<Item = &'a Path>,
        prefix: &str,
    ) -> Result<Vec<Self>, ExclusionError> {
        let prefix_lower = prefix.to_lowercase();
        let mut exclusions = Vec::new();
        let mut files_by_data_type: BTreeMap<ExclusionDataType, Vec<String>> = BTreeMap::new();

        for dir in dirs {
            let mut candidates: Vec<PathBuf> = Vec::new();
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Skipping {} while looking for exclusions: {}", dir.display(), e);
                    continue;
                }
            };
            for entry in entries {
                let path = entry?.path();
                let matches = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.to_lowercase().starts_with(&prefix_lower))
                    .unwrap_or(false);
                if matches && path.is_file() {
                    candidates.push(path);
                }
            }
            candidates.sort();

            for path in candidates {
                if let Some(exclusion) = Self::from_path(&path, prefix)? {
                    for data_type in &exclusion.data_types {
                        files_by_data_type
                            .entry(*data_type)
                            .or_default()
                            .push(path.display().to_string());
                    }
                    exclusions.push(exclusion);
                }
            }
        }

        for (data_type, files) in &files_by_data_type {
            if files.len() > 1 {
                warn!(
                    "More than one exclusion file for data type {}: {}",
                    data_type.name(),
                    files.join(", ")
                );
            }
        }

        Ok(exclusions)
    }

    /// Whether this exclusion covers the given kind of data and trials
    pub fn applies_to(&self, data_type: ExclusionDataType, trials_type: ExclusionTrialsType) -> bool {
        self.data_types.contains(&data_type) && self.trials_types.contains(&trials_type)
    }

    /// Whether a block timestamp falls inside the excluded period
    pub fn excludes(&self, t: TankTimestamp) -> bool {
        self.start_offset <= t && self.end_offset.map_or(true, |end| t < end)
    }
}
