//! Post-processing steps applied to per-trial spike count arrays

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use ndarray::Array2;
use tracing::{debug, info};

use crate::CoreError;

/// File name prefix of channel maps stored next to a block
pub const CHANNEL_MAP_FILE_PREFIX: &str = "channel map";

/// Takes the output array from a trial and modifies it in some way,
/// returning a new array of equal size and meaning
pub trait DataProcessor {
    fn transform(&self, array: &Array2<u32>) -> Result<Array2<u32>, CoreError>;
}

/// Remaps channels in an array of `data[stimulus, channel]`.
/// Channels must be numbered `1..=n`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRemapper {
    channel_map: Vec<(u16, u16)>,
}

/// Accepted header rows for a channel map file
const VALID_HEADERS: [(&str, &str); 2] = [("TDT", "Mapping"), ("TDT", "Mapped")];

impl ChannelRemapper {
    /// Validate the mapping `(source, destination)` pairs and build a remapper
    pub fn new(channel_map: Vec<(u16, u16)>) -> Result<Self, CoreError> {
        let max_channel = channel_map.len();
        // Occurrences per channel, in first-seen order
        let mut src_freq: Vec<(u16, usize)> = Vec::new();
        let mut dst_freq: Vec<(u16, usize)> = Vec::new();
        let mut src_over_max: Vec<u16> = Vec::new();
        let mut dst_over_max: Vec<u16> = Vec::new();

        for &(src, dst) in &channel_map {
            debug!("Mapping source channel {} to destination {}", src, dst);
            if src as usize > max_channel && !src_over_max.contains(&src) {
                src_over_max.push(src);
            }
            if dst as usize > max_channel && !dst_over_max.contains(&dst) {
                dst_over_max.push(dst);
            }
            bump(&mut src_freq, src);
            bump(&mut dst_freq, dst);
        }
        src_over_max.sort_unstable();
        dst_over_max.sort_unstable();

        let mut errors: Vec<String> = Vec::new();
        let duplicated_src = join_duplicates(&src_freq);
        if !duplicated_src.is_empty() {
            errors.push(format!(
                "Provided channel map includes duplicate source channels: {}",
                duplicated_src
            ));
        }
        let duplicated_dst = join_duplicates(&dst_freq);
        if !duplicated_dst.is_empty() {
            errors.push(format!(
                "Provided channel map includes duplicate destination channels: {}",
                duplicated_dst
            ));
        }
        if !src_over_max.is_empty() {
            errors.push(format!(
                "One or more source channel numbers exceed max channel number ({}): {}",
                max_channel,
                join(&src_over_max)
            ));
        }
        if !dst_over_max.is_empty() {
            errors.push(format!(
                "One or more destination channel numbers exceed max channel number ({}): {}",
                max_channel,
                join(&dst_over_max)
            ));
        }
        if channel_map.iter().any(|&(src, dst)| src == 0 || dst == 0) {
            errors.push("Channel numbers start at 1".to_string());
        }

        if !errors.is_empty() {
            return Err(CoreError::InvalidChannelMap(errors.join("; ")));
        }

        Ok(Self { channel_map })
    }

    pub fn channel_count(&self) -> usize {
        self.channel_map.len()
    }

    pub fn mapping(&self) -> &[(u16, u16)] {
        &self.channel_map
    }

    /// Read a tab separated channel map with a `TDT\tMapping` header
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, CoreError> {
        let mut lines = reader.lines();
        let header = lines.next().transpose()?.unwrap_or_default();
        let header_columns: Vec<&str> = header.trim().split('\t').collect();
        let valid_header = header_columns.len() == 2
            && VALID_HEADERS
                .iter()
                .any(|(a, b)| header_columns[0] == *a && header_columns[1] == *b);
        if !valid_header {
            return Err(CoreError::MalformedChannelMap(format!(
                "Invalid header line: {:?}",
                header_columns
            )));
        }

        let mut channel_map = Vec::new();
        for (line_no, line) in lines.enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split('\t');
            let pair = match (parts.next(), parts.next(), parts.next()) {
                (Some(src), Some(dst), None) => src
                    .trim()
                    .parse::<u16>()
                    .ok()
                    .zip(dst.trim().parse::<u16>().ok()),
                _ => None,
            };
            match pair {
                Some(pair) => channel_map.push(pair),
                None => {
                    return Err(CoreError::MalformedChannelMap(format!(
                        "line {}: expected two tab separated channel numbers, got {:?}",
                        line_no + 2,
                        line
                    )))
                }
            }
        }

        Self::new(channel_map)
    }

    pub fn from_path(path: &Path) -> Result<Self, CoreError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Look in `dir` for a file whose name starts with `prefix` (case insensitive)
    pub fn from_autofind_in_path(dir: &Path, prefix: &str) -> Result<Option<Self>, CoreError> {
        let prefix = prefix.to_lowercase();
        let mut candidates: Vec<PathBuf> = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.to_lowercase().starts_with(&prefix))
                .unwrap_or(false);
            if matches && path.is_file() {
                candidates.push(path);
            }
        }
        candidates.sort();

        match candidates.into_iter().next() {
            Some(path) => {
                info!("Loading channel mappings from {}", path.display());
                Self::from_path(&path).map(Some)
            }
            None => Ok(None),
        }
    }
}

impl DataProcessor for ChannelRemapper {
    fn transform(&self, array: &Array2<u32>) -> Result<Array2<u32>, CoreError> {
        if self.channel_map.len() != array.ncols() {
            return Err(CoreError::ChannelCountMismatch {
                expected: self.channel_map.len(),
                actual: array.ncols(),
            });
        }

        let mut out = Array2::zeros(array.raw_dim());
        for &(src, dst) in &self.channel_map {
            out.column_mut(dst as usize - 1)
                .assign(&array.column(src as usize - 1));
        }
        Ok(out)
    }
}

fn bump(freq: &mut Vec<(u16, usize)>, channel: u16) {
    match freq.iter_mut().find(|(c, _)| *c == channel) {
        Some((_, n)) => *n += 1,
        None => freq.push((channel, 1)),
    }
}

fn join_duplicates(freq: &[(u16, usize)]) -> String {
    freq.iter()
        .filter(|(_, n)| *n > 1)
        .map(|(c, _)| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join(channels: &[u16]) -> String {
    channels
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
