//! Indexing for efficient spike counting

use tracing::debug;
use tx_core::block::Snip;
use tx_core::time::TimeRange;

/// Per-channel sorted spike timestamps
#[derive(Debug, Clone)]
pub struct SpikeIndex {
    /// `channels[c]` holds the timestamps of channel `c + 1`
    channels: Vec<Vec<f64>>,
}

impl SpikeIndex {
    /// Build an index for channels `1..=channel_count`
    pub fn from_snip(snip: &Snip, channel_count: usize) -> Self {
        let mut channels: Vec<Vec<f64>> = vec![Vec::new(); channel_count];
        let mut dropped = 0usize;
        for (&ts, &chan) in snip.ts.iter().zip(&snip.chan) {
            match (chan as usize).checked_sub(1).and_then(|c| channels.get_mut(c)) {
                Some(timestamps) => timestamps.push(ts),
                None => dropped += 1,
            }
        }
        for timestamps in &mut channels {
            timestamps.sort_by(f64::total_cmp);
        }
        if dropped > 0 {
            debug!(
                "Dropped {} spikes of {} on channels outside 1..={}",
                dropped, snip.name, channel_count
            );
        }
        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of spikes on a 1-based channel inside `[range.start, range.end)`
    pub fn count_in_range(&self, channel: usize, range: &TimeRange) -> u32 {
        let Some(timestamps) = channel.checked_sub(1).and_then(|c| self.channels.get(c)) else {
            return 0;
        };
        let start = timestamps.partition_point(|&t| t < range.start.seconds());
        let end = timestamps.partition_point(|&t| t < range.end.seconds());
        end.saturating_sub(start) as u32
    }

    /// Spike counts for every channel, in channel order
    pub fn counts_in_range(&self, range: &TimeRange) -> Vec<u32> {
        (1..=self.channels.len())
            .map(|channel| self.count_in_range(channel, range))
            .collect()
    }
}
