//! Epoch filtering: cut a block into windows aligned on an epoch's onsets

use tracing::debug;
use tx_core::block::Block;
use tx_core::time::{RelativeTimestamp, TimeRange};

use crate::DataError;

/// Result of filtering a block around each onset of an epoch
#[derive(Debug, Clone)]
pub struct TrialWindows {
    /// Name of the epoch the windows are aligned on
    pub epoch: String,
    /// One window per epoch onset, in onset order
    pub time_ranges: Vec<TimeRange>,
    /// The epoch's value for each window (e.g. trial number)
    pub values: Vec<f64>,
    /// Block restricted to events falling inside some window
    pub block: Block,
}

impl TrialWindows {
    pub fn len(&self) -> usize {
        self.time_ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_ranges.is_empty()
    }

    /// Iterate `(value, range)` pairs in window order
    pub fn iter(&self) -> impl Iterator<Item = (f64, &TimeRange)> {
        self.values.iter().copied().zip(self.time_ranges.iter())
    }
}

/// Build windows `[onset + from_offset, onset + from_offset + duration)`
/// for every onset of `epoch` and keep only events inside them
pub fn epoc_filter(
    block: &Block,
    epoch: &str,
    from_offset: RelativeTimestamp,
    duration: RelativeTimestamp,
) -> Result<TrialWindows, DataError> {
    if duration.seconds() <= 0.0 {
        return Err(DataError::InvalidWindow(format!(
            "window duration must be positive, got {}",
            duration
        )));
    }

    let anchor = block.epoc(epoch)?;
    let time_ranges: Vec<TimeRange> = (0..anchor.len())
        .map(|idx| TimeRange::around(anchor.onset_at(idx), from_offset, from_offset + duration))
        .collect();

    let mut filtered = Block::new(block.name.clone());
    for epoc in block.epocs.values() {
        filtered.insert_epoc(epoc.retain_in(&time_ranges));
    }
    for snip in block.snips.values() {
        filtered.insert_snip(snip.retain_in(&time_ranges));
    }

    debug!(
        "Filtered block {} on {}: {} windows of {}s",
        block.name,
        epoch,
        time_ranges.len(),
        duration
    );

    Ok(TrialWindows {
        epoch: epoch.to_string(),
        time_ranges,
        values: anchor.data.clone(),
        block: filtered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tx_core::block::{Epoc, Snip};
    use tx_core::time::TankTimestamp;

    fn block() -> Block {
        let mut block = Block::new("Block-1");
        let mut trials = Epoc::new("TriS");
        trials.push(100.0, 130.0, 1.0);
        trials.push(200.0, 230.0, 2.0);
        block.insert_epoc(trials);

        let mut stimuli = Epoc::new("StiS");
        stimuli.push(50.0, 50.25, 0.0);
        stimuli.push(100.5, 100.75, 0.0);
        stimuli.push(215.0, 215.25, 0.0);
        block.insert_epoc(stimuli);

        let mut spikes = Snip::new("CSPK");
        spikes.push(89.0, 1);
        spikes.push(90.0, 1);
        spikes.push(119.99, 2);
        spikes.push(120.0, 2);
        block.insert_snip(spikes);
        block
    }

    #[test]
    fn test_windows_follow_epoch_onsets() {
        let windows = epoc_filter(&block(), "TriS", RelativeTimestamp(-10.0), RelativeTimestamp(30.0)).unwrap();

        assert_eq!(windows.len(), 2);
        assert_eq!(windows.values, vec![1.0, 2.0]);
        assert_eq!(
            windows.time_ranges[0],
            TimeRange::new(TankTimestamp(90.0), TankTimestamp(120.0))
        );
        assert_eq!(
            windows.time_ranges[1],
            TimeRange::new(TankTimestamp(190.0), TankTimestamp(220.0))
        );
    }

    #[test]
    fn test_events_outside_windows_are_dropped() {
        let windows = epoc_filter(&block(), "TriS", RelativeTimestamp(-10.0), RelativeTimestamp(30.0)).unwrap();

        assert_eq!(windows.block.epoc("StiS").unwrap().onset, vec![100.5, 215.0]);
        assert_eq!(windows.block.snip("CSPK").unwrap().ts, vec![90.0, 119.99]);
    }

    #[test]
    fn test_missing_epoch_is_an_error() {
        let result = epoc_filter(&block(), "Nope", RelativeTimestamp(0.0), RelativeTimestamp(1.0));
        assert!(matches!(result, Err(DataError::Core(_))));
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        let result = epoc_filter(&block(), "TriS", RelativeTimestamp(0.0), RelativeTimestamp(0.0));
        assert!(matches!(result, Err(DataError::InvalidWindow(_))));
    }
}
