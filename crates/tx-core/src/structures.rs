//! Data structures for representing the processed data from a testing session

use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::time::{RelativeTimestamp, TankTimestamp};

/// Tone frequency in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AcousticFrequency(pub u32);

/// Tone attenuation in dB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AcousticAttenuation(pub i32);

impl fmt::Display for AcousticFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AcousticAttenuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timing of a single stimulus inside a trial
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stimulus {
    /// Starting timestamp in the block for the stimulus
    pub start_timestamp: TankTimestamp,
    /// Ending timestamp in the block for the stimulus
    pub end_timestamp: TankTimestamp,
    /// Ending timestamp in the block for the inter-stimulus interval
    pub inter_stimulus_interval_end_timestamp: TankTimestamp,

    pub start_relative_timestamp: RelativeTimestamp,
    pub end_relative_timestamp: RelativeTimestamp,
    pub inter_stimulus_interval_end_relative_timestamp: RelativeTimestamp,
}

impl Stimulus {
    /// Build a stimulus, deriving the relative timestamps from the trial start
    pub fn new(
        trial_start: TankTimestamp,
        start: TankTimestamp,
        end: TankTimestamp,
        inter_stimulus_interval_end: TankTimestamp,
    ) -> Self {
        Self {
            start_timestamp: start,
            end_timestamp: end,
            inter_stimulus_interval_end_timestamp: inter_stimulus_interval_end,
            start_relative_timestamp: start - trial_start,
            end_relative_timestamp: end - trial_start,
            inter_stimulus_interval_end_relative_timestamp: inter_stimulus_interval_end - trial_start,
        }
    }
}

/// A single tone/inter-tone-interval pair inside a trial
#[derive(Debug, Clone, PartialEq)]
pub struct Tone {
    pub stimulus: Stimulus,
    pub frequency: Option<AcousticFrequency>,
    pub attenuation: Option<AcousticAttenuation>,
}

/// Whether a trial made it into the results
#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    /// Spike counts stored as `[stimulus, channel]`, so row 0 is every
    /// channel for the first stimulus and column 9 is channel 10 for every
    /// stimulus
    Included {
        in_stimulus_spike_counts: Array2<u32>,
        out_stimulus_spike_counts: Array2<u32>,
    },
    Excluded {
        reason: String,
    },
}

/// A single acoustic trial of a session
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    pub trial_number: i64,
    pub start_timestamp: TankTimestamp,
    pub end_timestamp: TankTimestamp,

    pub base_frequency: Option<AcousticFrequency>,
    pub alternate_frequency: Option<AcousticFrequency>,
    pub amplitudes: Vec<AcousticAttenuation>,

    pub stimuli: Vec<Tone>,
    pub outcome: TrialOutcome,
}

impl Trial {
    pub fn is_excluded(&self) -> bool {
        matches!(self.outcome, TrialOutcome::Excluded { .. })
    }

    pub fn exclusion_reason(&self) -> Option<&str> {
        match &self.outcome {
            TrialOutcome::Excluded { reason } => Some(reason),
            TrialOutcome::Included { .. } => None,
        }
    }

    /// Derive base/alternate frequency and the amplitude list from the tones
    pub fn summarise_tones(&mut self) {
        let mut frequencies = self.stimuli.iter().filter_map(|t| t.frequency);
        self.base_frequency = frequencies.next();
        self.alternate_frequency = match self.base_frequency {
            Some(base) => frequencies.find(|f| *f != base),
            None => None,
        };

        self.amplitudes.clear();
        for attenuation in self.stimuli.iter().filter_map(|t| t.attenuation) {
            if !self.amplitudes.contains(&attenuation) {
                self.amplitudes.push(attenuation);
            }
        }
    }
}

/// Holds data for a full session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub block_name: String,
    pub channel_count: usize,
    pub trials: Vec<Trial>,
}

impl Session {
    pub fn new(block_name: impl Into<String>, channel_count: usize) -> Self {
        Self {
            block_name: block_name.into(),
            channel_count,
            trials: Vec::new(),
        }
    }

    pub fn trial_count(&self) -> usize {
        self.trials.len()
    }

    pub fn included(&self) -> impl Iterator<Item = &Trial> {
        self.trials.iter().filter(|t| !t.is_excluded())
    }

    pub fn excluded(&self) -> impl Iterator<Item = &Trial> {
        self.trials.iter().filter(|t| t.is_excluded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(start: f64, frequency: Option<u32>, attenuation: Option<i32>) -> Tone {
        Tone {
            stimulus: Stimulus::new(
                TankTimestamp(0.0),
                TankTimestamp(start),
                TankTimestamp(start + 0.25),
                TankTimestamp(start + 0.5),
            ),
            frequency: frequency.map(AcousticFrequency),
            attenuation: attenuation.map(AcousticAttenuation),
        }
    }

    fn trial(stimuli: Vec<Tone>) -> Trial {
        Trial {
            trial_number: 1,
            start_timestamp: TankTimestamp(0.0),
            end_timestamp: TankTimestamp(10.0),
            base_frequency: None,
            alternate_frequency: None,
            amplitudes: Vec::new(),
            stimuli,
            outcome: TrialOutcome::Excluded {
                reason: String::new(),
            },
        }
    }

    #[test]
    fn test_stimulus_relative_timestamps() {
        let stimulus = Stimulus::new(
            TankTimestamp(100.0),
            TankTimestamp(101.0),
            TankTimestamp(101.25),
            TankTimestamp(101.5),
        );
        assert_eq!(stimulus.start_relative_timestamp, RelativeTimestamp(1.0));
        assert_eq!(stimulus.end_relative_timestamp, RelativeTimestamp(1.25));
        assert_eq!(
            stimulus.inter_stimulus_interval_end_relative_timestamp,
            RelativeTimestamp(1.5)
        );
    }

    #[test]
    fn test_summarise_tones() {
        let mut t = trial(vec![
            tone(0.0, Some(4000), Some(20)),
            tone(0.5, None, Some(20)),
            tone(1.0, Some(4000), Some(30)),
            tone(1.5, Some(6000), Some(20)),
        ]);
        t.summarise_tones();

        assert_eq!(t.base_frequency, Some(AcousticFrequency(4000)));
        assert_eq!(t.alternate_frequency, Some(AcousticFrequency(6000)));
        assert_eq!(t.amplitudes, vec![AcousticAttenuation(20), AcousticAttenuation(30)]);
    }

    #[test]
    fn test_summarise_tones_single_frequency() {
        let mut t = trial(vec![tone(0.0, Some(4000), None), tone(0.5, Some(4000), None)]);
        t.summarise_tones();

        assert_eq!(t.base_frequency, Some(AcousticFrequency(4000)));
        assert_eq!(t.alternate_frequency, None);
        assert!(t.amplitudes.is_empty());
    }

    #[test]
    fn test_session_partitions_trials() {
        let mut session = Session::new("Block-1", 2);
        session.trials.push(trial(vec![]));
        let mut included = trial(vec![]);
        included.outcome = TrialOutcome::Included {
            in_stimulus_spike_counts: Array2::zeros((0, 2)),
            out_stimulus_spike_counts: Array2::zeros((0, 2)),
        };
        session.trials.push(included);

        assert_eq!(session.trial_count(), 2);
        assert_eq!(session.included().count(), 1);
        assert_eq!(session.excluded().count(), 1);
    }
}
