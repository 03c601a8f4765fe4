//! Session extraction parameters

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::DataError;

/// Durations of the presented tones, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneParameters {
    pub tone_duration: f64,
    pub inter_tone_interval: f64,
}

impl Default for ToneParameters {
    fn default() -> Self {
        Self {
            tone_duration: 0.25,
            inter_tone_interval: 0.25,
        }
    }
}

/// Spike capture windows, in seconds.
///
/// In-tone offsets are relative to tone onset; out-of-tone offsets are
/// relative to the start of the inter-tone interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureWindows {
    pub in_tone_start: f64,
    pub in_tone_end: f64,
    pub out_tone_start: f64,
    pub out_tone_end: f64,
}

impl Default for CaptureWindows {
    fn default() -> Self {
        Self {
            in_tone_start: 0.0,
            in_tone_end: 0.2,
            out_tone_start: 0.1,
            out_tone_end: 0.25,
        }
    }
}

/// Store names of the session epochs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpochNames {
    /// Trial count and duration
    pub trial: String,
    /// Stimulus count and duration
    pub stimulus: String,
    pub attenuation: String,
    pub acoustic_frequency: String,
    pub reference_channels_bitmask: String,
    pub stimulation_channels_bitmask: String,
    pub stimulation_current: String,
    pub stimulation_frequency: String,
}

impl Default for EpochNames {
    fn default() -> Self {
        Self {
            trial: "TriS".to_string(),
            stimulus: "StiS".to_string(),
            attenuation: "Attn".to_string(),
            acoustic_frequency: "AFrq".to_string(),
            reference_channels_bitmask: "ReBM".to_string(),
            stimulation_channels_bitmask: "StBM".to_string(),
            stimulation_current: "Curr".to_string(),
            stimulation_frequency: "Freq".to_string(),
        }
    }
}

/// Optional replacements for [`EpochNames`]; `None` keeps the current name
#[derive(Debug, Clone, Default)]
pub struct EpochNameOverrides {
    pub trial: Option<String>,
    pub stimulus: Option<String>,
    pub attenuation: Option<String>,
    pub acoustic_frequency: Option<String>,
    pub reference_channels_bitmask: Option<String>,
    pub stimulation_channels_bitmask: Option<String>,
    pub stimulation_current: Option<String>,
    pub stimulation_frequency: Option<String>,
}

/// Spike snippet store and channel layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpikeConfig {
    pub store: String,
    pub channel_count: usize,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            store: "CSPK".to_string(),
            channel_count: 32,
        }
    }
}

/// Window around each trial onset, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialWindowConfig {
    /// Offset from trial start (negative for before trial start)
    pub from_offset: f64,
    /// Offset from trial start until which data is included
    pub to_offset: f64,
}

impl Default for TrialWindowConfig {
    fn default() -> Self {
        Self {
            from_offset: -10.0,
            to_offset: 20.0,
        }
    }
}

impl TrialWindowConfig {
    pub fn duration(&self) -> f64 {
        self.to_offset - self.from_offset
    }
}

/// Full configuration of a session extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub tones: ToneParameters,
    pub capture: CaptureWindows,
    pub epochs: EpochNames,
    pub spikes: SpikeConfig,
    pub trial_window: TrialWindowConfig,
    /// Seconds an epoc onset may differ from a stimulus onset and still be
    /// treated as simultaneous
    pub epoch_timestamp_error_margin: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tones: ToneParameters::default(),
            capture: CaptureWindows::default(),
            epochs: EpochNames::default(),
            spikes: SpikeConfig::default(),
            trial_window: TrialWindowConfig::default(),
            epoch_timestamp_error_margin: 0.001,
        }
    }
}

impl SessionConfig {
    /// Load a configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let contents = std::fs::read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as pretty printed JSON
    pub fn save(&self, path: &Path) -> Result<(), DataError> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Check values are usable. Returns the first problem found.
    pub fn validate(&self) -> Result<(), DataError> {
        if self.tones.tone_duration <= 0.0 {
            return Err(DataError::Config("tone_duration must be positive".to_string()));
        }
        if self.tones.inter_tone_interval < 0.0 {
            return Err(DataError::Config("inter_tone_interval must not be negative".to_string()));
        }
        if self.capture.in_tone_end <= self.capture.in_tone_start {
            return Err(DataError::Config(
                "in_tone_end must be after in_tone_start".to_string(),
            ));
        }
        if self.capture.out_tone_end <= self.capture.out_tone_start {
            return Err(DataError::Config(
                "out_tone_end must be after out_tone_start".to_string(),
            ));
        }
        if self.trial_window.to_offset <= self.trial_window.from_offset {
            return Err(DataError::Config(format!(
                "trial window to_offset ({}) must be after from_offset ({})",
                self.trial_window.to_offset, self.trial_window.from_offset
            )));
        }
        if self.spikes.channel_count == 0 {
            return Err(DataError::Config("channel_count must be at least 1".to_string()));
        }
        if self.epoch_timestamp_error_margin < 0.0 {
            return Err(DataError::Config(
                "epoch_timestamp_error_margin must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Set duration and interval of the presented tones
    pub fn set_tone_parameters(&mut self, tone_duration: f64, inter_tone_interval: f64) {
        self.tones = ToneParameters {
            tone_duration,
            inter_tone_interval,
        };
    }

    /// Set time windows for spike count inclusion during extraction
    pub fn set_extraction_parameters(&mut self, capture: CaptureWindows) {
        self.capture = capture;
    }

    /// Replace the epoch name for one or more session epochs. Any epochs not
    /// specified are not replaced.
    pub fn set_epoch_names(&mut self, overrides: EpochNameOverrides) {
        let epochs = &mut self.epochs;
        let fields = [
            (&mut epochs.trial, overrides.trial),
            (&mut epochs.stimulus, overrides.stimulus),
            (&mut epochs.attenuation, overrides.attenuation),
            (&mut epochs.acoustic_frequency, overrides.acoustic_frequency),
            (&mut epochs.reference_channels_bitmask, overrides.reference_channels_bitmask),
            (&mut epochs.stimulation_channels_bitmask, overrides.stimulation_channels_bitmask),
            (&mut epochs.stimulation_current, overrides.stimulation_current),
            (&mut epochs.stimulation_frequency, overrides.stimulation_frequency),
        ];
        for (current, replacement) in fields {
            if let Some(name) = replacement.filter(|n| !n.is_empty()) {
                *current = name;
            }
        }
    }

    /// Human readable summary of the current configuration
    pub fn parameter_summary(&self) -> String {
        let sections: [(&str, Vec<(&str, String)>); 5] = [
            (
                "Tones",
                vec![
                    ("tone_duration", self.tones.tone_duration.to_string()),
                    ("inter_tone_interval", self.tones.inter_tone_interval.to_string()),
                ],
            ),
            (
                "Offsets",
                vec![
                    ("in_tone_capture_start_offset", self.capture.in_tone_start.to_string()),
                    ("in_tone_capture_end_offset", self.capture.in_tone_end.to_string()),
                    ("out_tone_capture_start_offset", self.capture.out_tone_start.to_string()),
                    ("out_tone_capture_end_offset", self.capture.out_tone_end.to_string()),
                ],
            ),
            (
                "Epochs",
                vec![
                    ("trial_epoch", self.epochs.trial.clone()),
                    ("stimulus_epoch", self.epochs.stimulus.clone()),
                    ("attenuation_epoch", self.epochs.attenuation.clone()),
                    ("acoustic_frequency_epoch", self.epochs.acoustic_frequency.clone()),
                    ("reference_channels_bitmask_epoch", self.epochs.reference_channels_bitmask.clone()),
                    ("stimulation_channels_bitmask_epoch", self.epochs.stimulation_channels_bitmask.clone()),
                    ("stimulation_current_epoch", self.epochs.stimulation_current.clone()),
                    ("stimulation_frequency_epoch", self.epochs.stimulation_frequency.clone()),
                ],
            ),
            (
                "Spikes",
                vec![
                    ("spike_store", self.spikes.store.clone()),
                    ("channel_count", self.spikes.channel_count.to_string()),
                ],
            ),
            (
                "Trial Window",
                vec![
                    ("from_trial_offset", self.trial_window.from_offset.to_string()),
                    ("to_trial_offset", self.trial_window.to_offset.to_string()),
                    ("epoch_timestamp_error_margin", self.epoch_timestamp_error_margin.to_string()),
                ],
            ),
        ];

        let mut output: Vec<String> = Vec::new();
        for (heading, fields) in sections {
            if !output.is_empty() {
                output.push(String::new());
            }
            output.push(heading.to_uppercase());
            output.push("-".repeat(heading.len()));
            for (field, value) in fields {
                output.push(format!("{}: {}", title_case(field), value));
            }
        }
        output.join("\n")
    }
}

/// `in_tone_capture` -> `In Tone Capture`
fn title_case(field: &str) -> String {
    field
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
