//! Session processing for acoustic tone trials
//!
//! A session is cut into trials around each onset of the trial epoch. Inside
//! each trial every stimulus onset becomes a [`Tone`], annotated with the
//! acoustic frequency and attenuation epocs recorded alongside it, and spikes
//! are counted per channel during the tone and during the inter-tone
//! interval.

use std::sync::Arc;

use ndarray::Array2;
use tracing::{debug, info, warn};
use tx_core::block::{Block, Epoc, EventType};
use tx_core::data::RecordingSource;
use tx_core::exclusion::{ExclusionDataType, ExclusionTrialsType, TrialExclusion};
use tx_core::processors::{ChannelRemapper, DataProcessor};
use tx_core::structures::{
    AcousticAttenuation, AcousticFrequency, Session, Stimulus, Tone, Trial, TrialOutcome,
};
use tx_core::time::{RelativeTimestamp, TankTimestamp, TimeRange};
use tx_core::utils::timed;
use tx_data::cache::{WindowCache, WindowKey};
use tx_data::{epoc_filter, SessionConfig, SpikeIndex};

use crate::ExtractError;

/// Extracts spike counts for each tone of each trial in a block
pub struct SessionProcessor {
    config: SessionConfig,
    source: Option<Box<dyn RecordingSource>>,
    block: Option<Arc<Block>>,
    windows: WindowCache,
}

impl SessionProcessor {
    /// Create a processor that loads its block lazily from `source`
    pub fn new(config: SessionConfig, source: Box<dyn RecordingSource>) -> Self {
        Self {
            config,
            source: Some(source),
            block: None,
            windows: WindowCache::new(),
        }
    }

    /// Create a processor over an already loaded block
    pub fn with_block(config: SessionConfig, block: Block) -> Self {
        Self {
            config,
            source: None,
            block: Some(Arc::new(block)),
            windows: WindowCache::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Replace the configuration. Cached trial windows are dropped when the
    /// trial epoch changes.
    pub fn set_config(&mut self, config: SessionConfig) {
        if config.epochs.trial != self.config.epochs.trial {
            self.windows.clear();
        }
        self.config = config;
    }

    /// Load the block from the source, once
    pub async fn load(&mut self) -> Result<Arc<Block>, ExtractError> {
        if let Some(block) = &self.block {
            return Ok(block.clone());
        }
        let source = self.source.as_ref().ok_or(ExtractError::NotLoaded)?;
        info!("Reading block from {}", source.source_name());
        let block = source
            .load(&[EventType::Epocs, EventType::Snips])
            .await
            .map_err(|e| ExtractError::Load(format!("{:#}", e)))?;
        let block = Arc::new(block);
        self.block = Some(block.clone());
        Ok(block)
    }

    /// Load the block if needed, then extract the session
    pub async fn extract_session(
        &mut self,
        exclusions: &[TrialExclusion],
        remapper: Option<&ChannelRemapper>,
    ) -> Result<Session, ExtractError> {
        let block = self.load().await?;
        self.extract_from(&block, exclusions, remapper)
    }

    /// Extract the session from the block already held by this processor
    pub fn extract_loaded(
        &self,
        exclusions: &[TrialExclusion],
        remapper: Option<&ChannelRemapper>,
    ) -> Result<Session, ExtractError> {
        let block = self.block.as_ref().ok_or(ExtractError::NotLoaded)?;
        self.extract_from(block, exclusions, remapper)
    }

    fn extract_from(
        &self,
        block: &Block,
        exclusions: &[TrialExclusion],
        remapper: Option<&ChannelRemapper>,
    ) -> Result<Session, ExtractError> {
        self.config.validate()?;
        let config = &self.config;
        let from_offset = RelativeTimestamp(config.trial_window.from_offset);
        let duration = RelativeTimestamp(config.trial_window.duration());

        let key = WindowKey::new(&config.epochs.trial, from_offset.seconds(), duration.seconds());
        let windows = timed("epoch filter", || {
            self.windows.get_or_try_insert_with(key, || {
                epoc_filter(block, &config.epochs.trial, from_offset, duration)
            })
        })?;

        let filtered = &windows.block;
        let stimuli = filtered.epoc(&config.epochs.stimulus)?;
        // Tags and spikes are looked up in the unfiltered block: tags may lead
        // a stimulus at the window start, and capture windows may run past
        // the window end
        let frequencies = optional_store(block, &config.epochs.acoustic_frequency);
        let attenuations = optional_store(block, &config.epochs.attenuation);
        let channel_count = config.spikes.channel_count;
        let spikes = SpikeIndex::from_snip(block.snip(&config.spikes.store)?, channel_count);

        let exclusions: Vec<&TrialExclusion> = exclusions
            .iter()
            .filter(|e| e.applies_to(ExclusionDataType::NeuralData, ExclusionTrialsType::AcousticTrials))
            .collect();

        let mut session = Session::new(block.name.clone(), channel_count);
        timed("trial extraction", || -> Result<(), ExtractError> {
            for (value, range) in windows.iter() {
                let trial = self.extract_trial(
                    value,
                    range,
                    stimuli,
                    frequencies,
                    attenuations,
                    &spikes,
                    &exclusions,
                    remapper,
                )?;
                session.trials.push(trial);
            }
            Ok(())
        })?;

        info!(
            "Extracted {} trials from {} ({} excluded)",
            session.trial_count(),
            session.block_name,
            session.excluded().count()
        );
        Ok(session)
    }

    #[allow(clippy::too_many_arguments)]
    fn extract_trial(
        &self,
        value: f64,
        range: &TimeRange,
        stimuli: &Epoc,
        frequencies: Option<&Epoc>,
        attenuations: Option<&Epoc>,
        spikes: &SpikeIndex,
        exclusions: &[&TrialExclusion],
        remapper: Option<&ChannelRemapper>,
    ) -> Result<Trial, ExtractError> {
        let config = &self.config;
        let margin = config.epoch_timestamp_error_margin;
        let trial_number = value.trunc() as i64;
        debug!(
            "Starting processing of trial number {}, start timestamp {}, end timestamp {}",
            trial_number, range.start, range.end
        );

        let first = stimuli.onset.partition_point(|&t| t < range.start.seconds());
        let mut tones = Vec::new();
        for idx in first..stimuli.len() {
            let onset = stimuli.onset_at(idx);
            if !range.contains(onset) {
                break;
            }
            debug!("Processing stimulus: stimulus_epoch_idx: {}, timestamp: {}", idx, onset);

            let offset = stimuli.offset_at(idx);
            let stimulus = Stimulus::new(
                range.start,
                onset,
                offset,
                offset + RelativeTimestamp(config.tones.inter_tone_interval),
            );
            tones.push(Tone {
                stimulus,
                frequency: value_near(frequencies, onset, margin)
                    .map(|v| AcousticFrequency(v.round() as u32)),
                attenuation: value_near(attenuations, onset, margin)
                    .map(|v| AcousticAttenuation(v.round() as i32)),
            });
        }

        let trial_onset = range.start - RelativeTimestamp(config.trial_window.from_offset);
        let outcome = match exclusions.iter().find(|e| e.excludes(trial_onset)) {
            Some(exclusion) => {
                debug!("Trial {} excluded: {}", trial_number, exclusion.reason);
                TrialOutcome::Excluded {
                    reason: exclusion.reason.clone(),
                }
            }
            None => {
                let (in_counts, out_counts) = self.count_spikes(&tones, spikes)?;
                match remapper {
                    Some(remapper) => TrialOutcome::Included {
                        in_stimulus_spike_counts: remapper.transform(&in_counts)?,
                        out_stimulus_spike_counts: remapper.transform(&out_counts)?,
                    },
                    None => TrialOutcome::Included {
                        in_stimulus_spike_counts: in_counts,
                        out_stimulus_spike_counts: out_counts,
                    },
                }
            }
        };

        let mut trial = Trial {
            trial_number,
            start_timestamp: range.start,
            end_timestamp: range.end,
            base_frequency: None,
            alternate_frequency: None,
            amplitudes: Vec::new(),
            stimuli: tones,
            outcome,
        };
        trial.summarise_tones();
        Ok(trial)
    }

    /// Spike counts `[stimulus, channel]` during each tone and during the
    /// following inter-tone interval
    fn count_spikes(
        &self,
        tones: &[Tone],
        spikes: &SpikeIndex,
    ) -> Result<(Array2<u32>, Array2<u32>), ExtractError> {
        let capture = &self.config.capture;
        let tone_duration = RelativeTimestamp(self.config.tones.tone_duration);
        let channels = spikes.channel_count();

        let mut in_counts = Vec::with_capacity(tones.len() * channels);
        let mut out_counts = Vec::with_capacity(tones.len() * channels);
        for tone in tones {
            let onset = tone.stimulus.start_timestamp;
            let in_range = TimeRange::around(
                onset,
                RelativeTimestamp(capture.in_tone_start),
                RelativeTimestamp(capture.in_tone_end),
            );
            let out_range = TimeRange::around(
                onset + tone_duration,
                RelativeTimestamp(capture.out_tone_start),
                RelativeTimestamp(capture.out_tone_end),
            );
            in_counts.extend(spikes.counts_in_range(&in_range));
            out_counts.extend(spikes.counts_in_range(&out_range));
        }

        Ok((
            Array2::from_shape_vec((tones.len(), channels), in_counts)?,
            Array2::from_shape_vec((tones.len(), channels), out_counts)?,
        ))
    }
}

fn optional_store<'a>(block: &'a Block, name: &str) -> Option<&'a Epoc> {
    let store = block.epocs.get(name);
    if store.is_none() {
        warn!("Epoc store {} not found in block {}; values will be empty", name, block.name);
    }
    store
}

/// Value of the first event whose onset is within `margin` of `onset`
fn value_near(epoc: Option<&Epoc>, onset: TankTimestamp, margin: f64) -> Option<f64> {
    let epoc = epoc?;
    let onset = onset.seconds();
    let first = epoc.onset.partition_point(|&t| t < onset - margin);
    epoc.onset[first..]
        .iter()
        .take_while(|&&t| t <= onset + margin)
        .position(|&t| (t - onset).abs() < margin)
        .map(|idx| epoc.data[first + idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::collections::BTreeSet;
    use std::io::Cursor;
    use tx_core::block::Snip;
    use tx_data::config::TrialWindowConfig;

    fn config() -> SessionConfig {
        let mut config = SessionConfig::default();
        config.spikes.channel_count = 2;
        config.trial_window = TrialWindowConfig {
            from_offset: -1.0,
            to_offset: 5.0,
        };
        config
    }

    fn block() -> Block {
        let mut block = Block::new("Block-7");

        let mut trials = Epoc::new("TriS");
        trials.push(100.0, 104.0, 1.0);
        trials.push(200.0, 204.0, 2.0);
        block.insert_epoc(trials);

        let mut stimuli = Epoc::new("StiS");
        for onset in [100.0, 100.5, 150.0, 200.0] {
            stimuli.push(onset, onset + 0.25, 0.0);
        }
        block.insert_epoc(stimuli);

        let mut frequencies = Epoc::new("AFrq");
        frequencies.push(99.9995, 100.25, 4000.0);
        frequencies.push(100.5, 100.75, 6000.0);
        block.insert_epoc(frequencies);

        let mut attenuations = Epoc::new("Attn");
        attenuations.push(100.0, 100.25, 20.0);
        attenuations.push(100.5, 100.75, 30.0);
        attenuations.push(200.0005, 200.25, 20.0);
        block.insert_epoc(attenuations);

        let mut spikes = Snip::new("CSPK");
        for (ts, chan) in [
            (100.05, 1),
            (100.1, 1),
            (100.15, 2),
            (100.21, 1),
            (100.4, 2),
            (100.5, 1),
            (200.1, 1),
        ] {
            spikes.push(ts, chan);
        }
        block.insert_snip(spikes);
        block
    }

    fn exclusion_from(text: &str) -> TrialExclusion {
        TrialExclusion::from_reader(
            Cursor::new(text),
            BTreeSet::from([ExclusionDataType::NeuralData]),
            BTreeSet::from([ExclusionTrialsType::AcousticTrials]),
        )
        .unwrap()
    }

    #[test]
    fn test_extracts_trials_and_tones() {
        let processor = SessionProcessor::with_block(config(), block());
        let session = processor.extract_loaded(&[], None).unwrap();

        assert_eq!(session.trial_count(), 2);
        let trial = &session.trials[0];
        assert_eq!(trial.trial_number, 1);
        assert_eq!(trial.start_timestamp, TankTimestamp(99.0));
        assert_eq!(trial.end_timestamp, TankTimestamp(105.0));
        assert_eq!(trial.stimuli.len(), 2);
        assert_eq!(trial.stimuli[0].frequency, Some(AcousticFrequency(4000)));
        assert_eq!(trial.stimuli[0].attenuation, Some(AcousticAttenuation(20)));
        assert_eq!(trial.stimuli[1].frequency, Some(AcousticFrequency(6000)));
        assert_eq!(trial.stimuli[0].stimulus.start_relative_timestamp, RelativeTimestamp(1.0));
        assert_eq!(trial.base_frequency, Some(AcousticFrequency(4000)));
        assert_eq!(trial.alternate_frequency, Some(AcousticFrequency(6000)));
        assert_eq!(trial.amplitudes, vec![AcousticAttenuation(20), AcousticAttenuation(30)]);

        let second = &session.trials[1];
        assert_eq!(second.stimuli.len(), 1);
        assert_eq!(second.stimuli[0].frequency, None);
        assert_eq!(second.stimuli[0].attenuation, Some(AcousticAttenuation(20)));
    }

    #[test]
    fn test_counts_spikes_in_and_out_of_tone() {
        let processor = SessionProcessor::with_block(config(), block());
        let session = processor.extract_loaded(&[], None).unwrap();

        match &session.trials[0].outcome {
            TrialOutcome::Included {
                in_stimulus_spike_counts,
                out_stimulus_spike_counts,
            } => {
                assert_eq!(in_stimulus_spike_counts, &array![[2u32, 1], [1, 0]]);
                assert_eq!(out_stimulus_spike_counts, &array![[0u32, 1], [0, 0]]);
            }
            other => panic!("expected included trial, got {:?}", other),
        }
    }

    #[test]
    fn test_applies_channel_remapper() {
        let processor = SessionProcessor::with_block(config(), block());
        let remapper = ChannelRemapper::new(vec![(1, 2), (2, 1)]).unwrap();
        let session = processor.extract_loaded(&[], Some(&remapper)).unwrap();

        match &session.trials[0].outcome {
            TrialOutcome::Included {
                in_stimulus_spike_counts,
                ..
            } => assert_eq!(in_stimulus_spike_counts, &array![[1u32, 2], [0, 1]]),
            other => panic!("expected included trial, got {:?}", other),
        }
    }

    #[test]
    fn test_remapper_of_wrong_size_fails() {
        let processor = SessionProcessor::with_block(config(), block());
        let remapper = ChannelRemapper::new(vec![(1, 1), (2, 2), (3, 3)]).unwrap();
        let result = processor.extract_loaded(&[], Some(&remapper));
        assert!(matches!(result, Err(ExtractError::Core(_))));
    }

    #[test]
    fn test_excludes_trials_after_offset() {
        let processor = SessionProcessor::with_block(config(), block());
        let exclusion = exclusion_from("Exclude after: 150s\nElectrode drifted");
        let session = processor.extract_loaded(&[exclusion], None).unwrap();

        assert!(!session.trials[0].is_excluded());
        assert_eq!(session.trials[1].exclusion_reason(), Some("Electrode drifted"));
        assert_eq!(session.excluded().count(), 1);
    }

    #[test]
    fn test_exclusion_is_checked_against_trial_onset() {
        // Trial 1 window starts at 99 but the trial itself starts at 100
        let processor = SessionProcessor::with_block(config(), block());
        let exclusion = exclusion_from("Exclude after: 100s\nExclude before: 150s\nArtefact");
        let session = processor.extract_loaded(&[exclusion], None).unwrap();

        assert_eq!(session.trials[0].start_timestamp, TankTimestamp(99.0));
        assert_eq!(session.trials[0].exclusion_reason(), Some("Artefact"));
        assert!(!session.trials[1].is_excluded());
    }

    #[test]
    fn test_tags_leading_a_stimulus_at_window_start() {
        let mut config = config();
        config.trial_window = TrialWindowConfig {
            from_offset: 0.0,
            to_offset: 5.0,
        };

        let mut block = Block::new("Block-8");
        let mut trials = Epoc::new("TriS");
        trials.push(100.0, 104.0, 1.0);
        block.insert_epoc(trials);
        let mut stimuli = Epoc::new("StiS");
        stimuli.push(100.0, 100.25, 0.0);
        stimuli.push(101.0, 101.25, 0.0);
        block.insert_epoc(stimuli);
        let mut frequencies = Epoc::new("AFrq");
        frequencies.push(99.9999, 100.25, 4000.0);
        frequencies.push(100.9999, 101.25, 4000.0);
        block.insert_epoc(frequencies);
        let mut attenuations = Epoc::new("Attn");
        attenuations.push(99.9999, 100.25, 20.0);
        attenuations.push(100.9999, 101.25, 20.0);
        block.insert_epoc(attenuations);
        block.insert_snip(Snip::new("CSPK"));

        let processor = SessionProcessor::with_block(config, block);
        let session = processor.extract_loaded(&[], None).unwrap();
        let trial = &session.trials[0];

        assert_eq!(trial.stimuli.len(), 2);
        for tone in &trial.stimuli {
            assert_eq!(tone.frequency, Some(AcousticFrequency(4000)));
            assert_eq!(tone.attenuation, Some(AcousticAttenuation(20)));
        }
        assert_eq!(trial.base_frequency, Some(AcousticFrequency(4000)));
        assert_eq!(trial.amplitudes, vec![AcousticAttenuation(20)]);
    }

    #[test]
    fn test_trial_number_is_truncated() {
        let mut block = block();
        let mut trials = Epoc::new("TriS");
        trials.push(100.0, 104.0, 3.7);
        block.insert_epoc(trials);

        let processor = SessionProcessor::with_block(config(), block);
        let session = processor.extract_loaded(&[], None).unwrap();
        assert_eq!(session.trials[0].trial_number, 3);
    }

    #[test]
    fn test_ignores_exclusions_for_other_data() {
        let processor = SessionProcessor::with_block(config(), block());
        let exclusion = TrialExclusion::from_reader(
            Cursor::new(""),
            BTreeSet::from([ExclusionDataType::HrData]),
            BTreeSet::from(ExclusionTrialsType::ALL),
        )
        .unwrap();
        let session = processor.extract_loaded(&[exclusion], None).unwrap();

        assert_eq!(session.excluded().count(), 0);
    }

    #[test]
    fn test_missing_stimulus_store_is_an_error() {
        let mut config = config();
        config.epochs.stimulus = "Nope".to_string();
        let processor = SessionProcessor::with_block(config, block());

        assert!(matches!(
            processor.extract_loaded(&[], None),
            Err(ExtractError::Core(_))
        ));
    }

    #[test]
    fn test_extract_is_deterministic() {
        let processor = SessionProcessor::with_block(config(), block());
        let first = processor.extract_loaded(&[], None).unwrap();
        let second = processor.extract_loaded(&[], None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_value_near_respects_margin() {
        let mut epoc = Epoc::new("AFrq");
        epoc.push(10.0, 10.1, 1.0);
        epoc.push(11.0, 11.1, 2.0);

        assert_eq!(value_near(Some(&epoc), TankTimestamp(10.0005), 0.001), Some(1.0));
        assert_eq!(value_near(Some(&epoc), TankTimestamp(10.5), 0.001), None);
        assert_eq!(value_near(None, TankTimestamp(10.0), 0.001), None);
    }

    #[test]
    fn test_value_near_margin_is_strict() {
        let mut edge = Epoc::new("Attn");
        edge.push(10.5, 10.6, 1.0);
        assert_eq!(value_near(Some(&edge), TankTimestamp(10.0), 0.5), None);

        let mut epoc = Epoc::new("Attn");
        epoc.push(9.5, 9.6, 3.0);
        epoc.push(10.25, 10.3, 4.0);
        assert_eq!(value_near(Some(&epoc), TankTimestamp(10.0), 0.5), Some(4.0));
    }

    struct FixtureSource;

    #[async_trait::async_trait]
    impl RecordingSource for FixtureSource {
        async fn load(&self, _event_types: &[EventType]) -> anyhow::Result<Block> {
            Ok(block())
        }

        fn source_name(&self) -> &str {
            "fixture"
        }
    }

    struct BrokenSource;

    #[async_trait::async_trait]
    impl RecordingSource for BrokenSource {
        async fn load(&self, _event_types: &[EventType]) -> anyhow::Result<Block> {
            anyhow::bail!("tank is offline")
        }

        fn source_name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_extract_loads_from_source_once() {
        let mut processor = SessionProcessor::new(config(), Box::new(FixtureSource));
        assert!(matches!(processor.extract_loaded(&[], None), Err(ExtractError::NotLoaded)));

        let session = processor.extract_session(&[], None).await.unwrap();
        assert_eq!(session.block_name, "Block-7");
        assert!(processor.extract_loaded(&[], None).is_ok());
    }

    #[tokio::test]
    async fn test_load_failure_is_reported() {
        let mut processor = SessionProcessor::new(config(), Box::new(BrokenSource));
        match processor.extract_session(&[], None).await {
            Err(ExtractError::Load(msg)) => assert!(msg.contains("tank is offline")),
            other => panic!("expected load error, got {:?}", other.map(|s| s.trial_count())),
        }
    }

    #[test]
    fn test_changing_trial_epoch_clears_windows() {
        let mut processor = SessionProcessor::with_block(config(), block());
        processor.extract_loaded(&[], None).unwrap();
        assert_eq!(processor.windows.len(), 1);

        let mut changed = config();
        changed.epochs.trial = "StiS".to_string();
        processor.set_config(changed);
        assert!(processor.windows.is_empty());
    }
}
