//! Long-format session table

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use tx_core::structures::{Session, Trial, TrialOutcome};

use crate::ExportError;

/// Label of the capture window during the tone
pub const IN_WINDOW: &str = "in";
/// Label of the capture window after the tone
pub const OUT_WINDOW: &str = "out";

/// Schema of the table produced by [`session_table`]
pub fn session_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("trial_number", DataType::Int64, false),
        Field::new("trial_start", DataType::Float64, false),
        Field::new("excluded", DataType::Boolean, false),
        Field::new("stimulus_index", DataType::Int64, true),
        Field::new("stimulus_start_relative", DataType::Float64, true),
        Field::new("frequency", DataType::Int64, true),
        Field::new("attenuation", DataType::Int64, true),
        Field::new("channel", DataType::Int64, true),
        Field::new("window", DataType::Utf8, true),
        Field::new("spike_count", DataType::Int64, true),
        Field::new("exclusion_reason", DataType::Utf8, true),
    ]))
}

#[derive(Default)]
struct Columns {
    trial_number: Int64Builder,
    trial_start: Float64Builder,
    excluded: BooleanBuilder,
    stimulus_index: Int64Builder,
    stimulus_start_relative: Float64Builder,
    frequency: Int64Builder,
    attenuation: Int64Builder,
    channel: Int64Builder,
    window: StringBuilder,
    spike_count: Int64Builder,
    exclusion_reason: StringBuilder,
}

impl Columns {
    fn push_trial(&mut self, trial: &Trial) {
        self.trial_number.append_value(trial.trial_number);
        self.trial_start.append_value(trial.start_timestamp.seconds());
        self.excluded.append_value(trial.is_excluded());
    }

    fn push_excluded(&mut self, trial: &Trial, reason: &str) {
        self.push_trial(trial);
        self.stimulus_index.append_null();
        self.stimulus_start_relative.append_null();
        self.frequency.append_null();
        self.attenuation.append_null();
        self.channel.append_null();
        self.window.append_null();
        self.spike_count.append_null();
        self.exclusion_reason.append_value(reason);
    }

    fn push_included(&mut self, trial: &Trial, stimulus: usize, channel: usize, window: &str, count: u32) {
        let tone = &trial.stimuli[stimulus];
        self.push_trial(trial);
        self.stimulus_index.append_value(stimulus as i64);
        self.stimulus_start_relative
            .append_value(tone.stimulus.start_relative_timestamp.seconds());
        self.frequency.append_option(tone.frequency.map(|f| f.0 as i64));
        self.attenuation.append_option(tone.attenuation.map(|a| a.0 as i64));
        self.channel.append_value(channel as i64 + 1);
        self.window.append_value(window);
        self.spike_count.append_value(count as i64);
        self.exclusion_reason.append_null();
    }

    fn finish(mut self) -> Vec<ArrayRef> {
        vec![
            Arc::new(self.trial_number.finish()),
            Arc::new(self.trial_start.finish()),
            Arc::new(self.excluded.finish()),
            Arc::new(self.stimulus_index.finish()),
            Arc::new(self.stimulus_start_relative.finish()),
            Arc::new(self.frequency.finish()),
            Arc::new(self.attenuation.finish()),
            Arc::new(self.channel.finish()),
            Arc::new(self.window.finish()),
            Arc::new(self.spike_count.finish()),
            Arc::new(self.exclusion_reason.finish()),
        ]
    }
}

/// Flatten a session into one row per stimulus, channel and capture window.
/// Excluded trials take a single row carrying the exclusion reason.
pub fn session_table(session: &Session) -> Result<RecordBatch, ExportError> {
    let mut columns = Columns::default();

    for trial in &session.trials {
        match &trial.outcome {
            TrialOutcome::Excluded { reason } => columns.push_excluded(trial, reason),
            TrialOutcome::Included {
                in_stimulus_spike_counts,
                out_stimulus_spike_counts,
            } => {
                for (stimulus, (in_row, out_row)) in in_stimulus_spike_counts
                    .rows()
                    .into_iter()
                    .zip(out_stimulus_spike_counts.rows())
                    .enumerate()
                {
                    for (channel, (&in_count, &out_count)) in in_row.iter().zip(out_row.iter()).enumerate() {
                        columns.push_included(trial, stimulus, channel, IN_WINDOW, in_count);
                        columns.push_included(trial, stimulus, channel, OUT_WINDOW, out_count);
                    }
                }
            }
        }
    }

    Ok(RecordBatch::try_new(session_schema(), columns.finish())?)
}
