//! Spreadsheet-style layout of a session
//!
//! Each trial is written as a block of cells below the previous one:
//!
//! ```text
//! Trial                 | 12
//! Base frequency        | 4000
//! Alternate frequency   | 6000
//! Trial start timestamp | 1021.5
//! Amplitudes            | 20    | 30
//! Frequency             | 4000  | 6000 | ...
//! Attenuation           | 20    | 30   | ...
//!                       | 10    | 10.5 | ...    (stimulus start, relative)
//! Channel               | During stimulus
//! 1                     | 3     | 0    | ...
//! ...
//! Channel               | During inter-stimulus interval
//! 1                     | 1     | 0    | ...
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Sub};
use std::path::Path;

use tracing::{debug, info};
use tx_core::structures::{Session, Trial, TrialOutcome};

use crate::ExportError;

/// Relative move across a sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Offset {
    pub cols: u32,
    pub rows: u32,
}

impl Offset {
    pub fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }

    pub fn cols(cols: u32) -> Self {
        Self { cols, rows: 0 }
    }

    pub fn rows(rows: u32) -> Self {
        Self { cols: 0, rows }
    }
}

/// 1-based cell address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
}

impl Cell {
    pub fn new(col: u32, row: u32) -> Self {
        Self { row, col }
    }

    /// Top left cell of a sheet
    pub fn origin() -> Self {
        Self::new(1, 1)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letter(self.col), self.row)
    }
}

impl Add<Offset> for Cell {
    type Output = Cell;

    fn add(self, offset: Offset) -> Cell {
        Cell::new(self.col + offset.cols, self.row + offset.rows)
    }
}

impl Sub<Offset> for Cell {
    type Output = Result<Cell, ExportError>;

    fn sub(self, offset: Offset) -> Result<Cell, ExportError> {
        if offset.cols >= self.col || offset.rows >= self.row {
            return Err(ExportError::OutOfSheet {
                cell: self.to_string(),
                cols: offset.cols,
                rows: offset.rows,
            });
        }
        Ok(Cell::new(self.col - offset.cols, self.row - offset.rows))
    }
}

/// Spreadsheet column name for a 1-based column index (`1` is `A`, `27` is `AA`)
pub fn column_letter(col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Sparse grid of text cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    cells: BTreeMap<Cell, String>,
}

impl Sheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, cell: Cell, value: impl Into<String>) {
        self.cells.insert(cell, value.into());
    }

    pub fn get(&self, cell: Cell) -> Option<&str> {
        self.cells.get(&cell).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Bottom right corner of the used area, if any cell is set
    pub fn extent(&self) -> Option<Cell> {
        let rows = self.cells.keys().map(|c| c.row).max()?;
        let cols = self.cells.keys().map(|c| c.col).max()?;
        Some(Cell::new(cols, rows))
    }

    /// Row `row` from column A up to `width` columns, blanks for unset cells
    fn row_values(&self, row: u32, width: u32) -> Vec<&str> {
        (1..=width)
            .map(|col| self.get(Cell::new(col, row)).unwrap_or(""))
            .collect()
    }

    /// Write the used area as a rectangular CSV grid
    pub fn save_csv(&self, path: &Path) -> Result<(), ExportError> {
        let mut writer = ::csv::WriterBuilder::new().flexible(false).from_path(path)?;
        if let Some(extent) = self.extent() {
            for row in 1..=extent.row {
                writer.write_record(self.row_values(row, extent.col))?;
            }
        }
        writer.flush()?;
        info!("Wrote sheet with {} cells to {}", self.cells.len(), path.display());
        Ok(())
    }
}

/// Write values left to right from `origin`. Returns the cell after the last value.
pub fn write_row<I, S>(values: I, sheet: &mut Sheet, origin: Cell) -> Cell
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut cell = origin;
    for value in values {
        sheet.set(cell, value);
        cell = cell + Offset::cols(1);
    }
    cell
}

/// Write rows of values top to bottom from `origin`. Returns the cell below
/// the start of the last row.
pub fn write_cells<R, I, S>(rows: R, sheet: &mut Sheet, origin: Cell) -> Cell
where
    R: IntoIterator<Item = I>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut cell = origin;
    for values in rows {
        write_row(values, sheet, cell);
        cell = cell + Offset::rows(1);
    }
    cell
}

fn or_blank<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Trial number, frequencies, start timestamp and amplitudes
pub fn write_trial_header(trial: &Trial, sheet: &mut Sheet, origin: Cell) -> Cell {
    let amplitudes: Vec<String> = std::iter::once("Amplitudes".to_string())
        .chain(trial.amplitudes.iter().map(|a| a.to_string()))
        .collect();
    write_cells(
        vec![
            vec!["Trial".to_string(), trial.trial_number.to_string()],
            vec!["Base frequency".to_string(), or_blank(trial.base_frequency)],
            vec!["Alternate frequency".to_string(), or_blank(trial.alternate_frequency)],
            vec!["Trial start timestamp".to_string(), trial.start_timestamp.to_string()],
            amplitudes,
        ],
        sheet,
        origin,
    )
}

/// Per-tone frequency, attenuation and relative start, then one block of
/// spike counts per capture window with a row per channel
pub fn write_trial_data(trial: &Trial, sheet: &mut Sheet, origin: Cell) -> Result<Cell, ExportError> {
    let (in_counts, out_counts) = match &trial.outcome {
        TrialOutcome::Included {
            in_stimulus_spike_counts,
            out_stimulus_spike_counts,
        } => (in_stimulus_spike_counts, out_stimulus_spike_counts),
        TrialOutcome::Excluded { reason } => {
            write_row(["Excluded".to_string(), reason.clone()], sheet, origin);
            return Ok(origin + Offset::rows(2));
        }
    };

    let mut cell = origin;
    write_row(
        std::iter::once("Frequency".to_string()).chain(trial.stimuli.iter().map(|t| or_blank(t.frequency))),
        sheet,
        cell,
    );
    cell = cell + Offset::rows(1);
    write_row(
        std::iter::once("Attenuation".to_string()).chain(trial.stimuli.iter().map(|t| or_blank(t.attenuation))),
        sheet,
        cell,
    );
    cell = cell + Offset::rows(1);
    write_row(
        trial
            .stimuli
            .iter()
            .map(|t| t.stimulus.start_relative_timestamp.rounded(2).to_string()),
        sheet,
        cell + Offset::cols(1),
    );
    cell = cell + Offset::rows(1);

    for (title, counts) in [("During stimulus", in_counts), ("During inter-stimulus interval", out_counts)] {
        write_row(["Channel", title], sheet, cell);
        cell = cell + Offset::rows(1);
        let channels = (1..=counts.ncols()).map(|c| vec![c.to_string()]);
        write_cells(channels, sheet, cell);
        // Counts are [stimulus, channel]; the sheet has a row per channel
        let rows = counts
            .columns()
            .into_iter()
            .map(|column| column.iter().map(|n| n.to_string()).collect::<Vec<_>>());
        cell = (write_cells(rows, sheet, cell + Offset::cols(1)) - Offset::cols(1))?;
    }

    Ok(cell + Offset::rows(1))
}

/// Lay out every trial of a session in a single sheet
pub fn write_session(session: &Session) -> Result<Sheet, ExportError> {
    let mut sheet = Sheet::new();
    let mut cell = Cell::origin();
    for trial in &session.trials {
        debug!("Writing trial {} at {}", trial.trial_number, cell);
        cell = write_trial_header(trial, &mut sheet, cell);
        cell = write_trial_data(trial, &mut sheet, cell)?;
    }
    Ok(sheet)
}
