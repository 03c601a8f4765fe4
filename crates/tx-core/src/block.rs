//! In-memory representation of a recorded block

use ahash::AHashMap;

use crate::time::{TankTimestamp, TimeRange};
use crate::CoreError;

/// Event families that can be loaded from a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Epocs,
    Snips,
}

impl EventType {
    pub const ALL: [EventType; 2] = [EventType::Epocs, EventType::Snips];
}

/// A named epoc store: one value per event with onset and offset times
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Epoc {
    pub name: String,
    pub onset: Vec<f64>,
    pub offset: Vec<f64>,
    pub data: Vec<f64>,
}

impl Epoc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, onset: f64, offset: f64, data: f64) {
        self.onset.push(onset);
        self.offset.push(offset);
        self.data.push(data);
    }

    pub fn len(&self) -> usize {
        self.onset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.onset.is_empty()
    }

    pub fn onset_at(&self, idx: usize) -> TankTimestamp {
        TankTimestamp(self.onset[idx])
    }

    pub fn offset_at(&self, idx: usize) -> TankTimestamp {
        TankTimestamp(self.offset[idx])
    }

    /// Sort events by onset, keeping offset and data aligned
    pub fn sort(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.onset[a].total_cmp(&self.onset[b]));
        self.onset = order.iter().map(|&i| self.onset[i]).collect();
        self.offset = order.iter().map(|&i| self.offset[i]).collect();
        self.data = order.iter().map(|&i| self.data[i]).collect();
    }

    /// Events whose onset falls inside any of the ranges
    pub fn retain_in(&self, ranges: &[TimeRange]) -> Epoc {
        let mut out = Epoc::new(self.name.clone());
        for idx in 0..self.len() {
            let onset = self.onset_at(idx);
            if ranges.iter().any(|r| r.contains(onset)) {
                out.push(self.onset[idx], self.offset[idx], self.data[idx]);
            }
        }
        out
    }
}

/// A named snippet store: spike timestamps and their 1-based channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snip {
    pub name: String,
    pub ts: Vec<f64>,
    pub chan: Vec<u16>,
}

impl Snip {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, ts: f64, chan: u16) {
        self.ts.push(ts);
        self.chan.push(chan);
    }

    pub fn len(&self) -> usize {
        self.ts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ts.is_empty()
    }

    pub fn sort(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.ts[a].total_cmp(&self.ts[b]));
        self.ts = order.iter().map(|&i| self.ts[i]).collect();
        self.chan = order.iter().map(|&i| self.chan[i]).collect();
    }

    pub fn retain_in(&self, ranges: &[TimeRange]) -> Snip {
        let mut out = Snip::new(self.name.clone());
        for (ts, chan) in self.ts.iter().zip(&self.chan) {
            if ranges.iter().any(|r| r.contains(TankTimestamp(*ts))) {
                out.push(*ts, *chan);
            }
        }
        out
    }

    /// Highest channel number present
    pub fn max_channel(&self) -> Option<u16> {
        self.chan.iter().copied().max()
    }
}

/// A single recording block
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub name: String,
    pub epocs: AHashMap<String, Epoc>,
    pub snips: AHashMap<String, Snip>,
}

impl Block {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn insert_epoc(&mut self, epoc: Epoc) {
        self.epocs.insert(epoc.name.clone(), epoc);
    }

    pub fn insert_snip(&mut self, snip: Snip) {
        self.snips.insert(snip.name.clone(), snip);
    }

    pub fn epoc(&self, name: &str) -> Result<&Epoc, CoreError> {
        self.epocs
            .get(name)
            .ok_or_else(|| CoreError::MissingStore(name.to_string()))
    }

    pub fn snip(&self, name: &str) -> Result<&Snip, CoreError> {
        self.snips
            .get(name)
            .ok_or_else(|| CoreError::MissingStore(name.to_string()))
    }

    /// Store names in sorted order
    pub fn epoc_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.epocs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
